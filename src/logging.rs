use crate::archivist::paths::ArchivistPaths;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_FILE_PREFIX: &str = "archivist.log";

fn build_env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Compact stderr output plus, when `paths` is given and its logs dir can be
/// created, a daily rolling file. Keep the returned guard alive until exit.
pub fn init(paths: Option<&ArchivistPaths>, default_level: &str) -> Option<WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let log_dir = paths
        .map(|p| p.logs_dir.clone())
        .filter(|dir| fs::create_dir_all(dir).is_ok());

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact();
            let _ = tracing_subscriber::registry()
                .with(build_env_filter(default_level))
                .with(stderr_layer)
                .with(file_layer)
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(build_env_filter(default_level))
                .with(stderr_layer)
                .try_init();
            None
        }
    }
}
