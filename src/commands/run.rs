use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::archivist::audit::{self, AuditEvent, AuditPhase};
use crate::archivist::config::load_config;
use crate::archivist::paths::resolve_paths;
use crate::commands::CommandReport;
use crate::env_loader;
use crate::error::ArchivistError;
use crate::telegram::bot::Bot;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub once: bool,
}

pub fn run(opts: &RunOptions) -> Result<CommandReport> {
    let Some(token) = env_loader::bot_token() else {
        error!(
            present = ?env_loader::present_keys(),
            "{} not found in environment",
            env_loader::TOKEN_VAR
        );
        return Err(ArchivistError::MissingToken.into());
    };

    let started_at = Utc::now();
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let catch_up_on_start = cfg.backfill.on_startup;

    let mut report = CommandReport::new("run");
    report.detail(format!("history_dir={}", paths.history_dir.display()));
    report.detail(format!("started_at={}", started_at.to_rfc3339()));

    let mut bot = Bot::connect(&token, paths.clone(), cfg, started_at)?;
    report.detail(format!("bot={}", bot.username().unwrap_or("?")));
    report.detail(format!("generator={}", bot.generator_label()));
    let _ = audit::record(
        &paths,
        &AuditEvent::ok(AuditPhase::Startup, format!("build={}", env!("BUILD_UUID"))),
    );

    if catch_up_on_start {
        let summary = bot.catch_up()?;
        report.detail(format!("catch_up.chats={}", summary.chats));
        report.detail(format!("catch_up.pages={}", summary.pages));
        report.detail(format!("catch_up.appended={}", summary.appended));
        report.detail(format!("catch_up.capped_chats={}", summary.capped_chats));
    }

    if !opts.once {
        info!("bot is running");
        bot.run_forever()?;
        return Ok(report);
    }

    match bot.poll_once() {
        Ok(cycle) => {
            report.detail(format!("cycle.updates={}", cycle.updates));
            report.detail(format!("cycle.archived={}", cycle.archived));
            report.detail(format!("cycle.replies={}", cycle.replies));
        }
        Err(err) => report.issue(format!("poll failed: {err:#}")),
    }
    Ok(report)
}
