use anyhow::Result;

use crate::archivist::config::load_config;
use crate::archivist::generate::active_provider_label;
use crate::archivist::paths::resolve_paths;
use crate::archivist::state;
use crate::commands::CommandReport;
use crate::env_loader;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("history_dir={}", paths.history_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("state_file={}", paths.state_file.display()));
    report.detail(format!(
        "token_present={}",
        env_loader::bot_token().is_some()
    ));
    report.detail(format!(
        "env_keys_set={}",
        env_loader::present_keys().join(",")
    ));

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("backfill.page_size={}", cfg.backfill.page_size));
            report.detail(format!("backfill.history_cap={}", cfg.backfill.history_cap));
            report.detail(format!(
                "backfill.max_fetch_pages={}",
                cfg.backfill.max_fetch_pages
            ));
            report.detail(format!("backfill.on_startup={}", cfg.backfill.on_startup));
            report.detail(format!("capture.timezone={}", cfg.capture.timezone));
            report.detail(format!("capture.record_media={}", cfg.capture.record_media));
            report.detail(format!("capture.extract_links={}", cfg.capture.extract_links));
            report.detail(format!("llm.provider={}", active_provider_label(&cfg.llm)));
        }
        Err(err) => report.issue(format!("config: {err:#}")),
    }

    match state::load(&paths) {
        Ok(st) => {
            report.detail(format!("known_chats={}", st.known_chats.len()));
            if let Some(offset) = st.next_update_offset {
                report.detail(format!("next_update_offset={offset}"));
            }
        }
        Err(err) => report.issue(format!("state: {err:#}")),
    }

    if !paths.history_dir.exists() {
        report.detail("history_dir missing (created on first archived message)");
    }
    Ok(report)
}
