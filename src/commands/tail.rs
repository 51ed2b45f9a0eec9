use anyhow::Result;

use crate::archivist::chatlog::{AppendLog, LogState};
use crate::archivist::paths::resolve_paths;
use crate::commands::CommandReport;

#[derive(Debug, Clone)]
pub struct TailOptions {
    pub chat: String,
    pub lines: usize,
}

pub fn run(opts: &TailOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let log = AppendLog::new(paths.messages_file(&opts.chat));
    let mut report = CommandReport::new("tail");

    if log.state()? == LogState::Absent {
        report.issue(format!("no chat log at {}", log.path().display()));
        return Ok(report);
    }

    for record in log.tail(opts.lines)? {
        report.detail(format!(
            "[{}] [{}] {}: {}",
            record.flag.as_str(),
            record.timestamp,
            record.username,
            record.content
        ));
    }
    Ok(report)
}
