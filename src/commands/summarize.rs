use anyhow::Result;

use crate::archivist::analysis::Mode;
use crate::archivist::chatlog::AppendLog;
use crate::archivist::config::load_config;
use crate::archivist::generate::{self, GenerationInput};
use crate::archivist::paths::resolve_paths;
use crate::commands::CommandReport;
use crate::telegram::bot::reply_window;

#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub chat: String,
    pub mode: Mode,
    pub lines: Option<usize>,
}

pub fn run(opts: &SummarizeOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("summarize");

    let arg = opts.lines.map(|n| n.to_string());
    let window = reply_window(&cfg, opts.mode, arg.as_deref());
    let records = AppendLog::new(paths.messages_file(&opts.chat)).tail(window)?;

    let generator = generate::resolve_generator(&cfg.llm);
    let input = GenerationInput {
        mode: opts.mode,
        chat_title: &opts.chat,
        records: &records,
    };
    let reply = generate::reply(generator.as_ref(), &input, cfg.analysis.max_reply_chars)?;

    report.detail(format!("mode={}", opts.mode));
    report.detail(format!("records={}", records.len()));
    report.detail(format!("provider={}", reply.provider));
    report.detail(reply.text);
    Ok(report)
}
