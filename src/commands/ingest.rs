use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::archivist::audit::{self, AuditEvent, AuditPhase};
use crate::archivist::backfill::BufferedHistory;
use crate::archivist::config::load_config;
use crate::archivist::event::ChatEvent;
use crate::archivist::paths::resolve_paths;
use crate::archivist::pipeline::{Archiver, ChatRef};
use crate::commands::CommandReport;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub file: PathBuf,
    /// Treat the file as newest-first history instead of a live stream.
    pub backfill: bool,
}

fn read_events(opts: &IngestOptions, report: &mut CommandReport) -> Result<Vec<ChatEvent>> {
    let raw = fs::read_to_string(&opts.file)
        .with_context(|| format!("failed to read {}", opts.file.display()))?;
    let mut events = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChatEvent>(line) {
            Ok(event) => events.push(event),
            Err(err) => {
                skipped += 1;
                warn!(line = idx + 1, "skipping unreadable event: {err}");
            }
        }
    }
    report.detail(format!("events={}", events.len()));
    if skipped > 0 {
        report.detail(format!("skipped_lines={skipped}"));
    }
    Ok(events)
}

/// Events per chat, keeping file order inside each chat.
fn split_by_chat(events: Vec<ChatEvent>) -> Vec<(ChatRef, Vec<ChatEvent>)> {
    let mut chats = Vec::<(ChatRef, Vec<ChatEvent>)>::new();
    for event in events {
        match chats.iter_mut().find(|(chat, _)| chat.id == event.chat_id) {
            Some((_, list)) => list.push(event),
            None => chats.push((ChatRef::of(&event), vec![event])),
        }
    }
    chats
}

pub fn run(opts: &IngestOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("ingest");
    report.detail(format!("file={}", opts.file.display()));
    report.detail(format!(
        "mode={}",
        if opts.backfill { "backfill" } else { "live" }
    ));

    let events = read_events(opts, &mut report)?;
    let mut archiver = Archiver::new(paths.clone(), &cfg, Utc::now())?;
    let mut appended = 0usize;
    let mut duplicates = 0usize;
    let mut links = 0usize;

    if opts.backfill {
        for (chat, events) in split_by_chat(events) {
            let mut source = BufferedHistory::new(events);
            let out = archiver.backfill(&chat, &mut source)?;
            appended += out.messages.appended;
            duplicates += out.messages.duplicates;
            links += out.links.appended;
            report.detail(format!(
                "chat={} pages={} scanned={} accepted={} appended={} capped={}",
                chat.title, out.pages, out.scanned, out.accepted, out.messages.appended, out.capped
            ));
        }
    } else {
        for event in &events {
            let out = archiver.archive_live(event)?;
            appended += out.messages.appended;
            duplicates += out.messages.duplicates;
            links += out.links.appended;
        }
    }

    report.detail(format!("appended={appended}"));
    report.detail(format!("duplicates={duplicates}"));
    report.detail(format!("links={links}"));
    report.detail(format!("seen_messages={}", archiver.normalizer().seen().len()));
    audit::record(
        &paths,
        &AuditEvent::ok(
            AuditPhase::Ingest,
            format!(
                "file={} backfill={} appended={appended}",
                opts.file.display(),
                opts.backfill
            ),
        ),
    )?;
    Ok(report)
}
