//! JSONL audit trail of archival runs, one object per line in
//! `<logs_dir>/audit.log`.

use crate::archivist::paths::ArchivistPaths;
use crate::archivist::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

pub const AUDIT_FILE: &str = "audit.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    Startup,
    Backfill,
    Ingest,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub phase: AuditPhase,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<String>,
    pub message: String,
}

impl AuditEvent {
    pub fn ok(phase: AuditPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            ok: true,
            chat: None,
            message: message.into(),
        }
    }

    pub fn failed(phase: AuditPhase, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            ..Self::ok(phase, message)
        }
    }

    pub fn in_chat(mut self, chat: &str) -> Self {
        self.chat = Some(chat.to_string());
        self
    }
}

#[derive(Serialize)]
struct Stamped<'a> {
    at_epoch_secs: u64,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

pub fn record(paths: &ArchivistPaths, event: &AuditEvent) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let stamped = Stamped {
        at_epoch_secs: now_epoch_secs()?,
        event,
    };
    let mut line = serde_json::to_string(&stamped)?;
    line.push('\n');

    let path = paths.logs_dir.join(AUDIT_FILE);
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut file| file.write_all(line.as_bytes()))
        .with_context(|| format!("failed to append to {}", path.display()))
}
