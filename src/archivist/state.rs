use crate::archivist::paths::ArchivistPaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownChat {
    pub title: String,
    pub first_seen_epoch_secs: u64,
    pub last_backfill_epoch_secs: Option<u64>,
}

/// Bot bookkeeping that survives restarts. Message identities are
/// deliberately not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchivistState {
    pub schema_version: u32,
    pub next_update_offset: Option<i64>,
    pub last_poll_epoch_secs: u64,
    pub known_chats: BTreeMap<i64, KnownChat>,
}

impl Default for ArchivistState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            next_update_offset: None,
            last_poll_epoch_secs: 0,
            known_chats: BTreeMap::new(),
        }
    }
}

impl ArchivistState {
    /// Record a group chat; returns `true` the first time it is seen.
    pub fn remember_chat(&mut self, chat_id: i64, title: &str, now_epoch_secs: u64) -> bool {
        match self.known_chats.get_mut(&chat_id) {
            Some(known) => {
                if known.title != title && !title.is_empty() {
                    known.title = title.to_string();
                }
                false
            }
            None => {
                self.known_chats.insert(
                    chat_id,
                    KnownChat {
                        title: title.to_string(),
                        first_seen_epoch_secs: now_epoch_secs,
                        last_backfill_epoch_secs: None,
                    },
                );
                true
            }
        }
    }

    pub fn mark_backfilled(&mut self, chat_id: i64, now_epoch_secs: u64) {
        if let Some(known) = self.known_chats.get_mut(&chat_id) {
            known.last_backfill_epoch_secs = Some(now_epoch_secs);
        }
    }
}

pub fn state_file_path(paths: &ArchivistPaths) -> PathBuf {
    paths.state_file.clone()
}

pub fn load(paths: &ArchivistPaths) -> Result<ArchivistState> {
    let file = state_file_path(paths);
    if !file.exists() {
        return Ok(ArchivistState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: ArchivistState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &ArchivistPaths, state: &ArchivistState) -> Result<PathBuf> {
    let file = state_file_path(paths);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}
