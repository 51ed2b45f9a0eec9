use crate::archivist::line::{LogLine, LogRecord, parse_line};
use anyhow::{Context, Result};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = ".append.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Absent,
    Created,
    Growing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub duplicates: usize,
    pub created: bool,
}

/// Append-only text file where no two lines share the same text.
///
/// Every append re-reads the file under an exclusive lock held on a sidecar
/// file in the same directory, so appends to one log are serialized even
/// across processes.
#[derive(Debug, Clone)]
pub struct AppendLog {
    path: PathBuf,
}

impl AppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) => parent.join(LOCK_FILE),
            None => PathBuf::from(LOCK_FILE),
        }
    }

    pub fn state(&self) -> Result<LogState> {
        let raw = self.read_raw()?;
        let Some(raw) = raw else {
            return Ok(LogState::Absent);
        };
        Ok(if raw.lines().count() <= 1 {
            LogState::Created
        } else {
            LogState::Growing
        })
    }

    fn read_raw(&self) -> Result<Option<String>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        }
    }

    /// Lines currently stored, without trailing newlines. A missing file is
    /// an empty history.
    pub fn existing_lines(&self) -> Result<HashSet<String>> {
        Ok(self
            .read_raw()?
            .map(|raw| raw.lines().map(str::to_string).collect())
            .unwrap_or_default())
    }

    /// Append the candidates that are not in the file yet, in order, with a
    /// single write.
    pub fn append(&self, candidates: &[LogLine]) -> Result<AppendOutcome> {
        if candidates.is_empty() {
            return Ok(AppendOutcome::default());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let lock_path = self.lock_path();
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("failed to open {}", lock_path.display()))?;
        lock.lock_exclusive()
            .with_context(|| format!("failed to lock {}", lock_path.display()))?;

        // Released when `lock` drops.
        self.append_locked(candidates)
    }

    fn append_locked(&self, candidates: &[LogLine]) -> Result<AppendOutcome> {
        let raw = self.read_raw()?;
        let existed = raw.is_some();
        let raw = raw.unwrap_or_default();
        let mut known = raw.lines().map(str::to_string).collect::<HashSet<_>>();
        let mut out = AppendOutcome::default();
        let mut batch = String::new();
        // A torn or hand-edited last line must not swallow the next record.
        if !raw.is_empty() && !raw.ends_with('\n') {
            batch.push('\n');
        }

        for line in candidates {
            if known.insert(line.body().to_string()) {
                batch.push_str(line.as_str());
                out.appended += 1;
            } else {
                out.duplicates += 1;
            }
        }

        if out.appended == 0 {
            return Ok(out);
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(batch.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        file.flush()?;
        out.created = !existed;
        Ok(out)
    }

    /// Parse the trailing `n` lines, skipping any that do not match the grammar.
    pub fn tail(&self, n: usize) -> Result<Vec<LogRecord>> {
        let Some(raw) = self.read_raw()? else {
            return Ok(Vec::new());
        };
        let lines = raw.lines().collect::<Vec<_>>();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..]
            .iter()
            .filter_map(|line| parse_line(line))
            .collect())
    }
}
