//! Chat log line grammar.
//!
//! `[LIVE|BACKFILL|MEDIA] [YYYY-MM-DD HH:MM:SS] <author>: <content>\n`
//!
//! Writers produce lines through [`format_line`]; the analysis commands read
//! them back through [`parse_line`].

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static LINE_RE: OnceLock<Regex> = OnceLock::new();
static BREAKS_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flag {
    Live,
    Backfill,
    Media,
}

impl Flag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Backfill => "BACKFILL",
            Self::Media => "MEDIA",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "LIVE" => Some(Self::Live),
            "BACKFILL" => Some(Self::Backfill),
            "MEDIA" => Some(Self::Media),
            _ => None,
        }
    }
}

/// One formatted, newline-terminated log line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogLine(String);

impl LogLine {
    /// Wrap already formatted text, adding the trailing newline if missing.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The line without its trailing newline, as it appears in the file.
    pub fn body(&self) -> &str {
        self.0.trim_end_matches('\n')
    }
}

/// Collapse line breaks so a message always occupies exactly one line.
pub fn single_line(content: &str) -> String {
    let re = BREAKS_RE.get_or_init(|| Regex::new(r"\s*[\r\n]+\s*").expect("hardcoded line break regex"));
    re.replace_all(content.trim_end(), " ").into_owned()
}

pub fn format_line(flag: Flag, timestamp: &str, author: &str, content: &str) -> LogLine {
    LogLine(format!(
        "[{}] [{}] {}: {}\n",
        flag.as_str(),
        timestamp,
        single_line(author),
        single_line(content)
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub flag: Flag,
    pub timestamp: String,
    pub username: String,
    pub content: String,
}

pub fn parse_line(line: &str) -> Option<LogRecord> {
    let re = LINE_RE.get_or_init(|| {
        Regex::new(r"^\[(LIVE|BACKFILL|MEDIA)\] \[(.*?)\] (.*?): (.*)$").expect("hardcoded log line regex")
    });
    let caps = re.captures(line.trim())?;
    Some(LogRecord {
        flag: Flag::parse(&caps[1])?,
        timestamp: caps[2].to_string(),
        username: caps[3].to_string(),
        content: caps[4].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_line_matches_grammar() {
        let line = format_line(Flag::Live, "2024-05-01 09:30:00", "alice", "hi all");
        assert_eq!(line.as_str(), "[LIVE] [2024-05-01 09:30:00] alice: hi all\n");
        assert_eq!(line.body(), "[LIVE] [2024-05-01 09:30:00] alice: hi all");
    }

    #[test]
    fn format_line_collapses_line_breaks() {
        let line = format_line(Flag::Backfill, "2024-05-01 09:30:00", "bob", "one\ntwo\r\n\nthree\n");
        assert_eq!(
            line.as_str(),
            "[BACKFILL] [2024-05-01 09:30:00] bob: one two three\n"
        );
    }

    #[test]
    fn parse_line_reads_all_flags() {
        let live = parse_line("[LIVE] [2024-05-01 09:30:00] alice: hi: there\n").expect("live");
        assert_eq!(live.flag, Flag::Live);
        assert_eq!(live.username, "alice");
        assert_eq!(live.content, "hi: there");

        let media = parse_line("[MEDIA] [2024-05-01 09:31:00] bob: photo:AgAD").expect("media");
        assert_eq!(media.flag, Flag::Media);
        assert_eq!(media.content, "photo:AgAD");
    }

    #[test]
    fn parse_line_rejects_malformed_lines() {
        assert!(parse_line("").is_none());
        assert!(parse_line("just chatter").is_none());
        assert!(parse_line("[EDITED] [2024-05-01 09:30:00] alice: hi").is_none());
    }

    #[test]
    fn from_text_adds_missing_newline() {
        assert_eq!(LogLine::from_text("x").as_str(), "x\n");
        assert_eq!(LogLine::from_text("y\n").as_str(), "y\n");
    }
}
