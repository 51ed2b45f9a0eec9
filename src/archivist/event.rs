//! Inbound chat events as the archival core sees them.
//!
//! Events come from the Telegram adapter (live polling or a fetched history
//! window) or from JSONL files fed to `archivist ingest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// Identity of a logical message: the same `(chat_id, message_id)` pair is
/// the same message no matter how often it is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageKey {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Author {
    /// Handle first, then first name, then `Unknown`.
    pub fn display_name(&self) -> &str {
        non_empty(self.username.as_deref())
            .or_else(|| non_empty(self.first_name.as_deref()))
            .unwrap_or(UNKNOWN_AUTHOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Animation,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Sticker => "sticker",
            Self::Animation => "animation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub chat_id: i64,
    #[serde(default)]
    pub chat_title: Option<String>,
    pub message_id: i64,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
}

impl ChatEvent {
    pub fn key(&self) -> MessageKey {
        MessageKey {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    /// Text if present, otherwise the caption.
    pub fn content(&self) -> Option<&str> {
        non_empty(self.text.as_deref()).or_else(|| non_empty(self.caption.as_deref()))
    }

    pub fn title(&self) -> &str {
        self.chat_title.as_deref().unwrap_or("")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
