//! Telegram Bot API objects, reduced to the fields the archivist reads.

use crate::archivist::event::{Author, ChatEvent, MediaKind, MediaRef};
use chrono::DateTime;
use serde::Deserialize;

/// `{ ok, result, description }` envelope around every Bot API reply.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub my_chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
    pub caption: Option<String>,
    /// Sizes of one photo, smallest first.
    pub photo: Option<Vec<FileRef>>,
    pub video: Option<FileRef>,
    pub document: Option<FileRef>,
    pub audio: Option<FileRef>,
    pub voice: Option<FileRef>,
    pub sticker: Option<FileRef>,
    pub animation: Option<FileRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl Chat {
    pub fn is_group(&self) -> bool {
        matches!(self.chat_type.as_str(), "group" | "supergroup")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    #[serde(default)]
    pub old_chat_member: Option<ChatMember>,
    pub new_chat_member: ChatMember,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMember {
    pub status: String,
    pub user: User,
}

impl ChatMemberUpdated {
    /// The bot itself was added to a group, as a member or straight in as
    /// an administrator. A promotion of a bot already in the chat is not a join.
    pub fn is_bot_join(&self, bot_id: i64) -> bool {
        let was_inside = self
            .old_chat_member
            .as_ref()
            .is_some_and(|old| is_present_status(&old.status));
        self.chat.is_group()
            && self.new_chat_member.user.id == bot_id
            && matches!(self.new_chat_member.status.as_str(), "member" | "administrator")
            && !was_inside
    }
}

fn is_present_status(status: &str) -> bool {
    matches!(status, "member" | "administrator" | "creator" | "restricted")
}

impl Message {
    fn media(&self) -> Option<MediaRef> {
        let pick = |kind: MediaKind, file: &FileRef| MediaRef {
            kind,
            file_id: file.file_id.clone(),
        };
        if let Some(sizes) = &self.photo
            && let Some(largest) = sizes.last()
        {
            return Some(pick(MediaKind::Photo, largest));
        }
        // Animations also arrive with a `document` field; check them first.
        [
            (MediaKind::Animation, &self.animation),
            (MediaKind::Video, &self.video),
            (MediaKind::Document, &self.document),
            (MediaKind::Audio, &self.audio),
            (MediaKind::Voice, &self.voice),
            (MediaKind::Sticker, &self.sticker),
        ]
        .into_iter()
        .find_map(|(kind, file)| file.as_ref().map(|f| pick(kind, f)))
    }

    /// `None` when the timestamp is out of range.
    pub fn to_event(&self) -> Option<ChatEvent> {
        let author = self
            .from
            .as_ref()
            .map(|user| Author {
                username: user.username.clone(),
                first_name: user.first_name.clone(),
            })
            .unwrap_or_default();
        Some(ChatEvent {
            chat_id: self.chat.id,
            chat_title: self.chat.title.clone(),
            message_id: self.message_id,
            sent_at: DateTime::from_timestamp(self.date, 0)?,
            author,
            text: self.text.clone(),
            caption: self.caption.clone(),
            media: self.media(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotCommand {
    pub name: String,
    pub args: Vec<String>,
}

pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Parse `/name[@bot] args...`. Commands addressed to another bot are `None`.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<BotCommand> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?.strip_prefix('/')?;
    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    if let (Some(target), Some(me)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(me)
    {
        return None;
    }
    Some(BotCommand {
        name: name.to_ascii_lowercase(),
        args: tokens.map(str::to_string).collect(),
    })
}
