//! History windows built from the Bot API update queue.
//!
//! Bots cannot page backwards through a chat. What they can reach is the
//! queue of undelivered updates, oldest first, so backfill drains a bounded
//! window of it and hands each group chat a newest-first source.

use crate::archivist::backfill::BufferedHistory;
use crate::archivist::event::ChatEvent;
use crate::archivist::pipeline::ChatRef;
use crate::telegram::api::BotApi;
use crate::telegram::types::{Update, is_command};
use anyhow::Result;
use tracing::debug;

pub trait UpdateSource {
    fn fetch(&self, offset: Option<i64>, limit: usize, timeout_secs: u64) -> Result<Vec<Update>>;
}

impl UpdateSource for BotApi {
    fn fetch(&self, offset: Option<i64>, limit: usize, timeout_secs: u64) -> Result<Vec<Update>> {
        self.get_updates(offset, limit, timeout_secs)
    }
}

#[derive(Debug, Default)]
pub struct PendingWindow {
    /// Oldest first.
    pub updates: Vec<Update>,
    pub next_offset: Option<i64>,
    pub pages: usize,
}

/// Drain up to `max_pages` pages of queued updates without waiting.
pub fn fetch_pending(
    source: &dyn UpdateSource,
    offset: Option<i64>,
    page_size: usize,
    max_pages: usize,
) -> Result<PendingWindow> {
    let mut window = PendingWindow {
        next_offset: offset,
        ..PendingWindow::default()
    };

    while window.pages < max_pages {
        let page = source.fetch(window.next_offset, page_size, 0)?;
        window.pages += 1;
        let page_len = page.len();
        if let Some(last) = page.last() {
            window.next_offset = Some(last.update_id + 1);
        }
        window.updates.extend(page);
        debug!(page = window.pages, updates = page_len, "fetched pending updates");
        if page_len < page_size {
            break;
        }
    }
    Ok(window)
}

/// A pending window split around a chat the bot just joined.
#[derive(Debug, Default)]
pub struct JoinWindow {
    /// Newest-first history of the joined chat, if it has pending messages.
    pub history: Option<(ChatRef, BufferedHistory)>,
    /// Every other update, commands included, oldest first.
    pub deferred: Vec<Update>,
    pub next_offset: Option<i64>,
    pub pages: usize,
}

fn is_plain_message_in(update: &Update, chat_id: i64) -> bool {
    update.message.as_ref().is_some_and(|m| {
        m.chat.id == chat_id && m.chat.is_group() && !m.text.as_deref().is_some_and(is_command)
    })
}

/// Keep the joined chat's plain messages for backfill and hand the rest back
/// to the regular update path.
pub fn split_join_window(window: PendingWindow, chat_id: i64) -> JoinWindow {
    let (own, deferred): (Vec<Update>, Vec<Update>) = window
        .updates
        .into_iter()
        .partition(|update| is_plain_message_in(update, chat_id));
    JoinWindow {
        history: group_histories(&own).into_iter().next(),
        deferred,
        next_offset: window.next_offset,
        pages: window.pages,
    }
}

/// Group chat messages in `updates`, one newest-first history per chat in
/// order of first appearance. Commands and private chats are left out.
pub fn group_histories(updates: &[Update]) -> Vec<(ChatRef, BufferedHistory)> {
    let mut chats = Vec::<(ChatRef, Vec<ChatEvent>)>::new();
    for message in updates.iter().filter_map(|u| u.message.as_ref()) {
        if !message.chat.is_group() || message.text.as_deref().is_some_and(is_command) {
            continue;
        }
        let Some(event) = message.to_event() else {
            continue;
        };
        let chat = ChatRef::of(&event);
        match chats.iter_mut().find(|(known, _)| known.id == chat.id) {
            Some((_, events)) => events.push(event),
            None => chats.push((chat, vec![event])),
        }
    }
    chats
        .into_iter()
        .map(|(chat, mut events)| {
            events.sort_by_key(|e| (e.sent_at, e.message_id));
            (chat, BufferedHistory::from_chronological(events))
        })
        .collect()
}
