use crate::archivist::event::ChatEvent;
use crate::archivist::line::{Flag, LogLine, TIMESTAMP_FORMAT, format_line};
use crate::archivist::seen::SeenSet;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Turns inbound events into canonical log lines.
///
/// Owns the process-lifetime [`SeenSet`]. Pure apart from that set: the
/// on-disk duplicate check happens when the chat log appends.
#[derive(Debug)]
pub struct Normalizer {
    started_at: DateTime<Utc>,
    tz: Tz,
    seen: SeenSet,
}

impl Normalizer {
    pub fn new(started_at: DateTime<Utc>, tz: Tz) -> Self {
        Self {
            started_at,
            tz,
            seen: SeenSet::new(),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn classify(&self, sent_at: DateTime<Utc>) -> Flag {
        if sent_at > self.started_at {
            Flag::Live
        } else {
            Flag::Backfill
        }
    }

    pub fn timestamp(&self, event: &ChatEvent) -> String {
        event
            .sent_at
            .with_timezone(&self.tz)
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    pub fn normalize(&mut self, event: &ChatEvent) -> Option<LogLine> {
        let content = event.content()?;

        // Claimed before formatting so a redelivered message is never inspected twice.
        if !self.seen.claim(event.key()) {
            debug!(
                chat_id = event.chat_id,
                message_id = event.message_id,
                "skipping already seen message"
            );
            return None;
        }

        Some(format_line(
            self.classify(event.sent_at),
            &self.timestamp(event),
            event.author.display_name(),
            content,
        ))
    }

    /// Marker line for an attachment without text or caption.
    pub fn normalize_media(&mut self, event: &ChatEvent) -> Option<LogLine> {
        if event.content().is_some() {
            return None;
        }
        let media = event.media.as_ref()?;
        if !self.seen.claim(event.key()) {
            return None;
        }

        Some(format_line(
            Flag::Media,
            &self.timestamp(event),
            event.author.display_name(),
            &format!("{}:{}", media.kind.as_str(), media.file_id),
        ))
    }
}
