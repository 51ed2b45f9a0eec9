//! Paged catch-up over historical events.
//!
//! Sources deliver history newest-first. Accepted lines are collected in
//! delivery order and the whole batch is reversed exactly once before it is
//! appended, which puts the new lines on disk oldest-first.

use crate::archivist::event::ChatEvent;
use crate::archivist::line::LogLine;
use crate::archivist::links::link_lines;
use crate::archivist::normalizer::Normalizer;
use anyhow::Result;
use std::collections::HashSet;

/// Paginated history, newest page first.
pub trait HistorySource {
    /// Up to `limit` events. A page shorter than `limit` means no more history.
    fn next_page(&mut self, limit: usize) -> Result<Vec<ChatEvent>>;
}

/// History already held in memory, served in the order it was given.
#[derive(Debug, Clone, Default)]
pub struct BufferedHistory {
    events: Vec<ChatEvent>,
    cursor: usize,
}

impl BufferedHistory {
    /// `events` must already be newest-first.
    pub fn new(events: Vec<ChatEvent>) -> Self {
        Self { events, cursor: 0 }
    }

    /// Build from an oldest-first window, such as a Telegram update queue.
    pub fn from_chronological(mut events: Vec<ChatEvent>) -> Self {
        events.reverse();
        Self::new(events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl HistorySource for BufferedHistory {
    fn next_page(&mut self, limit: usize) -> Result<Vec<ChatEvent>> {
        let end = self.cursor.saturating_add(limit).min(self.events.len());
        let page = self.events[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(page)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillPlan {
    pub page_size: usize,
    pub history_cap: usize,
    pub extract_links: bool,
    /// Attachments without text become MEDIA marker lines.
    pub record_media: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CollectedHistory {
    /// Accepted lines, oldest first.
    pub lines: Vec<LogLine>,
    /// Link lines for every message seen in the walk, oldest first.
    pub links: Vec<LogLine>,
    pub pages: usize,
    pub scanned: usize,
    pub capped: bool,
}

/// Walk `source` for `chat_id` until it runs dry or `history_cap` lines are
/// accepted. `existing` holds the lines already in the chat log.
pub fn collect(
    normalizer: &mut Normalizer,
    chat_id: i64,
    source: &mut dyn HistorySource,
    existing: &HashSet<String>,
    plan: &BackfillPlan,
) -> Result<CollectedHistory> {
    let mut out = CollectedHistory::default();
    let mut link_batches = Vec::<Vec<LogLine>>::new();

    'pages: while out.lines.len() < plan.history_cap {
        let page = source.next_page(plan.page_size)?;
        if page.is_empty() {
            break;
        }
        out.pages += 1;
        let page_len = page.len();

        for event in &page {
            out.scanned += 1;
            if event.chat_id != chat_id {
                continue;
            }
            let line = match normalizer.normalize(event) {
                Some(line) => line,
                None if plan.record_media => match normalizer.normalize_media(event) {
                    Some(marker) => marker,
                    None => continue,
                },
                None => continue,
            };

            // The link log dedups on its own, so links of lines already on
            // disk are offered again.
            if plan.extract_links
                && let Some(content) = event.content()
            {
                link_batches.push(link_lines(
                    &normalizer.timestamp(event),
                    event.author.display_name(),
                    content,
                ));
            }
            if existing.contains(line.body()) {
                continue;
            }
            out.lines.push(line);

            if out.lines.len() >= plan.history_cap {
                out.capped = true;
                break 'pages;
            }
        }

        if page_len < plan.page_size {
            break;
        }
    }

    out.lines.reverse();
    link_batches.reverse();
    out.links = link_batches.into_iter().flatten().collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archivist::event::{Author, MediaKind, MediaRef};
    use chrono::{DateTime, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn event(chat_id: i64, message_id: i64, secs: i64, text: &str) -> ChatEvent {
        ChatEvent {
            chat_id,
            chat_title: Some("Book Club".to_string()),
            message_id,
            sent_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            author: Author {
                username: Some("alice".to_string()),
                first_name: None,
            },
            text: Some(text.to_string()),
            caption: None,
            media: None,
        }
    }

    fn plan(page_size: usize, history_cap: usize) -> BackfillPlan {
        BackfillPlan {
            page_size,
            history_cap,
            extract_links: true,
            record_media: false,
        }
    }

    struct CountingSource {
        inner: BufferedHistory,
        calls: usize,
    }

    impl HistorySource for CountingSource {
        fn next_page(&mut self, limit: usize) -> Result<Vec<ChatEvent>> {
            self.calls += 1;
            self.inner.next_page(limit)
        }
    }

    #[test]
    fn newest_first_delivery_lands_oldest_first() {
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = BufferedHistory::new(vec![
            event(1, 3, 30, "C"),
            event(1, 2, 20, "B"),
            event(1, 1, 10, "A"),
        ]);

        let out = collect(&mut normalizer, 1, &mut source, &HashSet::new(), &plan(100, 1000))
            .expect("collect");

        let contents = out
            .lines
            .iter()
            .map(|l| l.body().rsplit(": ").next().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["A", "B", "C"]);
        assert_eq!(out.pages, 1);
        assert!(!out.capped);
    }

    #[test]
    fn stops_at_history_cap_with_more_history_left() {
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let events = (0..50)
            .rev()
            .map(|i| event(1, i, i, &format!("m{i}")))
            .collect::<Vec<_>>();
        let mut source = BufferedHistory::new(events);

        let out = collect(&mut normalizer, 1, &mut source, &HashSet::new(), &plan(10, 15))
            .expect("collect");

        assert_eq!(out.lines.len(), 15);
        assert!(out.capped);
        assert_eq!(out.pages, 2);
        assert!(out.lines[0].body().ends_with("alice: m35"));
        assert!(out.lines[14].body().ends_with("alice: m49"));
    }

    #[test]
    fn short_page_ends_paging() {
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = CountingSource {
            inner: BufferedHistory::new((0..5).map(|i| event(1, i, i, "x")).collect()),
            calls: 0,
        };

        collect(&mut normalizer, 1, &mut source, &HashSet::new(), &plan(10, 1000))
            .expect("collect");
        assert_eq!(source.calls, 1);
    }

    #[test]
    fn skips_other_chats_and_lines_already_on_disk() {
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let on_disk = normalizer
            .normalize(&event(1, 100, 5, "old"))
            .expect("line")
            .body()
            .to_string();
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut existing = HashSet::new();
        existing.insert(on_disk);

        let mut source = BufferedHistory::new(vec![
            event(2, 1, 9, "elsewhere"),
            event(1, 2, 8, "new"),
            event(1, 1, 5, "old"),
        ]);

        let out = collect(&mut normalizer, 1, &mut source, &existing, &plan(100, 1000))
            .expect("collect");
        assert_eq!(out.lines.len(), 1);
        assert!(out.lines[0].body().ends_with("alice: new"));
        assert_eq!(out.scanned, 3);
    }

    #[test]
    fn links_follow_line_order() {
        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = BufferedHistory::new(vec![
            event(1, 2, 20, "second https://b.example"),
            event(1, 1, 10, "first https://a.example"),
        ]);

        let out = collect(&mut normalizer, 1, &mut source, &HashSet::new(), &plan(100, 1000))
            .expect("collect");
        assert_eq!(out.links.len(), 2);
        assert!(out.links[0].body().ends_with("https://a.example"));
        assert!(out.links[1].body().ends_with("https://b.example"));
    }

    #[test]
    fn media_markers_join_backfill_when_recorded() {
        let mut photo = event(1, 2, 20, "");
        photo.text = None;
        photo.media = Some(MediaRef {
            kind: MediaKind::Photo,
            file_id: "AgAD".to_string(),
        });
        let history = vec![photo, event(1, 1, 10, "before the photo")];

        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = BufferedHistory::new(history.clone());
        let quiet = collect(&mut normalizer, 1, &mut source, &HashSet::new(), &plan(100, 1000))
            .expect("collect");
        assert_eq!(quiet.lines.len(), 1);

        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = BufferedHistory::new(history);
        let recording = BackfillPlan {
            record_media: true,
            ..plan(100, 1000)
        };
        let out = collect(&mut normalizer, 1, &mut source, &HashSet::new(), &recording)
            .expect("collect");
        assert_eq!(out.lines.len(), 2);
        assert!(out.lines[0].body().ends_with("alice: before the photo"));
        assert!(out.lines[1].body().starts_with("[MEDIA] "));
        assert!(out.lines[1].body().ends_with("alice: photo:AgAD"));
    }

    #[test]
    fn links_of_lines_already_on_disk_are_still_offered() {
        let line = Normalizer::new(start(), chrono_tz::UTC)
            .normalize(&event(1, 1, 10, "see https://a.example"))
            .expect("line");
        let mut existing = HashSet::new();
        existing.insert(line.body().to_string());

        let mut normalizer = Normalizer::new(start(), chrono_tz::UTC);
        let mut source = BufferedHistory::new(vec![event(1, 1, 10, "see https://a.example")]);
        let out = collect(&mut normalizer, 1, &mut source, &existing, &plan(100, 1000))
            .expect("collect");

        assert!(out.lines.is_empty());
        assert_eq!(out.links.len(), 1);
        assert!(out.links[0].body().ends_with("https://a.example"));
    }

    #[test]
    fn from_chronological_serves_newest_first() {
        let mut history = BufferedHistory::from_chronological(vec![
            event(1, 1, 10, "A"),
            event(1, 2, 20, "B"),
        ]);
        let page = history.next_page(1).expect("page");
        assert_eq!(page[0].message_id, 2);
        assert_eq!(history.len(), 2);
    }
}
