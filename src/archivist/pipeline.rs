use crate::archivist::backfill::{self, BackfillPlan, HistorySource};
use crate::archivist::chatlog::{AppendLog, AppendOutcome};
use crate::archivist::config::ArchivistConfig;
use crate::archivist::event::ChatEvent;
use crate::archivist::links::link_lines;
use crate::archivist::normalizer::Normalizer;
use crate::archivist::paths::ArchivistPaths;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Chat identity used to locate its log directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatRef {
    pub id: i64,
    pub title: String,
}

impl ChatRef {
    pub fn of(event: &ChatEvent) -> Self {
        Self {
            id: event.chat_id,
            title: event.title().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveOutcome {
    pub messages: AppendOutcome,
    pub links: AppendOutcome,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillOutcome {
    pub pages: usize,
    pub scanned: usize,
    pub accepted: usize,
    pub capped: bool,
    pub messages: AppendOutcome,
    pub links: AppendOutcome,
}

/// Normalizer plus the per-chat logs it feeds.
#[derive(Debug)]
pub struct Archiver {
    paths: ArchivistPaths,
    normalizer: Normalizer,
    plan: BackfillPlan,
}

impl Archiver {
    pub fn new(paths: ArchivistPaths, cfg: &ArchivistConfig, started_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            paths,
            normalizer: Normalizer::new(started_at, cfg.capture.tz()?),
            plan: BackfillPlan {
                page_size: cfg.backfill.page_size,
                history_cap: cfg.backfill.history_cap,
                extract_links: cfg.capture.extract_links,
                record_media: cfg.capture.record_media,
            },
        })
    }

    pub fn paths(&self) -> &ArchivistPaths {
        &self.paths
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn messages_log(&self, chat_title: &str) -> AppendLog {
        AppendLog::new(self.paths.messages_file(chat_title))
    }

    pub fn links_log(&self, chat_title: &str) -> AppendLog {
        AppendLog::new(self.paths.links_file(chat_title))
    }

    /// Archive one real-time event. Produces at most one message line.
    pub fn archive_live(&mut self, event: &ChatEvent) -> Result<LiveOutcome> {
        let line = match self.normalizer.normalize(event) {
            Some(line) => Some(line),
            None if self.plan.record_media => self.normalizer.normalize_media(event),
            None => None,
        };
        let Some(line) = line else {
            return Ok(LiveOutcome::default());
        };

        let title = event.title();
        let messages = self.messages_log(title).append(std::slice::from_ref(&line))?;
        if messages.created {
            info!(chat = title, "created chat log");
        }
        let mut out = LiveOutcome {
            messages,
            ..LiveOutcome::default()
        };

        if messages.appended == 0 {
            debug!(chat = title, "message already in chat log");
        }

        // Offered even for a known line: the link log keeps its own dedup.
        if self.plan.extract_links
            && let Some(content) = event.content()
        {
            let links = link_lines(
                &self.normalizer.timestamp(event),
                event.author.display_name(),
                content,
            );
            out.links = self.links_log(title).append(&links)?;
        }

        if messages.appended > 0 {
            info!(
                chat = title,
                message_id = event.message_id,
                links = out.links.appended,
                "saved new message"
            );
        }
        Ok(out)
    }

    /// Catch up on `chat` from a newest-first history source.
    pub fn backfill(
        &mut self,
        chat: &ChatRef,
        source: &mut dyn HistorySource,
    ) -> Result<BackfillOutcome> {
        let log = self.messages_log(&chat.title);
        let existing = log.existing_lines()?;
        let collected =
            backfill::collect(&mut self.normalizer, chat.id, source, &existing, &self.plan)?;

        let messages = log.append(&collected.lines)?;
        let links = self.links_log(&chat.title).append(&collected.links)?;

        let out = BackfillOutcome {
            pages: collected.pages,
            scanned: collected.scanned,
            accepted: collected.lines.len(),
            capped: collected.capped,
            messages,
            links,
        };
        if out.messages.appended > 0 {
            info!(
                chat = chat.title.as_str(),
                appended = out.messages.appended,
                capped = out.capped,
                "backfilled messages"
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archivist::backfill::BufferedHistory;
    use crate::archivist::event::{Author, MediaKind, MediaRef};
    use chrono::TimeZone;
    use std::fs;
    use tempfile::tempdir;

    fn archiver(root: &std::path::Path, cfg: &ArchivistConfig) -> Archiver {
        let started = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Archiver::new(ArchivistPaths::under(root.to_path_buf()), cfg, started).expect("archiver")
    }

    fn event(message_id: i64, secs: i64, text: Option<&str>) -> ChatEvent {
        ChatEvent {
            chat_id: -42,
            chat_title: Some("Weekend Plans".to_string()),
            message_id,
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
                + chrono::Duration::seconds(secs),
            author: Author {
                username: None,
                first_name: Some("Dana".to_string()),
            },
            text: text.map(str::to_string),
            caption: None,
            media: None,
        }
    }

    fn messages(root: &std::path::Path) -> String {
        fs::read_to_string(root.join("chat_history/Weekend_Plans/messages.txt")).unwrap_or_default()
    }

    #[test]
    fn same_event_twice_is_one_line() {
        let tmp = tempdir().expect("tempdir");
        let mut archiver = archiver(tmp.path(), &ArchivistConfig::default());
        let hi = event(1, 0, Some("hi"));

        archiver.archive_live(&hi).expect("first");
        archiver.archive_live(&hi).expect("second");

        assert_eq!(messages(tmp.path()), "[BACKFILL] [2024-05-01 08:00:00] Dana: hi\n");
    }

    #[test]
    fn identical_text_under_new_id_is_suppressed() {
        let tmp = tempdir().expect("tempdir");
        let mut archiver = archiver(tmp.path(), &ArchivistConfig::default());

        let first = archiver.archive_live(&event(1, 0, Some("hi"))).expect("first");
        let second = archiver.archive_live(&event(2, 0, Some("hi"))).expect("second");

        assert_eq!(first.messages.appended, 1);
        assert_eq!(second.messages.appended, 0);
        assert_eq!(second.messages.duplicates, 1);
        assert_eq!(messages(tmp.path()).lines().count(), 1);
    }

    #[test]
    fn restart_keeps_file_as_source_of_truth() {
        let tmp = tempdir().expect("tempdir");
        let hi = event(1, 0, Some("hi"));
        archiver(tmp.path(), &ArchivistConfig::default())
            .archive_live(&hi)
            .expect("first run");
        let out = archiver(tmp.path(), &ArchivistConfig::default())
            .archive_live(&hi)
            .expect("second run");

        assert_eq!(out.messages.appended, 0);
        assert_eq!(messages(tmp.path()).lines().count(), 1);
    }

    #[test]
    fn links_go_to_companion_log() {
        let tmp = tempdir().expect("tempdir");
        let mut archiver = archiver(tmp.path(), &ArchivistConfig::default());

        let out = archiver
            .archive_live(&event(1, 0, Some("tickets at https://venue.example/tix")))
            .expect("archive");
        assert_eq!(out.links.appended, 1);

        let links =
            fs::read_to_string(tmp.path().join("chat_history/Weekend_Plans/links.txt")).expect("links");
        assert_eq!(links, "[2024-05-01 08:00:00] Dana: https://venue.example/tix\n");
    }

    #[test]
    fn lost_link_log_is_refilled_from_known_messages() {
        let tmp = tempdir().expect("tempdir");
        let tickets = event(1, 0, Some("tickets at https://venue.example/tix"));
        archiver(tmp.path(), &ArchivistConfig::default())
            .archive_live(&tickets)
            .expect("first run");
        let links_path = tmp.path().join("chat_history/Weekend_Plans/links.txt");
        fs::remove_file(&links_path).expect("drop links");

        let out = archiver(tmp.path(), &ArchivistConfig::default())
            .archive_live(&tickets)
            .expect("second run");

        assert_eq!(out.messages.appended, 0);
        assert_eq!(out.links.appended, 1);
        assert_eq!(messages(tmp.path()).lines().count(), 1);
        assert!(fs::read_to_string(&links_path).expect("links").contains("venue.example"));
    }

    #[test]
    fn backfill_records_media_when_enabled() {
        let tmp = tempdir().expect("tempdir");
        let mut cfg = ArchivistConfig::default();
        cfg.capture.record_media = true;
        let mut archiver = archiver(tmp.path(), &cfg);
        let mut photo = event(9, 0, None);
        photo.media = Some(MediaRef {
            kind: MediaKind::Photo,
            file_id: "AgAD".to_string(),
        });

        let chat = ChatRef::of(&photo);
        let mut source = BufferedHistory::new(vec![photo]);
        let out = archiver.backfill(&chat, &mut source).expect("backfill");

        assert_eq!(out.messages.appended, 1);
        assert_eq!(messages(tmp.path()), "[MEDIA] [2024-05-01 08:00:00] Dana: photo:AgAD\n");
    }

    #[test]
    fn media_marker_respects_config() {
        let tmp = tempdir().expect("tempdir");
        let mut photo = event(7, 0, None);
        photo.media = Some(MediaRef {
            kind: MediaKind::Photo,
            file_id: "AgAD".to_string(),
        });

        let mut quiet = archiver(tmp.path(), &ArchivistConfig::default());
        quiet.archive_live(&photo).expect("archive");
        assert_eq!(messages(tmp.path()), "");

        let mut cfg = ArchivistConfig::default();
        cfg.capture.record_media = true;
        let mut recording = archiver(tmp.path(), &cfg);
        recording.archive_live(&photo).expect("archive");
        assert_eq!(messages(tmp.path()), "[MEDIA] [2024-05-01 08:00:00] Dana: photo:AgAD\n");
    }

    #[test]
    fn backfill_appends_after_live_history_in_chronological_order() {
        let tmp = tempdir().expect("tempdir");
        let mut archiver = archiver(tmp.path(), &ArchivistConfig::default());
        archiver.archive_live(&event(1, 0, Some("first"))).expect("live");

        let mut source = BufferedHistory::new(vec![
            event(4, 30, Some("C")),
            event(3, 20, Some("B")),
            event(2, 10, Some("A")),
            event(1, 0, Some("first")),
        ]);
        let chat = ChatRef {
            id: -42,
            title: "Weekend Plans".to_string(),
        };
        let out = archiver.backfill(&chat, &mut source).expect("backfill");

        assert_eq!(out.accepted, 3);
        assert_eq!(out.messages.appended, 3);
        let contents = messages(tmp.path())
            .lines()
            .map(|l| l.rsplit(": ").next().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["first", "A", "B", "C"]);
    }
}
