//! Long-polling bot runtime.
//!
//! One thread: poll, archive group messages, answer commands, persist the
//! update offset. Failures inside a single update are logged and never stop
//! the loop.

use crate::archivist::analysis::{FAILURE_REPLY, GROUP_ONLY_REPLY, Mode};
use crate::archivist::audit::{self, AuditEvent, AuditPhase};
use crate::archivist::backfill::BufferedHistory;
use crate::archivist::config::ArchivistConfig;
use crate::archivist::generate::{self, GeneratedReply, GenerationInput, Generator};
use crate::archivist::paths::ArchivistPaths;
use crate::archivist::pipeline::{Archiver, BackfillOutcome, ChatRef};
use crate::archivist::state::{self, ArchivistState};
use crate::archivist::util::now_epoch_secs;
use crate::telegram::api::BotApi;
use crate::telegram::history;
use crate::telegram::types::{BotCommand, Chat, Message, Update, User, is_command, parse_command};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const POLL_RETRY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Default)]
pub struct CatchUpSummary {
    pub chats: usize,
    pub pages: usize,
    pub appended: usize,
    pub capped_chats: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub updates: usize,
    pub archived: usize,
    pub replies: usize,
}

pub struct Bot {
    api: BotApi,
    me: User,
    cfg: ArchivistConfig,
    archiver: Archiver,
    generator: Box<dyn Generator>,
    state: ArchivistState,
}

impl Bot {
    pub fn connect(
        token: &str,
        paths: ArchivistPaths,
        cfg: ArchivistConfig,
        started_at: DateTime<Utc>,
    ) -> Result<Self> {
        let api = BotApi::new(&cfg.telegram.api_base, token, cfg.telegram.poll_timeout_secs)?;
        let me = api.get_me()?;
        info!(
            bot = me.username.as_deref().unwrap_or("?"),
            id = me.id,
            "connected to telegram"
        );
        let state = state::load(&paths)?;
        let generator = generate::resolve_generator(&cfg.llm);
        let archiver = Archiver::new(paths, &cfg, started_at)?;
        Ok(Self {
            api,
            me,
            cfg,
            archiver,
            generator,
            state,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.me.username.as_deref()
    }

    pub fn generator_label(&self) -> &'static str {
        self.generator.label()
    }

    fn paths(&self) -> &ArchivistPaths {
        self.archiver.paths()
    }

    fn save_state(&mut self) -> Result<()> {
        self.state.last_poll_epoch_secs = now_epoch_secs()?;
        state::save(self.archiver.paths(), &self.state)?;
        Ok(())
    }

    /// Drain queued updates and backfill every group chat found in them.
    /// Commands inside the drained window are not answered.
    pub fn catch_up(&mut self) -> Result<CatchUpSummary> {
        let window = history::fetch_pending(
            &self.api,
            self.state.next_update_offset,
            self.cfg.backfill.page_size,
            self.cfg.backfill.max_fetch_pages,
        )?;
        let mut summary = CatchUpSummary {
            pages: window.pages,
            ..CatchUpSummary::default()
        };
        let now = now_epoch_secs()?;

        for (chat, mut source) in history::group_histories(&window.updates) {
            if let Some(out) = self.backfill_chat(&chat, &mut source, now) {
                summary.chats += 1;
                summary.appended += out.messages.appended;
                if out.capped {
                    summary.capped_chats += 1;
                }
            }
        }

        self.state.next_update_offset = window.next_offset;
        self.save_state()?;
        info!(
            chats = summary.chats,
            pages = summary.pages,
            appended = summary.appended,
            "catch-up backfill finished"
        );
        Ok(summary)
    }

    /// Backfill the chat the bot was just added to. Everything else in the
    /// drained window goes through the regular update path afterwards.
    fn join_catch_up(&mut self, chat: &Chat, summary: &mut CycleSummary) -> Result<()> {
        let window = history::fetch_pending(
            &self.api,
            self.state.next_update_offset,
            self.cfg.backfill.page_size,
            self.cfg.backfill.max_fetch_pages,
        )?;
        let window = history::split_join_window(window, chat.id);
        let now = now_epoch_secs()?;
        self.state
            .remember_chat(chat.id, chat.title.as_deref().unwrap_or_default(), now);

        // Same rule as `poll_once`: offset first, then handling.
        self.state.next_update_offset = window.next_offset;
        self.save_state()?;

        if let Some((joined, mut source)) = window.history
            && let Some(out) = self.backfill_chat(&joined, &mut source, now)
        {
            summary.archived += out.messages.appended;
        }
        debug!(deferred = window.deferred.len(), "handling updates drained on join");
        summary.updates += window.deferred.len();
        for update in &window.deferred {
            self.handle_update(update, summary);
        }
        self.save_state()
    }

    fn backfill_chat(
        &mut self,
        chat: &ChatRef,
        source: &mut BufferedHistory,
        now: u64,
    ) -> Option<BackfillOutcome> {
        debug!(chat = chat.title.as_str(), pending = source.len(), "backfilling chat");
        self.state.remember_chat(chat.id, &chat.title, now);
        match self.archiver.backfill(chat, source) {
            Ok(out) => {
                self.state.mark_backfilled(chat.id, now);
                let event = AuditEvent::ok(
                    AuditPhase::Backfill,
                    format!(
                        "pages={} scanned={} appended={} duplicates={} capped={}",
                        out.pages,
                        out.scanned,
                        out.messages.appended,
                        out.messages.duplicates,
                        out.capped
                    ),
                );
                let _ = audit::record(self.paths(), &event.in_chat(&chat.title));
                Some(out)
            }
            Err(err) => {
                error!(chat = chat.title.as_str(), "backfill failed: {err:#}");
                let event = AuditEvent::failed(AuditPhase::Backfill, format!("{err:#}"));
                let _ = audit::record(self.paths(), &event.in_chat(&chat.title));
                None
            }
        }
    }

    /// One long-poll round trip.
    pub fn poll_once(&mut self) -> Result<CycleSummary> {
        let updates = self.api.get_updates(
            self.state.next_update_offset,
            self.cfg.backfill.page_size,
            self.cfg.telegram.poll_timeout_secs,
        )?;
        let mut summary = CycleSummary {
            updates: updates.len(),
            ..CycleSummary::default()
        };
        let Some(last) = updates.last().map(|u| u.update_id) else {
            return Ok(summary);
        };

        // Offset is persisted before handling: commands are answered at most once.
        self.state.next_update_offset = Some(last + 1);
        self.save_state()?;

        for update in &updates {
            self.handle_update(update, &mut summary);
        }
        self.save_state()?;
        Ok(summary)
    }

    /// Poll forever, backing off after transport errors.
    pub fn run_forever(&mut self) -> Result<()> {
        loop {
            if let Err(err) = self.poll_once() {
                warn!("poll failed, retrying in {POLL_RETRY_SECS}s: {err:#}");
                thread::sleep(Duration::from_secs(POLL_RETRY_SECS));
            }
        }
    }

    fn handle_update(&mut self, update: &Update, summary: &mut CycleSummary) {
        if let Some(member) = &update.my_chat_member
            && member.is_bot_join(self.me.id)
        {
            info!(
                chat = member.chat.title.as_deref().unwrap_or(""),
                "joined new group"
            );
            if let Err(err) = self.join_catch_up(&member.chat, summary) {
                error!("join backfill failed: {err:#}");
            }
            return;
        }

        let Some(message) = &update.message else {
            return;
        };

        if let Some(text) = message.text.as_deref()
            && is_command(text)
        {
            if let Some(command) = parse_command(text, self.username()) {
                match self.handle_command(message, &command) {
                    Ok(true) => summary.replies += 1,
                    Ok(false) => {}
                    Err(err) => error!(command = command.name.as_str(), "reply failed: {err:#}"),
                }
            }
            return;
        }

        if !message.chat.is_group() {
            return;
        }
        let Some(event) = message.to_event() else {
            warn!(
                message_id = message.message_id,
                "dropping message with invalid timestamp"
            );
            return;
        };

        if let Ok(now) = now_epoch_secs()
            && self.state.remember_chat(event.chat_id, event.title(), now)
        {
            info!(chat = event.title(), "tracking new group chat");
        }
        match self.archiver.archive_live(&event) {
            Ok(out) => summary.archived += out.messages.appended,
            Err(err) => error!(chat = event.title(), "message error: {err:#}"),
        }
    }

    /// Returns whether a reply was sent.
    fn handle_command(&self, message: &Message, command: &BotCommand) -> Result<bool> {
        let mode = match command.name.as_str() {
            "summary" => Mode::Summary,
            "roast" => Mode::Roast,
            "react" => Mode::React,
            _ => return Ok(false),
        };

        if !message.chat.is_group() {
            self.api
                .send_message(message.chat.id, GROUP_ONLY_REPLY, Some(message.message_id))?;
            return Ok(true);
        }

        let title = message.chat.title.clone().unwrap_or_default();
        info!(chat = title.as_str(), mode = mode.as_str(), "processing command");
        let text = match self.compose_reply(mode, &title, command.args.first()) {
            Ok(reply) => reply.text,
            Err(err) => {
                error!(chat = title.as_str(), mode = mode.as_str(), "command error: {err:#}");
                FAILURE_REPLY.to_string()
            }
        };
        self.api
            .send_message(message.chat.id, &text, Some(message.message_id))?;
        Ok(true)
    }

    fn compose_reply(
        &self,
        mode: Mode,
        chat_title: &str,
        count_arg: Option<&String>,
    ) -> Result<GeneratedReply> {
        let lines = reply_window(&self.cfg, mode, count_arg.map(String::as_str));
        let records = self.archiver.messages_log(chat_title).tail(lines)?;
        let input = GenerationInput {
            mode,
            chat_title,
            records: &records,
        };
        generate::reply(
            self.generator.as_ref(),
            &input,
            self.cfg.analysis.max_reply_chars,
        )
    }
}

/// How many trailing lines a command reads. `/react` ignores its argument.
pub fn reply_window(cfg: &ArchivistConfig, mode: Mode, arg: Option<&str>) -> usize {
    if mode == Mode::React {
        return cfg.analysis.react_lines;
    }
    arg.and_then(|raw| raw.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .map(|n| n.min(cfg.backfill.history_cap))
        .unwrap_or(cfg.analysis.recent_lines)
}
