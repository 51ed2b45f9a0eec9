use crate::archivist::line::LogRecord;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

pub const EMPTY_HISTORY_REPLY: &str = "There aren't any recent messages to analyze.";
pub const FAILURE_REPLY: &str = "Sorry, I had trouble analyzing the recent messages.";
pub const GROUP_ONLY_REPLY: &str = "This command only works in group chats!";
const UNSURE_REPLY: &str =
    "I can see the recent messages, but I'm not quite sure what to make of them yet!";

const MIN_TOPIC_CHARS: usize = 5;
const MAX_TOPICS: usize = 2;

static WORD_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Summary,
    Roast,
    React,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Summary => "summary",
            Mode::Roast => "roast",
            Mode::React => "react",
        }
    }

    /// Modes that go through a generation provider.
    pub fn needs_generation(self) -> bool {
        !matches!(self, Mode::React)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "summary" | "summarize" => Ok(Mode::Summary),
            "roast" => Ok(Mode::Roast),
            "react" => Ok(Mode::React),
            other => Err(format!("unknown mode `{other}`; use summary, roast or react")),
        }
    }
}

/// `username: content` per record, oldest first.
pub fn transcript(records: &[LogRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{}: {}", r.username, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt for a remote generator. `None` for modes answered locally.
pub fn build_prompt(mode: Mode, chat_title: &str, records: &[LogRecord]) -> Option<String> {
    let instructions = match mode {
        Mode::Summary => {
            "Summarize the following group chat excerpt in a few short sentences. \
             Mention the main topics and any decisions or open questions. \
             Reply in plain text without markdown headings."
        }
        Mode::Roast => {
            "Write a short, good-natured roast of the people in the following group \
             chat excerpt, based only on what they wrote. Keep it playful and never \
             mean-spirited. Reply in plain text."
        }
        Mode::React => return None,
    };
    Some(format!(
        "{instructions}\n\nChat: {chat_title}\nMessages ({}):\n{}\n",
        records.len(),
        transcript(records)
    ))
}

/// Canned reaction built from counts over the records.
pub fn react(records: &[LogRecord]) -> String {
    if records.is_empty() {
        return EMPTY_HISTORY_REPLY.to_string();
    }

    let word_re = WORD_RE.get_or_init(|| Regex::new(r"\w+").expect("hardcoded word regex"));
    let mut per_user = BTreeMap::<&str, usize>::new();
    let mut first_seen = Vec::<&str>::new();
    let mut topics = Vec::<String>::new();
    let mut topic_set = HashSet::<String>::new();
    let mut questions = 0usize;

    for record in records {
        let count = per_user.entry(record.username.as_str()).or_insert(0);
        if *count == 0 {
            first_seen.push(record.username.as_str());
        }
        *count += 1;

        let content = record.content.to_lowercase();
        if content.contains('?') {
            questions += 1;
        }
        for word in word_re.find_iter(&content) {
            let word = word.as_str();
            if word.chars().count() >= MIN_TOPIC_CHARS && topic_set.insert(word.to_string()) {
                topics.push(word.to_string());
            }
        }
    }

    let mut parts = Vec::new();
    if per_user.len() > 1 {
        parts.push(format!(
            "I see a conversation between {} people!",
            per_user.len()
        ));
    }
    if questions > 0 {
        let (verb, noun) = if questions == 1 {
            ("was", "question")
        } else {
            ("were", "questions")
        };
        parts.push(format!("There {verb} {questions} {noun} asked."));
    }

    // Ties go to whoever spoke first.
    let mut most_active: Option<(&str, usize)> = None;
    for user in &first_seen {
        let count = per_user.get(user).copied().unwrap_or(0);
        if most_active.is_none_or(|(_, best)| count > best) {
            most_active = Some((*user, count));
        }
    }
    if let Some((user, count)) = most_active
        && count > 1
    {
        parts.push(format!("{user} has been quite active!"));
    }

    if !topics.is_empty() {
        let picked = topics.into_iter().take(MAX_TOPICS).collect::<Vec<_>>();
        parts.push(format!(
            "The conversation seems to be about {}.",
            picked.join(" and ")
        ));
    }

    if parts.is_empty() {
        return UNSURE_REPLY.to_string();
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archivist::line::Flag;

    fn record(username: &str, content: &str) -> LogRecord {
        LogRecord {
            flag: Flag::Live,
            timestamp: "2024-06-01 12:00:00".to_string(),
            username: username.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn empty_history_has_fixed_reply() {
        assert_eq!(react(&[]), EMPTY_HISTORY_REPLY);
    }

    #[test]
    fn reaction_counts_people_questions_and_topics() {
        let records = vec![
            record("alice", "Who is bringing snacks?"),
            record("bob", "I can bring pretzels"),
            record("alice", "great, thanks"),
        ];
        assert_eq!(
            react(&records),
            "I see a conversation between 2 people! There was 1 question asked. \
             alice has been quite active! The conversation seems to be about \
             bringing and snacks."
        );
    }

    #[test]
    fn plural_questions_and_single_speaker() {
        let records = vec![record("carol", "why? how?"), record("carol", "when?")];
        assert_eq!(
            react(&records),
            "There were 2 questions asked. carol has been quite active!"
        );
    }

    #[test]
    fn short_words_alone_give_unsure_reply() {
        assert_eq!(react(&[record("dave", "ok lol")]), UNSURE_REPLY);
    }

    #[test]
    fn prompt_carries_mode_and_transcript() {
        let records = vec![record("alice", "hi"), record("bob", "hey")];
        let prompt = build_prompt(Mode::Roast, "Book Club", &records).expect("roast prompt");
        assert!(prompt.contains("roast"));
        assert!(prompt.contains("Chat: Book Club"));
        assert!(prompt.ends_with("alice: hi\nbob: hey\n"));
        assert!(build_prompt(Mode::React, "Book Club", &records).is_none());
    }

    #[test]
    fn mode_parses_aliases() {
        assert_eq!("Summarize".parse::<Mode>(), Ok(Mode::Summary));
        assert_eq!("react".parse::<Mode>(), Ok(Mode::React));
        assert!("haiku".parse::<Mode>().is_err());
        assert!(!Mode::React.needs_generation());
    }
}
