use anyhow::Result;
use regex::Regex;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

pub const MESSAGES_FILE: &str = "messages.txt";
pub const LINKS_FILE: &str = "links.txt";
const UNNAMED_CHAT: &str = "unnamed_chat";

static UNSAFE_NAME_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct ArchivistPaths {
    pub home: PathBuf,
    pub history_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
}

impl ArchivistPaths {
    pub fn under(home: PathBuf) -> Self {
        Self {
            history_dir: home.join("chat_history"),
            logs_dir: home.join("logs"),
            state_file: home.join("state").join("archivist_state.json"),
            home,
        }
    }

    pub fn chat_dir(&self, chat_title: &str) -> PathBuf {
        self.history_dir.join(sanitize_name(chat_title))
    }

    pub fn messages_file(&self, chat_title: &str) -> PathBuf {
        self.chat_dir(chat_title).join(MESSAGES_FILE)
    }

    pub fn links_file(&self, chat_title: &str) -> PathBuf {
        self.chat_dir(chat_title).join(LINKS_FILE)
    }
}

/// Turn a chat title into a directory name: word characters, `_`, `-` and
/// spaces survive, spaces become `_`.
pub fn sanitize_name(name: &str) -> String {
    let re = UNSAFE_NAME_RE.get_or_init(|| Regex::new(r"[^\w_ -]").expect("hardcoded unsafe name regex"));
    let cleaned = re.replace_all(name, "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return UNNAMED_CHAT.to_string();
    }
    trimmed.replace(' ', "_")
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_home() -> Result<PathBuf> {
    match env::var("ARCHIVIST_HOME") {
        Ok(v) if !v.trim().is_empty() => Ok(PathBuf::from(v.trim())),
        _ => Ok(required_home_dir()?.join("archivist")),
    }
}

pub fn resolve_paths() -> Result<ArchivistPaths> {
    let defaults = ArchivistPaths::under(resolve_home()?);

    Ok(ArchivistPaths {
        history_dir: env_or_default_path("ARCHIVIST_HISTORY_DIR", defaults.history_dir),
        logs_dir: env_or_default_path("ARCHIVIST_LOGS_DIR", defaults.logs_dir),
        state_file: defaults.state_file,
        home: defaults.home,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_strips_symbols_and_underscores_spaces() {
        assert_eq!(sanitize_name("Rust Devs!"), "Rust_Devs");
        assert_eq!(sanitize_name("  weekend-plans  "), "weekend-plans");
        assert_eq!(sanitize_name("a/b\\c"), "abc");
    }

    #[test]
    fn sanitize_name_falls_back_for_empty_titles() {
        assert_eq!(sanitize_name(""), "unnamed_chat");
        assert_eq!(sanitize_name("🔥🔥"), "unnamed_chat");
    }

    #[test]
    fn chat_files_live_under_sanitized_dir() {
        let paths = ArchivistPaths::under(PathBuf::from("/data"));
        assert_eq!(
            paths.messages_file("Book Club"),
            PathBuf::from("/data/chat_history/Book_Club/messages.txt")
        );
        assert_eq!(
            paths.links_file("Book Club"),
            PathBuf::from("/data/chat_history/Book_Club/links.txt")
        );
    }
}
