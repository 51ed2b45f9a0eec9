use crate::archivist::line::{LogLine, single_line};
use regex::Regex;
use std::sync::OnceLock;

static URL_RE: OnceLock<Regex> = OnceLock::new();

const TRAILING_PUNCT: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '"'];

/// URL-shaped substrings in message content, in order of appearance.
pub fn extract_urls(content: &str) -> Vec<String> {
    let re = URL_RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"'`]+"#).expect("hardcoded url regex")
    });
    re.find_iter(content)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCT).to_string())
        .filter(|url| url.len() > "www.".len())
        .collect()
}

/// Lines for the per-chat links log: `[<timestamp>] <author>: <url>`.
pub fn link_lines(timestamp: &str, author: &str, content: &str) -> Vec<LogLine> {
    extract_urls(content)
        .into_iter()
        .map(|url| LogLine::from_text(format!("[{timestamp}] {}: {url}", single_line(author))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_http_and_www_links() {
        let urls = extract_urls(
            "see https://example.com/a?b=1, and www.rust-lang.org. also HTTP://X.io/path)",
        );
        assert_eq!(
            urls,
            vec![
                "https://example.com/a?b=1".to_string(),
                "www.rust-lang.org".to_string(),
                "HTTP://X.io/path".to_string(),
            ]
        );
    }

    #[test]
    fn plain_text_has_no_links() {
        assert!(extract_urls("no links here, just www").is_empty());
    }

    #[test]
    fn link_lines_use_log_layout() {
        let lines = link_lines("2024-01-01 10:00:00", "alice", "read https://docs.rs");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].as_str(), "[2024-01-01 10:00:00] alice: https://docs.rs\n");
    }
}
