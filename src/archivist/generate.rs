//! Reply generation for the summary and roast commands.
//!
//! Remote providers are resolved from `[llm]` config first and then from the
//! usual API key variables. Without a usable key the local generator answers
//! from counts over the transcript.

use crate::archivist::analysis::{self, EMPTY_HISTORY_REPLY, Mode};
use crate::archivist::config::LlmConfig;
use crate::archivist::line::LogRecord;
use crate::archivist::util::truncate_with_ellipsis;
use crate::error::ArchivistError;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_OUTPUT_TOKENS: u32 = 800;
const TEMPERATURE: f64 = 0.7;

pub struct GenerationInput<'a> {
    pub mode: Mode,
    pub chat_title: &'a str,
    pub records: &'a [LogRecord],
}

impl GenerationInput<'_> {
    fn prompt(&self) -> Result<String> {
        analysis::build_prompt(self.mode, self.chat_title, self.records)
            .with_context(|| format!("{} replies are built locally", self.mode))
    }
}

pub trait Generator {
    fn label(&self) -> &'static str;
    fn generate(&self, input: &GenerationInput<'_>) -> Result<String>;
}

pub struct LocalGenerator;

pub struct OpenAiGenerator {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct AnthropicGenerator {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct GeminiGenerator {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

pub struct OpenAiCompatGenerator {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteProvider {
    OpenAi,
    Anthropic,
    Gemini,
    OpenAiCompatible,
}

impl RemoteProvider {
    pub fn label(self) -> &'static str {
        match self {
            RemoteProvider::OpenAi => "openai",
            RemoteProvider::Anthropic => "anthropic",
            RemoteProvider::Gemini => "gemini",
            RemoteProvider::OpenAiCompatible => "openai-compatible",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteModelConfig {
    pub provider: RemoteProvider,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub provider: String,
    pub text: String,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn parse_provider_alias(raw: &str) -> Option<RemoteProvider> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "openai" => Some(RemoteProvider::OpenAi),
        "anthropic" | "claude" => Some(RemoteProvider::Anthropic),
        "gemini" | "google" => Some(RemoteProvider::Gemini),
        "openai-compatible" | "compatible" | "deepseek" => Some(RemoteProvider::OpenAiCompatible),
        _ => None,
    }
}

fn parse_prefixed_model(raw: &str) -> (Option<RemoteProvider>, String) {
    let trimmed = raw.trim();
    if let Some((prefix, model)) = trimmed.split_once(':')
        && let Some(provider) = parse_provider_alias(prefix)
    {
        return (Some(provider), model.trim().to_string());
    }
    (None, trimmed.to_string())
}

fn infer_provider_from_model(model: &str) -> Option<RemoteProvider> {
    let lower = model.trim().to_ascii_lowercase();
    if lower.starts_with("deepseek-") {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if lower.starts_with("claude-") {
        return Some(RemoteProvider::Anthropic);
    }
    if lower.starts_with("gemini-") {
        return Some(RemoteProvider::Gemini);
    }
    if lower.starts_with("gpt-") || lower.starts_with("o3") || lower.starts_with("o4") {
        return Some(RemoteProvider::OpenAi);
    }
    None
}

fn first_available_provider(lookup: &dyn Fn(&str) -> Option<String>) -> Option<RemoteProvider> {
    if lookup("AI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAiCompatible);
    }
    if lookup("OPENAI_API_KEY").is_some() {
        return Some(RemoteProvider::OpenAi);
    }
    if lookup("ANTHROPIC_API_KEY").is_some() {
        return Some(RemoteProvider::Anthropic);
    }
    if lookup("GEMINI_API_KEY").is_some() {
        return Some(RemoteProvider::Gemini);
    }
    None
}

fn default_model_for_provider(provider: RemoteProvider) -> &'static str {
    match provider {
        RemoteProvider::OpenAi => "gpt-4.1-mini",
        RemoteProvider::Anthropic => "claude-3-5-haiku-latest",
        RemoteProvider::Gemini => "gemini-2.5-flash-lite",
        RemoteProvider::OpenAiCompatible => "deepseek-chat",
    }
}

fn resolve_api_key(
    provider: RemoteProvider,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    match provider {
        RemoteProvider::OpenAi => lookup("OPENAI_API_KEY").or_else(|| lookup("AI_API_KEY")),
        RemoteProvider::Anthropic => lookup("ANTHROPIC_API_KEY").or_else(|| lookup("AI_API_KEY")),
        RemoteProvider::Gemini => lookup("GEMINI_API_KEY").or_else(|| lookup("AI_API_KEY")),
        RemoteProvider::OpenAiCompatible => lookup("AI_API_KEY")
            .or_else(|| lookup("DEEPSEEK_API_KEY"))
            .or_else(|| lookup("OPENAI_API_KEY")),
    }
}

fn resolve_compatible_base_url(model: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    if let Some(base) = lookup("AI_BASE_URL") {
        return base;
    }
    if model.trim().to_ascii_lowercase().starts_with("deepseek-") {
        return "https://api.deepseek.com".to_string();
    }
    "https://api.openai.com".to_string()
}

/// Pick a remote provider, or `None` for local generation. `lookup` reads
/// environment variables.
pub fn resolve_remote_config(
    cfg: &LlmConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<RemoteModelConfig> {
    if cfg.provider.eq_ignore_ascii_case("local") {
        return None;
    }

    let configured_model = Some(cfg.model.trim().to_string())
        .filter(|m| !m.is_empty())
        .or_else(|| lookup("AI_MODEL"));
    let (prefixed_provider, mut model) = configured_model
        .as_deref()
        .map(parse_prefixed_model)
        .unwrap_or((None, String::new()));

    let provider = parse_provider_alias(&cfg.provider)
        .or_else(|| lookup("AI_PROVIDER").as_deref().and_then(parse_provider_alias))
        .or(prefixed_provider)
        .or_else(|| infer_provider_from_model(&model))
        .or_else(|| first_available_provider(lookup))?;

    if model.is_empty() {
        model = default_model_for_provider(provider).to_string();
    }
    let base_url = match provider {
        RemoteProvider::OpenAiCompatible => Some(resolve_compatible_base_url(&model, lookup)),
        _ => None,
    };
    let api_key = resolve_api_key(provider, lookup)?;
    Some(RemoteModelConfig {
        provider,
        model,
        api_key,
        base_url,
    })
}

/// The provider named in `llm.provider` when no API key for it is set, so
/// generation would quietly run locally instead.
pub fn unkeyed_configured_provider(
    cfg: &LlmConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Option<&'static str> {
    let provider = parse_provider_alias(&cfg.provider)?;
    match resolve_api_key(provider, lookup) {
        Some(_) => None,
        None => Some(provider.label()),
    }
}

pub fn resolve_generator(cfg: &LlmConfig) -> Box<dyn Generator> {
    if let Some(provider) = unkeyed_configured_provider(cfg, &env_non_empty) {
        warn!(provider, "llm.provider is set but no API key was found; using local replies");
    }
    let Some(remote) = resolve_remote_config(cfg, &env_non_empty) else {
        return Box::new(LocalGenerator);
    };
    let timeout = Duration::from_secs(cfg.timeout_secs);
    debug!(provider = remote.provider.label(), model = %remote.model, "resolved generation provider");
    match remote.provider {
        RemoteProvider::OpenAi => Box::new(OpenAiGenerator {
            api_key: remote.api_key,
            model: remote.model,
            timeout,
        }),
        RemoteProvider::Anthropic => Box::new(AnthropicGenerator {
            api_key: remote.api_key,
            model: remote.model,
            timeout,
        }),
        RemoteProvider::Gemini => Box::new(GeminiGenerator {
            api_key: remote.api_key,
            model: remote.model,
            timeout,
        }),
        RemoteProvider::OpenAiCompatible => Box::new(OpenAiCompatGenerator {
            base_url: remote
                .base_url
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: remote.api_key,
            model: remote.model,
            timeout,
        }),
    }
}

/// Provider label `resolve_generator` would pick right now.
pub fn active_provider_label(cfg: &LlmConfig) -> &'static str {
    resolve_remote_config(cfg, &env_non_empty)
        .map(|remote| remote.provider.label())
        .unwrap_or("local")
}

fn http_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn join_text_parts(parts: &[Value]) -> Option<String> {
    let chunks = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>();
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_openai_text(json: &Value) -> Option<String> {
    if let Some(text) = json.get("output_text").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let mut chunks = Vec::new();
    for item in json.get("output").and_then(Value::as_array)? {
        if let Some(text) = item
            .get("content")
            .and_then(Value::as_array)
            .and_then(|parts| join_text_parts(parts))
        {
            chunks.push(text);
        }
    }
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

fn extract_anthropic_text(json: &Value) -> Option<String> {
    join_text_parts(json.get("content").and_then(Value::as_array)?)
}

fn extract_gemini_text(json: &Value) -> Option<String> {
    let parts = json
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(Value::as_array)?;
    join_text_parts(parts)
}

fn extract_openai_compatible_text(json: &Value) -> Option<String> {
    let first = json.get("choices").and_then(Value::as_array)?.first()?;
    match first.get("message")?.get("content")? {
        Value::String(s) => Some(s.to_string()),
        Value::Array(parts) => join_text_parts(parts),
        _ => None,
    }
}

impl Generator for LocalGenerator {
    fn label(&self) -> &'static str {
        "local"
    }

    fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        if input.records.is_empty() {
            return Ok(EMPTY_HISTORY_REPLY.to_string());
        }

        let mut per_user = BTreeMap::<&str, usize>::new();
        for record in input.records {
            *per_user.entry(record.username.as_str()).or_insert(0) += 1;
        }
        let mut ranked = per_user.into_iter().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let text = match input.mode {
            Mode::React => analysis::react(input.records),
            Mode::Summary => {
                let people = ranked
                    .iter()
                    .map(|(user, count)| format!("{user} ({count})"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "{} recent messages in {} from {}. {}",
                    input.records.len(),
                    input.chat_title,
                    people,
                    analysis::react(input.records)
                )
            }
            Mode::Roast => match ranked.first() {
                Some((user, count)) if *count > 1 => format!(
                    "{user} sent {count} of the last {} messages. Somebody get {user} a hobby.",
                    input.records.len()
                ),
                _ => "Everyone here is so quiet the chat log is mostly timestamps.".to_string(),
            },
        };
        Ok(text)
    }
}

impl Generator for OpenAiGenerator {
    fn label(&self) -> &'static str {
        RemoteProvider::OpenAi.label()
    }

    fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        let prompt = input.prompt()?;
        let payload = serde_json::json!({
            "model": self.model,
            "input": prompt,
            "temperature": TEMPERATURE,
            "max_output_tokens": MAX_OUTPUT_TOKENS
        });
        let response = http_client(self.timeout)?
            .post("https://api.openai.com/v1/responses")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("openai call failed with status {}", response.status());
        }
        let json: Value = response.json()?;
        extract_openai_text(&json).context("openai response missing text content")
    }
}

impl Generator for AnthropicGenerator {
    fn label(&self) -> &'static str {
        RemoteProvider::Anthropic.label()
    }

    fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        let prompt = input.prompt()?;
        let payload = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });
        let response = http_client(self.timeout)?
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("anthropic call failed with status {}", response.status());
        }
        let json: Value = response.json()?;
        extract_anthropic_text(&json).context("anthropic response missing text content")
    }
}

impl Generator for GeminiGenerator {
    fn label(&self) -> &'static str {
        RemoteProvider::Gemini.label()
    }

    fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let prompt = input.prompt()?;
        let payload = serde_json::json!({
            "contents": [
                {"parts": [{"text": prompt}]}
            ],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        });
        let response = http_client(self.timeout)?
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!("gemini call failed with status {}", response.status());
        }
        let json: Value = response.json()?;
        extract_gemini_text(&json).context("gemini response missing text content")
    }
}

impl Generator for OpenAiCompatGenerator {
    fn label(&self) -> &'static str {
        RemoteProvider::OpenAiCompatible.label()
    }

    fn generate(&self, input: &GenerationInput<'_>) -> Result<String> {
        let base = self.base_url.trim_end_matches('/');
        let url = format!("{base}/v1/chat/completions");
        let prompt = input.prompt()?;
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS
        });
        let response = http_client(self.timeout)?
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;
        if !response.status().is_success() {
            anyhow::bail!(
                "openai-compatible call failed with status {}",
                response.status()
            );
        }
        let json: Value = response.json()?;
        extract_openai_compatible_text(&json)
            .context("openai-compatible response missing text content")
    }
}

pub fn clamp_reply(text: &str, max_chars: usize) -> String {
    truncate_with_ellipsis(text.trim(), max_chars)
}

/// Produce the reply for `mode`. `/react` and empty histories never leave
/// the process.
pub fn reply(
    generator: &dyn Generator,
    input: &GenerationInput<'_>,
    max_chars: usize,
) -> Result<GeneratedReply> {
    if input.records.is_empty() {
        return Ok(GeneratedReply {
            provider: "local".to_string(),
            text: EMPTY_HISTORY_REPLY.to_string(),
        });
    }
    if !input.mode.needs_generation() {
        return Ok(GeneratedReply {
            provider: "local".to_string(),
            text: clamp_reply(&analysis::react(input.records), max_chars),
        });
    }

    let raw = generator.generate(input)?;
    let text = clamp_reply(&raw, max_chars);
    if text.is_empty() {
        return Err(ArchivistError::EmptyGeneration {
            provider: generator.label().to_string(),
        }
        .into());
    }
    info!(
        provider = generator.label(),
        mode = input.mode.as_str(),
        chars = text.chars().count(),
        "generated reply"
    );
    Ok(GeneratedReply {
        provider: generator.label().to_string(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archivist::line::Flag;
    use std::collections::HashMap;

    fn record(username: &str, content: &str) -> LogRecord {
        LogRecord {
            flag: Flag::Backfill,
            timestamp: "2024-06-01 12:00:00".to_string(),
            username: username.to_string(),
            content: content.to_string(),
        }
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn configured_provider_without_key_is_flagged() {
        let cfg = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        let none = lookup_from(&[]);
        assert!(resolve_remote_config(&cfg, &none).is_none());
        assert_eq!(unkeyed_configured_provider(&cfg, &none), Some("gemini"));

        let keyed = lookup_from(&[("GEMINI_API_KEY", "gk")]);
        assert_eq!(unkeyed_configured_provider(&cfg, &keyed), None);

        let auto = LlmConfig::default();
        assert_eq!(unkeyed_configured_provider(&auto, &none), None);
    }

    struct FixedGenerator(&'static str);

    impl Generator for FixedGenerator {
        fn label(&self) -> &'static str {
            "fixed"
        }

        fn generate(&self, _input: &GenerationInput<'_>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn no_keys_means_local() {
        let cfg = LlmConfig::default();
        assert!(resolve_remote_config(&cfg, &lookup_from(&[])).is_none());
    }

    #[test]
    fn explicit_local_wins_over_keys() {
        let cfg = LlmConfig {
            provider: "local".to_string(),
            ..LlmConfig::default()
        };
        let lookup = lookup_from(&[("OPENAI_API_KEY", "sk-test")]);
        assert!(resolve_remote_config(&cfg, &lookup).is_none());
    }

    #[test]
    fn auto_picks_provider_from_available_key() {
        let cfg = LlmConfig::default();
        let lookup = lookup_from(&[("ANTHROPIC_API_KEY", "ak")]);
        let remote = resolve_remote_config(&cfg, &lookup).expect("remote");
        assert_eq!(remote.provider, RemoteProvider::Anthropic);
        assert_eq!(remote.model, "claude-3-5-haiku-latest");
        assert_eq!(remote.api_key, "ak");
    }

    #[test]
    fn prefixed_model_selects_provider_and_base_url() {
        let cfg = LlmConfig {
            model: "deepseek:deepseek-chat".to_string(),
            ..LlmConfig::default()
        };
        let lookup = lookup_from(&[("DEEPSEEK_API_KEY", "dk")]);
        let remote = resolve_remote_config(&cfg, &lookup).expect("remote");
        assert_eq!(remote.provider, RemoteProvider::OpenAiCompatible);
        assert_eq!(remote.model, "deepseek-chat");
        assert_eq!(remote.base_url.as_deref(), Some("https://api.deepseek.com"));
    }

    #[test]
    fn configured_provider_without_key_falls_back_to_local() {
        let cfg = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        assert!(resolve_remote_config(&cfg, &lookup_from(&[])).is_none());
    }

    #[test]
    fn response_shapes_are_extracted() {
        let openai = serde_json::json!({"output": [{"content": [{"text": "one"}, {"text": "two"}]}]});
        assert_eq!(extract_openai_text(&openai).as_deref(), Some("one\ntwo"));

        let anthropic = serde_json::json!({"content": [{"type": "text", "text": "hi"}]});
        assert_eq!(extract_anthropic_text(&anthropic).as_deref(), Some("hi"));

        let gemini = serde_json::json!({"candidates": [{"content": {"parts": [{"text": "g"}]}}]});
        assert_eq!(extract_gemini_text(&gemini).as_deref(), Some("g"));

        let compat = serde_json::json!({"choices": [{"message": {"content": "c"}}]});
        assert_eq!(extract_openai_compatible_text(&compat).as_deref(), Some("c"));
    }

    #[test]
    fn reply_is_trimmed_and_clamped() {
        let records = vec![record("alice", "hello")];
        let input = GenerationInput {
            mode: Mode::Summary,
            chat_title: "Book Club",
            records: &records,
        };
        let out = reply(&FixedGenerator("  abcdefghij  "), &input, 5).expect("reply");
        assert_eq!(out.text, "abcd…");
        assert_eq!(out.provider, "fixed");
    }

    #[test]
    fn blank_completion_is_an_error() {
        let records = vec![record("alice", "hello")];
        let input = GenerationInput {
            mode: Mode::Roast,
            chat_title: "Book Club",
            records: &records,
        };
        let err = reply(&FixedGenerator("   "), &input, 100).expect_err("empty");
        assert!(err.to_string().contains("fixed returned an empty completion"));
    }

    #[test]
    fn react_and_empty_history_stay_local() {
        let input = GenerationInput {
            mode: Mode::Summary,
            chat_title: "Book Club",
            records: &[],
        };
        let out = reply(&FixedGenerator("remote"), &input, 100).expect("reply");
        assert_eq!(out.text, EMPTY_HISTORY_REPLY);

        let records = vec![record("alice", "hello"), record("bob", "hi")];
        let input = GenerationInput {
            mode: Mode::React,
            chat_title: "Book Club",
            records: &records,
        };
        let out = reply(&FixedGenerator("remote"), &input, 100).expect("reply");
        assert_eq!(out.provider, "local");
        assert!(out.text.starts_with("I see a conversation between 2 people!"));
    }

    #[test]
    fn local_roast_names_most_active_user() {
        let records = vec![
            record("bob", "a"),
            record("alice", "b"),
            record("bob", "c"),
        ];
        let input = GenerationInput {
            mode: Mode::Roast,
            chat_title: "Book Club",
            records: &records,
        };
        let text = LocalGenerator.generate(&input).expect("local");
        assert!(text.starts_with("bob sent 2 of the last 3 messages."));
    }
}
