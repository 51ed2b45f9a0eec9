use crate::error::ArchivistError;
use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const MAX_TELEGRAM_PAGE: usize = 100;
pub const MAX_TELEGRAM_MESSAGE_CHARS: usize = 4096;
pub const LLM_PROVIDERS: [&str; 6] = [
    "auto",
    "local",
    "openai",
    "anthropic",
    "gemini",
    "openai-compatible",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackfillConfig {
    pub page_size: usize,
    pub history_cap: usize,
    pub max_fetch_pages: usize,
    pub on_startup: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: MAX_TELEGRAM_PAGE,
            history_cap: 1000,
            max_fetch_pages: 20,
            on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub record_media: bool,
    pub extract_links: bool,
    pub timezone: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            record_media: false,
            extract_links: true,
            timezone: "UTC".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid capture timezone `{}`: {err}", self.timezone))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub recent_lines: usize,
    pub react_lines: usize,
    pub max_reply_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            recent_lines: 50,
            react_lines: 5,
            max_reply_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: String::new(),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ArchivistConfig {
    pub backfill: BackfillConfig,
    pub capture: CaptureConfig,
    pub telegram: TelegramConfig,
    pub analysis: AnalysisConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialArchivistConfig {
    backfill: Option<BackfillConfig>,
    capture: Option<CaptureConfig>,
    telegram: Option<TelegramConfig>,
    analysis: Option<AnalysisConfig>,
    llm: Option<LlmConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &ArchivistConfig) -> Result<()> {
    let invalid = |msg: &str| anyhow!(ArchivistError::InvalidConfig(msg.to_string()));

    if cfg.backfill.page_size == 0 || cfg.backfill.page_size > MAX_TELEGRAM_PAGE {
        return Err(invalid("backfill page size must be between 1 and 100"));
    }
    if cfg.backfill.history_cap == 0 {
        return Err(invalid("backfill history cap must be >= 1"));
    }
    if cfg.backfill.max_fetch_pages == 0 {
        return Err(invalid("backfill max fetch pages must be >= 1"));
    }
    if cfg.capture.tz().is_err() {
        return Err(invalid(&format!(
            "unknown capture timezone `{}`",
            cfg.capture.timezone
        )));
    }
    if cfg.telegram.api_base.trim().is_empty() {
        return Err(invalid("telegram api base cannot be empty"));
    }
    if cfg.telegram.poll_timeout_secs > 50 {
        return Err(invalid("telegram poll timeout must be <= 50 seconds"));
    }
    if cfg.analysis.recent_lines == 0 || cfg.analysis.react_lines == 0 {
        return Err(invalid("analysis line counts must be >= 1"));
    }
    if cfg.analysis.max_reply_chars == 0
        || cfg.analysis.max_reply_chars > MAX_TELEGRAM_MESSAGE_CHARS
    {
        return Err(invalid("analysis max reply chars must be between 1 and 4096"));
    }
    if !LLM_PROVIDERS.contains(&cfg.llm.provider.as_str()) {
        return Err(invalid(&format!(
            "unknown llm provider `{}`; use one of {}",
            cfg.llm.provider,
            LLM_PROVIDERS.join(", ")
        )));
    }
    if cfg.llm.timeout_secs == 0 {
        return Err(invalid("llm timeout must be >= 1 second"));
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("ARCHIVIST_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    crate::archivist::paths::resolve_home()
        .ok()
        .map(|home| home.join("archivist.toml"))
}

fn merge_toml(base: &mut ArchivistConfig, raw: &str) -> Result<()> {
    let parsed: PartialArchivistConfig = toml::from_str(raw)?;
    if let Some(backfill) = parsed.backfill {
        base.backfill = backfill;
    }
    if let Some(capture) = parsed.capture {
        base.capture = capture;
    }
    if let Some(telegram) = parsed.telegram {
        base.telegram = telegram;
    }
    if let Some(analysis) = parsed.analysis {
        base.analysis = analysis;
    }
    if let Some(llm) = parsed.llm {
        base.llm = llm;
    }
    Ok(())
}

fn merge_file_config(base: &mut ArchivistConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| anyhow!("failed to parse archivist config {}: {err}", path.display()))
}

fn apply_env_overrides(cfg: &mut ArchivistConfig) {
    cfg.backfill.page_size = env_or_usize("ARCHIVIST_BACKFILL_PAGE_SIZE", cfg.backfill.page_size);
    cfg.backfill.history_cap = env_or_usize("ARCHIVIST_HISTORY_CAP", cfg.backfill.history_cap);
    cfg.backfill.max_fetch_pages =
        env_or_usize("ARCHIVIST_MAX_FETCH_PAGES", cfg.backfill.max_fetch_pages);
    cfg.backfill.on_startup = env_or_bool("ARCHIVIST_BACKFILL_ON_STARTUP", cfg.backfill.on_startup);
    cfg.capture.record_media = env_or_bool("ARCHIVIST_RECORD_MEDIA", cfg.capture.record_media);
    cfg.capture.extract_links = env_or_bool("ARCHIVIST_EXTRACT_LINKS", cfg.capture.extract_links);
    cfg.capture.timezone = env_or_string("ARCHIVIST_TIMEZONE", &cfg.capture.timezone);
    cfg.telegram.api_base = env_or_string("ARCHIVIST_TELEGRAM_API_BASE", &cfg.telegram.api_base);
    cfg.telegram.poll_timeout_secs =
        env_or_u64("ARCHIVIST_POLL_TIMEOUT_SECS", cfg.telegram.poll_timeout_secs);
    cfg.analysis.recent_lines = env_or_usize("ARCHIVIST_RECENT_LINES", cfg.analysis.recent_lines);
    cfg.analysis.react_lines = env_or_usize("ARCHIVIST_REACT_LINES", cfg.analysis.react_lines);
    cfg.analysis.max_reply_chars =
        env_or_usize("ARCHIVIST_MAX_REPLY_CHARS", cfg.analysis.max_reply_chars);
    cfg.llm.provider = env_or_string("ARCHIVIST_LLM_PROVIDER", &cfg.llm.provider)
        .to_ascii_lowercase();
    cfg.llm.model = env_or_string("ARCHIVIST_LLM_MODEL", &cfg.llm.model);
    cfg.llm.timeout_secs = env_or_u64("ARCHIVIST_LLM_TIMEOUT_SECS", cfg.llm.timeout_secs);
}

pub fn load_config() -> Result<ArchivistConfig> {
    let mut cfg = ArchivistConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
