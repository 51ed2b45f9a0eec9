use std::env;
use std::path::PathBuf;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/env_allowlist.rs"));
}

pub const TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";

fn fallback_dotenv_path(
    archivist_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    match (archivist_home, home_dir) {
        (Some(base), _) => Some(base.join(".env")),
        (None, Some(home)) => Some(home.join("archivist/.env")),
        (None, None) => None,
    }
}

pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let fallback = fallback_dotenv_path(
        env::var_os("ARCHIVIST_HOME").map(PathBuf::from),
        dirs::home_dir(),
    );

    let Some(path) = fallback else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}

pub fn bot_token() -> Option<String> {
    match env::var(TOKEN_VAR) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Every variable the binary reads (overrides, token, provider keys), sorted.
pub fn known_keys() -> &'static [&'static str] {
    generated::GENERATED_ENV_ALLOWLIST
}

/// Known variables that are set in this process.
pub fn present_keys() -> Vec<&'static str> {
    known_keys()
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}
