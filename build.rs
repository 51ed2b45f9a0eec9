use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Variable families the binary reads: its own overrides, the bot token and
/// the generation provider credentials.
const KEY_PREFIXES: &[&str] = &["ARCHIVIST_", "TELEGRAM_"];
const KEY_SUFFIXES: &[&str] = &["_API_KEY", "_BASE_URL"];

fn collect_rs_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_rs_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_env_key(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
        && (KEY_PREFIXES
            .iter()
            .any(|p| candidate.len() > p.len() && candidate.starts_with(p))
            || KEY_SUFFIXES.iter().any(|s| candidate.ends_with(s)))
}

/// Quoted literals like `"ARCHIVIST_HISTORY_CAP"` or `"OPENAI_API_KEY"`.
fn collect_env_literals(source: &str, out: &mut BTreeSet<String>) {
    let mut rest = source;
    while let Some(open) = rest.find('"') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('"') else {
            break;
        };
        let literal = &after[..close];
        if is_env_key(literal) {
            out.insert(literal.to_string());
        }
        rest = &after[close + 1..];
    }
}

fn write_generated_allowlist() -> std::io::Result<()> {
    let mut rs_files = Vec::new();
    collect_rs_files(Path::new("src"), &mut rs_files)?;

    let mut keys = BTreeSet::new();
    for file in rs_files {
        // Test modules name throwaway keys; only scan shipped code.
        if let Ok(content) = fs::read_to_string(&file) {
            let shipped = content.split("#[cfg(test)]").next().unwrap_or_default();
            collect_env_literals(shipped, &mut keys);
        }
    }

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let mut f = fs::File::create(Path::new(&out_dir).join("env_allowlist.rs"))?;
    writeln!(f, "pub const GENERATED_ENV_ALLOWLIST: &[&str] = &[")?;
    for key in keys {
        writeln!(f, "    \"{key}\",")?;
    }
    writeln!(f, "];")?;
    Ok(())
}

fn main() {
    write_generated_allowlist().expect("failed to generate env allowlist");

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock before unix epoch");
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
