use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::archivist::analysis::Mode;
use crate::archivist::paths::resolve_paths;
use crate::commands::{self, CommandReport};
use crate::env_loader;
use crate::logging;

#[derive(Parser)]
#[command(name = "archivist")]
#[command(version)]
#[command(about = "Archive Telegram group chats into append-only text logs")]
pub struct Cli {
    /// Print the command report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot: catch-up backfill, then long-poll for new messages
    Run {
        /// Stop after a single poll cycle
        #[arg(long)]
        once: bool,
    },

    /// Archive chat events from a JSONL file
    Ingest {
        /// One JSON chat event per line
        #[arg(short, long)]
        file: PathBuf,
        /// Treat the file as newest-first history
        #[arg(long)]
        backfill: bool,
    },

    /// Show the last lines of a chat log
    Tail {
        /// Chat title as it appears in Telegram
        #[arg(short, long)]
        chat: String,
        #[arg(short = 'n', long, default_value_t = 20)]
        lines: usize,
    },

    /// Summarize, roast or react to recent chat history
    Summarize {
        #[arg(short, long)]
        chat: String,
        /// summary, roast or react
        #[arg(short, long, default_value = "summary")]
        mode: Mode,
        #[arg(short = 'n', long)]
        lines: Option<usize>,
    },

    /// Show paths, effective configuration and provider selection
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        eprintln!("issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let is_bot = matches!(cli.command, Commands::Run { .. });
    let level = match (cli.verbose, is_bot) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    let file_paths = if is_bot && env_loader::bot_token().is_some() {
        resolve_paths().ok()
    } else {
        None
    };
    let _log_guard = logging::init(file_paths.as_ref(), level);

    let report = match cli.command {
        Commands::Run { once } => commands::run::run(&commands::run::RunOptions { once })?,
        Commands::Ingest { file, backfill } => {
            commands::ingest::run(&commands::ingest::IngestOptions { file, backfill })?
        }
        Commands::Tail { chat, lines } => {
            commands::tail::run(&commands::tail::TailOptions { chat, lines })?
        }
        Commands::Summarize { chat, mode, lines } => {
            commands::summarize::run(&commands::summarize::SummarizeOptions { chat, mode, lines })?
        }
        Commands::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
