use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchivistError {
    #[error("TELEGRAM_BOT_TOKEN not found; set it in the environment or a .env file")]
    MissingToken,
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("telegram {method} failed: {description}")]
    TelegramApi { method: String, description: String },
    #[error("{provider} returned an empty completion")]
    EmptyGeneration { provider: String },
}
