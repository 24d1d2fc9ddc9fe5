//! Error types for the Telegram bot.

use notebot_core::{ClassifierError, ConfigError};
use notebot_persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur in the Telegram bot.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Bot token not provided.
    #[error("Telegram bot token not set. Set TELEGRAM_BOT_TOKEN environment variable.")]
    NoToken,

    /// Failed to start the bot.
    #[error("Failed to start bot: {0}")]
    BotStartFailed(String),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Classifier could not be set up.
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    /// Note storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] PersistenceError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for Telegram operations.
pub type Result<T> = std::result::Result<T, TelegramError>;
