//! Telegram bot interface for Notebot.
//!
//! Every text message is classified and filed as a markdown note. Notes the
//! classifier is confident about, in a category that already exists, are
//! saved immediately; anything else waits for the user to accept, rename or
//! cancel the suggested category.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use notebot_core::{Config, OllamaClassifier};
//! use notebot_telegram::NoteBot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let classifier = OllamaClassifier::from_config(&config)?;
//!
//!     let bot = NoteBot::new(config, Arc::new(classifier))?;
//!     bot.start_polling().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Commands
//!
//! - `/start`, `/help` - Welcome and usage
//! - `/classes` - List categories
//! - `/stats` - Note counts per category
//! - `/recent [limit]` - Latest notes
//! - `/search <query> [in <category>]` - Search notes
//! - `/cancel` - Discard the note waiting for confirmation
//! - `/cleanup [days]` - Delete old backups (admin only)

pub mod bot;
pub mod error;
pub mod handlers;
pub mod session;
pub mod state;

pub use bot::NoteBot;
pub use error::{Result, TelegramError};
pub use handlers::Command;
pub use session::{PendingSuggestion, UserSession};
pub use state::{create_shared_state, BotState, NoteOutcome, SavedNote, ValidationError};
