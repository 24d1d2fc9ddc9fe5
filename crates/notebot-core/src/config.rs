//! Configuration for Notebot.
//!
//! Settings come from environment variables, usually via a `.env` file
//! loaded by the binary before [`Config::from_env`] runs. Every value is
//! validated up front; a bad value stops startup with an error naming the
//! variable, before any bot traffic is accepted.
//!
//! # Storage Structure
//!
//! ```text
//! ~/.notebot/
//! ├── .env          # Optional environment file
//! └── notes/        # Default notes root (NOTES_DIRECTORY)
//! ```
//!
//! # Environment Variables
//!
//! Required:
//! - `TELEGRAM_BOT_TOKEN`: Bot token from @BotFather
//!
//! Optional (defaults in parentheses):
//! - `NOTEBOT_HOME`: Override the base directory (`~/.notebot`)
//! - `OLLAMA_BASE_URL` (`http://localhost:11434`), `OLLAMA_MODEL` (`llama3.1`),
//!   `OLLAMA_TIMEOUT` seconds (`30`)
//! - `NOTES_DIRECTORY` (`~/.notebot/notes`), `BACKUP_ENABLED` (`true`),
//!   `MAX_FILENAME_LENGTH` (`100`), `TITLE_MAX_LENGTH` (`50`)
//! - `DEFAULT_CONFIDENCE_THRESHOLD` (`0.7`), `FALLBACK_CONFIDENCE` (`0.5`),
//!   `DEFAULT_CATEGORY` (`uncategorized`)
//! - `MAX_MESSAGE_LENGTH` (`4000`), `RATE_LIMIT_MESSAGES_PER_MINUTE` (`10`),
//!   `RATE_LIMIT_WINDOW_SECS` (`60`), `PENDING_TIMEOUT_SECS` (`300`)
//! - `ALLOWED_USERS`: comma-separated user IDs; unset means everyone
//! - `ADMIN_USER_ID`: user allowed to run admin commands

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use notebot_models::category_slug;
use thiserror::Error;
use url::Url;

/// Environment variable for a custom base directory.
pub const HOME_DIR_ENV: &str = "NOTEBOT_HOME";

pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const OLLAMA_MODEL: &str = "OLLAMA_MODEL";
pub const OLLAMA_TIMEOUT: &str = "OLLAMA_TIMEOUT";
pub const NOTES_DIRECTORY: &str = "NOTES_DIRECTORY";
pub const BACKUP_ENABLED: &str = "BACKUP_ENABLED";
pub const MAX_FILENAME_LENGTH: &str = "MAX_FILENAME_LENGTH";
pub const TITLE_MAX_LENGTH: &str = "TITLE_MAX_LENGTH";
pub const DEFAULT_CONFIDENCE_THRESHOLD: &str = "DEFAULT_CONFIDENCE_THRESHOLD";
pub const FALLBACK_CONFIDENCE: &str = "FALLBACK_CONFIDENCE";
pub const DEFAULT_CATEGORY: &str = "DEFAULT_CATEGORY";
pub const MAX_MESSAGE_LENGTH: &str = "MAX_MESSAGE_LENGTH";
pub const RATE_LIMIT_MESSAGES_PER_MINUTE: &str = "RATE_LIMIT_MESSAGES_PER_MINUTE";
pub const RATE_LIMIT_WINDOW_SECS: &str = "RATE_LIMIT_WINDOW_SECS";
pub const PENDING_TIMEOUT_SECS: &str = "PENDING_TIMEOUT_SECS";
pub const ALLOWED_USERS: &str = "ALLOWED_USERS";
pub const ADMIN_USER_ID: &str = "ADMIN_USER_ID";

/// Default base directory name under home.
const DEFAULT_HOME_DIR: &str = ".notebot";
const NOTES_SUBDIR: &str = "notes";

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Smallest filename budget that still fits `YYYY-MM-DD_x_NNNN.md`.
pub const MIN_FILENAME_LENGTH: usize = 24;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    /// A variable is set but its value is unusable.
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    /// The notes root could not be created.
    #[error("cannot create notes directory {path}: {source}")]
    NotesDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

/// Get the Notebot base directory.
///
/// 1. `NOTEBOT_HOME` environment variable if set
/// 2. `~/.notebot` if home directory is available
/// 3. `.notebot` in current directory as fallback
pub fn home_dir() -> PathBuf {
    std::env::var(HOME_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(DEFAULT_HOME_DIR))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME_DIR))
        })
}

/// Get the path of the `.env` file inside the base directory.
pub fn env_file() -> PathBuf {
    home_dir().join(".env")
}

/// Get the default notes root.
pub fn default_notes_dir() -> PathBuf {
    home_dir().join(NOTES_SUBDIR)
}

/// Validated runtime settings.
#[derive(Clone)]
pub struct Config {
    /// Telegram bot token.
    pub telegram_bot_token: String,
    /// Base URL of the Ollama server, without a trailing slash.
    pub ollama_base_url: String,
    /// Model used for classification.
    pub ollama_model: String,
    /// Hard timeout for one classification request.
    pub ollama_timeout: Duration,
    /// Root directory of the note tree.
    pub notes_dir: PathBuf,
    /// Whether saved notes are also copied to the backup directory.
    pub backup_enabled: bool,
    /// Maximum note filename length in bytes, extension included.
    pub max_filename_length: usize,
    /// Maximum title length in characters.
    pub title_max_length: usize,
    /// Confidence at or above which a known category is accepted silently.
    pub confidence_threshold: f64,
    /// Confidence reported for keyword-rule matches.
    pub fallback_confidence: f64,
    /// Category used when nothing else applies.
    pub default_category: String,
    /// Maximum note length in characters.
    pub max_message_length: usize,
    /// Messages allowed per user within `rate_limit_window`.
    pub rate_limit_messages: u32,
    /// Sliding window for rate limiting.
    pub rate_limit_window: Duration,
    /// How long a category suggestion waits for the user.
    pub pending_timeout: Duration,
    /// Users allowed to talk to the bot; `None` allows everyone.
    pub allowed_users: Option<HashSet<i64>>,
    /// User allowed to run admin commands.
    pub admin_user_id: Option<i64>,
}

impl Default for Config {
    /// Default settings with no bot token. Useful as a base in tests; real
    /// startup goes through [`Config::from_env`].
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            ollama_base_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            ollama_timeout: Duration::from_secs(30),
            notes_dir: default_notes_dir(),
            backup_enabled: true,
            max_filename_length: 100,
            title_max_length: 50,
            confidence_threshold: 0.7,
            fallback_confidence: 0.5,
            default_category: "uncategorized".to_string(),
            max_message_length: 4000,
            rate_limit_messages: 10,
            rate_limit_window: Duration::from_secs(60),
            pending_timeout: Duration::from_secs(300),
            allowed_users: None,
            admin_user_id: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_bot_token", &"<redacted>")
            .field("ollama_base_url", &self.ollama_base_url)
            .field("ollama_model", &self.ollama_model)
            .field("ollama_timeout", &self.ollama_timeout)
            .field("notes_dir", &self.notes_dir)
            .field("backup_enabled", &self.backup_enabled)
            .field("max_filename_length", &self.max_filename_length)
            .field("title_max_length", &self.title_max_length)
            .field("confidence_threshold", &self.confidence_threshold)
            .field("fallback_confidence", &self.fallback_confidence)
            .field("default_category", &self.default_category)
            .field("max_message_length", &self.max_message_length)
            .field("rate_limit_messages", &self.rate_limit_messages)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("pending_timeout", &self.pending_timeout)
            .field("allowed_users", &self.allowed_users)
            .field("admin_user_id", &self.admin_user_id)
            .finish()
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to
    /// its value. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let telegram_bot_token =
            get(TELEGRAM_BOT_TOKEN).ok_or(ConfigError::Missing(TELEGRAM_BOT_TOKEN))?;

        let ollama_base_url = match get(OLLAMA_BASE_URL) {
            Some(raw) => parse_http_url(OLLAMA_BASE_URL, &raw)?,
            None => defaults.ollama_base_url,
        };

        let ollama_model = get(OLLAMA_MODEL).unwrap_or(defaults.ollama_model);

        let ollama_timeout = match get(OLLAMA_TIMEOUT) {
            Some(raw) => Duration::from_secs(positive(OLLAMA_TIMEOUT, parse(OLLAMA_TIMEOUT, &raw)?)?),
            None => defaults.ollama_timeout,
        };

        let notes_dir = get(NOTES_DIRECTORY)
            .map(|raw| PathBuf::from(shellexpand::tilde(&raw).into_owned()))
            .unwrap_or(defaults.notes_dir);

        let backup_enabled = match get(BACKUP_ENABLED) {
            Some(raw) => parse_bool(BACKUP_ENABLED, &raw)?,
            None => defaults.backup_enabled,
        };

        let max_filename_length = match get(MAX_FILENAME_LENGTH) {
            Some(raw) => {
                let value: usize = parse(MAX_FILENAME_LENGTH, &raw)?;
                if value < MIN_FILENAME_LENGTH {
                    return Err(ConfigError::invalid(
                        MAX_FILENAME_LENGTH,
                        format!("must be at least {}", MIN_FILENAME_LENGTH),
                    ));
                }
                value
            }
            None => defaults.max_filename_length,
        };

        let title_max_length = match get(TITLE_MAX_LENGTH) {
            Some(raw) => positive(TITLE_MAX_LENGTH, parse(TITLE_MAX_LENGTH, &raw)?)?,
            None => defaults.title_max_length,
        };

        let confidence_threshold = match get(DEFAULT_CONFIDENCE_THRESHOLD) {
            Some(raw) => unit_interval(DEFAULT_CONFIDENCE_THRESHOLD, &raw)?,
            None => defaults.confidence_threshold,
        };

        let fallback_confidence = match get(FALLBACK_CONFIDENCE) {
            Some(raw) => unit_interval(FALLBACK_CONFIDENCE, &raw)?,
            None => defaults.fallback_confidence,
        };

        let default_category = match get(DEFAULT_CATEGORY) {
            Some(raw) => {
                if category_slug(&raw).as_deref() != Some(raw.as_str()) {
                    return Err(ConfigError::invalid(
                        DEFAULT_CATEGORY,
                        "use lowercase letters, digits, '-' or '_'",
                    ));
                }
                raw
            }
            None => defaults.default_category,
        };

        let max_message_length = match get(MAX_MESSAGE_LENGTH) {
            Some(raw) => positive(MAX_MESSAGE_LENGTH, parse(MAX_MESSAGE_LENGTH, &raw)?)?,
            None => defaults.max_message_length,
        };

        let rate_limit_messages = match get(RATE_LIMIT_MESSAGES_PER_MINUTE) {
            Some(raw) => positive(
                RATE_LIMIT_MESSAGES_PER_MINUTE,
                parse(RATE_LIMIT_MESSAGES_PER_MINUTE, &raw)?,
            )?,
            None => defaults.rate_limit_messages,
        };

        let rate_limit_window = match get(RATE_LIMIT_WINDOW_SECS) {
            Some(raw) => Duration::from_secs(positive(
                RATE_LIMIT_WINDOW_SECS,
                parse(RATE_LIMIT_WINDOW_SECS, &raw)?,
            )?),
            None => defaults.rate_limit_window,
        };

        let pending_timeout = match get(PENDING_TIMEOUT_SECS) {
            Some(raw) => Duration::from_secs(positive(
                PENDING_TIMEOUT_SECS,
                parse(PENDING_TIMEOUT_SECS, &raw)?,
            )?),
            None => defaults.pending_timeout,
        };

        let allowed_users = get(ALLOWED_USERS)
            .map(|raw| parse_user_list(&raw))
            .transpose()?;

        let admin_user_id = get(ADMIN_USER_ID)
            .map(|raw| parse(ADMIN_USER_ID, &raw))
            .transpose()?;

        Ok(Self {
            telegram_bot_token,
            ollama_base_url,
            ollama_model,
            ollama_timeout,
            notes_dir,
            backup_enabled,
            max_filename_length,
            title_max_length,
            confidence_threshold,
            fallback_confidence,
            default_category,
            max_message_length,
            rate_limit_messages,
            rate_limit_window,
            pending_timeout,
            allowed_users,
            admin_user_id,
        })
    }

    /// Replaces the notes root, expanding a leading `~`.
    pub fn with_notes_dir(mut self, path: &Path) -> Self {
        let raw = path.to_string_lossy();
        self.notes_dir = PathBuf::from(shellexpand::tilde(&raw).into_owned());
        self
    }

    /// Creates the notes root if needed.
    pub fn ensure_notes_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.notes_dir).map_err(|source| ConfigError::NotesDir {
            path: self.notes_dir.clone(),
            source,
        })
    }

    /// Whether `user_id` may use the bot.
    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.allowed_users
            .as_ref()
            .map_or(true, |users| users.contains(&user_id))
    }

    /// Whether `user_id` is the configured admin.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_id == Some(user_id)
    }
}

/// Joins a base URL and an endpoint path with exactly one `/`.
pub fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    if endpoint.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, endpoint)
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid(var, format!("{:?}: {}", raw, e)))
}

fn positive<T>(var: &'static str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(var, "must be a positive integer"))
    }
}

fn unit_interval(var: &'static str, raw: &str) -> Result<f64, ConfigError> {
    let value: f64 = parse(var, raw)?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::invalid(var, "must be between 0.0 and 1.0"))
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(var, format!("{:?} is not a boolean", raw))),
    }
}

fn parse_http_url(var: &'static str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(var, format!("{:?}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(ConfigError::invalid(
            var,
            format!("unsupported scheme {:?}", other),
        )),
    }
}

fn parse_user_list(raw: &str) -> Result<HashSet<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse(ALLOWED_USERS, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| env.get(var).cloned())
    }

    #[test]
    fn test_requires_token() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing(TELEGRAM_BOT_TOKEN))));
        assert!(matches!(
            load(&[(TELEGRAM_BOT_TOKEN, "   ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = load(&[(TELEGRAM_BOT_TOKEN, "123:abc")]).unwrap();

        assert_eq!(config.telegram_bot_token, "123:abc");
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.ollama_model, "llama3.1");
        assert_eq!(config.ollama_timeout, Duration::from_secs(30));
        assert_eq!(config.max_filename_length, 100);
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.default_category, "uncategorized");
        assert_eq!(config.rate_limit_messages, 10);
        assert!(config.backup_enabled);
        assert!(config.allowed_users.is_none());
        assert!(config.is_user_allowed(1));
        assert!(!config.is_admin(1));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (TELEGRAM_BOT_TOKEN, "t"),
            (OLLAMA_BASE_URL, "http://ollama:11434/"),
            (OLLAMA_TIMEOUT, "5"),
            (NOTES_DIRECTORY, "/srv/notes"),
            (BACKUP_ENABLED, "no"),
            (DEFAULT_CONFIDENCE_THRESHOLD, "0.85"),
            (ALLOWED_USERS, "1, 2,3"),
            (ADMIN_USER_ID, "2"),
            (PENDING_TIMEOUT_SECS, "60"),
        ])
        .unwrap();

        assert_eq!(config.ollama_timeout, Duration::from_secs(5));
        assert_eq!(config.notes_dir, PathBuf::from("/srv/notes"));
        assert!(!config.backup_enabled);
        assert_eq!(config.confidence_threshold, 0.85);
        assert!(config.is_user_allowed(3));
        assert!(!config.is_user_allowed(4));
        assert!(config.is_admin(2));
        assert_eq!(config.pending_timeout, Duration::from_secs(60));
        assert_eq!(config.ollama_base_url, "http://ollama:11434");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases = [
            (OLLAMA_TIMEOUT, "0"),
            (OLLAMA_TIMEOUT, "soon"),
            (OLLAMA_BASE_URL, "not a url"),
            (OLLAMA_BASE_URL, "ftp://host"),
            (MAX_FILENAME_LENGTH, "10"),
            (DEFAULT_CONFIDENCE_THRESHOLD, "1.5"),
            (FALLBACK_CONFIDENCE, "-0.1"),
            (DEFAULT_CATEGORY, "Not Valid"),
            (RATE_LIMIT_MESSAGES_PER_MINUTE, "0"),
            (ALLOWED_USERS, "1,abc"),
            (ADMIN_USER_ID, "admin"),
            (BACKUP_ENABLED, "maybe"),
        ];

        for (var, value) in cases {
            let result = load(&[(TELEGRAM_BOT_TOKEN, "t"), (var, value)]);
            match result {
                Err(ConfigError::Invalid { var: v, .. }) => assert_eq!(v, var),
                other => panic!("{}={} should be invalid, got {:?}", var, value, other),
            }
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = load(&[(TELEGRAM_BOT_TOKEN, "super-secret")]).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_ensure_notes_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default().with_notes_dir(&dir.path().join("a/b"));
        config.ensure_notes_dir().unwrap();
        assert!(config.notes_dir.is_dir());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/api/tags"), "http://h:1/api/tags");
        assert_eq!(join_url("http://h:1", "api/tags"), "http://h:1/api/tags");
        assert_eq!(join_url("http://h:1/", ""), "http://h:1");
    }
}
