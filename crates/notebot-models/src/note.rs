//! Note types for Notebot.
//!
//! A note is created once, at classification time, and never mutated
//! afterwards. The persisted form lives in `notebot-persistence`.

use std::path::PathBuf;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::text::derive_title;

/// Where a note came from, as reported by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Provenance {
    /// Telegram user ID of the author.
    pub user_id: i64,

    /// Telegram username, empty when the user has none.
    pub username: String,

    /// ID of the message the note was taken from.
    pub message_id: i64,
}

impl Provenance {
    /// Creates a new provenance record.
    pub fn new(user_id: i64, username: impl Into<String>, message_id: i64) -> Self {
        Self {
            user_id,
            username: username.into(),
            message_id,
        }
    }
}

/// A single persisted note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Original message body.
    pub text: String,

    /// Title derived from the text.
    pub title: String,

    /// When the note was classified, microsecond precision.
    pub created_at: DateTime<Utc>,

    /// Category slug; also the name of the directory the note lives in.
    pub category: String,

    /// Classification confidence in `[0.0, 1.0]`.
    pub confidence: f64,

    /// Transport identifiers of the author and source message.
    pub provenance: Provenance,
}

impl Note {
    /// Creates a note, deriving its title from `text`.
    ///
    /// `confidence` is clamped into `[0.0, 1.0]`; non-finite values become 0.
    pub fn new(
        text: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
        provenance: Provenance,
        created_at: DateTime<Utc>,
        title_max_chars: usize,
    ) -> Self {
        let text = text.into();
        let title = derive_title(&text, title_max_chars);
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            text,
            title,
            created_at: created_at.trunc_subsecs(6),
            category: category.into(),
            confidence,
            provenance,
        }
    }

    /// Current time at the precision notes are stored with.
    pub fn timestamp_now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    /// Date prefix used in the note's filename (`YYYY-MM-DD`).
    pub fn date_prefix(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }
}

/// Read-side view of a stored note, as returned by listings and searches.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteSummary {
    /// Category directory the note was found in.
    pub category: String,

    /// Title from the note's frontmatter.
    pub title: String,

    /// Creation timestamp from the note's frontmatter.
    pub created_at: DateTime<Utc>,

    /// File name including the `.md` extension.
    pub filename: String,

    /// Full path to the note file.
    pub path: PathBuf,
}

impl NoteSummary {
    /// File name without the `.md` extension.
    pub fn stem(&self) -> &str {
        self.filename.strip_suffix(".md").unwrap_or(&self.filename)
    }
}
