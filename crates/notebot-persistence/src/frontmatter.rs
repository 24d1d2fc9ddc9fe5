//! Markdown-with-frontmatter codec for note files.
//!
//! ```text
//! ---
//! title: "I tried a new pasta recipe today"
//! created_at: "2024-01-15T10:30:00.123456Z"
//! classification: "cooking"
//! confidence: 0.92
//! user_id: 42
//! username: "alice"
//! telegram_message_id: 1001
//! ---
//!
//! I tried a new pasta recipe today
//! ```
//!
//! String values are written as double-quoted scalars. A JSON string literal
//! is also a valid YAML double-quoted scalar, so `serde_json` does the
//! escaping and `serde_yaml` reads it back. DEL, the C1 controls and the
//! Unicode line separators are written as `\uXXXX` escapes on top of that.

use chrono::{DateTime, SecondsFormat, Utc};
use notebot_models::{Note, Provenance};
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};

const DELIMITER: &str = "---";

/// The metadata block at the top of every note file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteFrontmatter {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub classification: String,
    pub confidence: f64,
    pub user_id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub telegram_message_id: i64,
}

impl NoteFrontmatter {
    /// Builds the frontmatter for a note.
    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            created_at: note.created_at,
            classification: note.category.clone(),
            confidence: note.confidence,
            user_id: note.provenance.user_id,
            username: note.provenance.username.clone(),
            telegram_message_id: note.provenance.message_id,
        }
    }

    /// Reassembles a note from its frontmatter and body text.
    pub fn into_note(self, text: String) -> Note {
        Note {
            text,
            title: self.title,
            created_at: self.created_at,
            category: self.classification,
            confidence: self.confidence,
            provenance: Provenance::new(self.user_id, self.username, self.telegram_message_id),
        }
    }
}

/// Renders a note as a markdown file.
pub fn render_note(note: &Note) -> String {
    let fm = NoteFrontmatter::from_note(note);
    let created_at = fm.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);

    let mut out = String::with_capacity(note.text.len() + 256);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&format!("title: {}\n", quoted(&fm.title)));
    out.push_str(&format!("created_at: {}\n", quoted(&created_at)));
    out.push_str(&format!("classification: {}\n", quoted(&fm.classification)));
    // Debug keeps a decimal point on whole numbers, so YAML reads a float.
    out.push_str(&format!("confidence: {:?}\n", fm.confidence));
    out.push_str(&format!("user_id: {}\n", fm.user_id));
    out.push_str(&format!("username: {}\n", quoted(&fm.username)));
    out.push_str(&format!("telegram_message_id: {}\n", fm.telegram_message_id));
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&note.text);
    out.push('\n');
    out
}

/// Parses a note file into its frontmatter and body text.
pub fn parse_note_file(content: &str) -> Result<(NoteFrontmatter, String)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or_else(|| PersistenceError::Frontmatter("missing opening delimiter".to_string()))?;

    let (yaml, after) = split_at_closing(rest)
        .ok_or_else(|| PersistenceError::Frontmatter("missing closing delimiter".to_string()))?;

    let fm: NoteFrontmatter = serde_yaml::from_str(yaml)?;

    let body = after
        .strip_prefix('\n')
        .or_else(|| after.strip_prefix("\r\n"))
        .unwrap_or(after);
    let body = body.strip_suffix('\n').unwrap_or(body);

    Ok((fm, body.to_string()))
}

fn quoted(value: &str) -> String {
    let json = serde_json::Value::String(value.to_string()).to_string();
    if !json.chars().any(needs_yaml_escape) {
        return json;
    }

    let mut out = String::with_capacity(json.len() + 16);
    for c in json.chars() {
        if needs_yaml_escape(c) {
            out.push_str(&format!("\\u{:04x}", c as u32));
        } else {
            out.push(c);
        }
    }
    out
}

/// Characters JSON leaves raw that YAML either rejects or folds as a line
/// break inside a quoted scalar.
fn needs_yaml_escape(c: char) -> bool {
    matches!(
        c,
        '\u{7f}'..='\u{9f}' | '\u{2028}' | '\u{2029}' | '\u{feff}' | '\u{fffe}' | '\u{ffff}'
    )
}

fn split_at_closing(rest: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}
