//! Slug and title helpers.
//!
//! Category names double as directory names and note titles feed into
//! filenames, so both go through a normalization that only ever produces
//! filesystem-safe characters.

/// Slug used when normalization leaves nothing behind.
pub const FALLBACK_SLUG: &str = "note";

/// Suffix appended to truncated titles and previews.
const ELLIPSIS: &str = "...";

/// Normalizes arbitrary text into a filename slug.
///
/// Lowercases the input, collapses every run of non-alphanumeric characters
/// into a single `_` and strips separators from both ends. Returns
/// [`FALLBACK_SLUG`] when nothing alphanumeric remains.
pub fn slugify(input: &str) -> String {
    let slug = collapse(input, char::is_alphanumeric);
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Normalizes a category name into a directory-safe slug.
///
/// Same rule as [`slugify`] except that `-` and `_` survive. Returns `None`
/// when the input has no usable characters, so callers can decide whether to
/// reject the name or fall back to a default category.
pub fn category_slug(input: &str) -> Option<String> {
    let slug = collapse(input, |c| c.is_alphanumeric() || c == '-' || c == '_');
    let slug = slug.trim_matches(|c| c == '_' || c == '-');
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Derives a note title from its text.
///
/// Uses the first non-blank line with inner whitespace collapsed, truncated
/// to `max_chars` characters (plus `...` when cut).
pub fn derive_title(text: &str, max_chars: usize) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// Truncates `text` to at most `max_chars` characters, appending `...` when
/// anything was dropped. Never splits a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{}{}", kept.trim_end(), ELLIPSIS)
}

fn collapse(input: &str, keep: impl Fn(char) -> bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if keep(c) {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_collapses_runs() {
        assert_eq!(slugify("Meeting notes: 2024/01/15"), "meeting_notes_2024_01_15");
        assert_eq!(slugify("  --Hello,   World!!  "), "hello_world");
        assert_eq!(slugify("snake_case_stays"), "snake_case_stays");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), FALLBACK_SLUG);
        assert_eq!(slugify("!!! ???"), FALLBACK_SLUG);
    }

    #[test]
    fn test_slugify_keeps_unicode_letters() {
        assert_eq!(slugify("Привет мир"), "привет_мир");
    }

    #[test]
    fn test_category_slug() {
        assert_eq!(category_slug("Work & Projects!"), Some("work_projects".to_string()));
        assert_eq!(category_slug("to-do"), Some("to-do".to_string()));
        assert_eq!(category_slug("  Cooking  "), Some("cooking".to_string()));
        assert_eq!(category_slug("__x__"), Some("x".to_string()));
        assert_eq!(category_slug("../etc"), Some("etc".to_string()));
        assert_eq!(category_slug("?!"), None);
        assert_eq!(category_slug(""), None);
    }

    #[test]
    fn test_derive_title_uses_first_line() {
        let text = "\n\n  Shopping   list \nmilk\neggs";
        assert_eq!(derive_title(text, 50), "Shopping list");
    }

    #[test]
    fn test_derive_title_truncates() {
        let title = derive_title("I tried a new pasta recipe today", 10);
        assert_eq!(title, "I tried a...");
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("ééééé", 3), "ééé...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
