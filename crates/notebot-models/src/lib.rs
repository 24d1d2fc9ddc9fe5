//! Core data models for Notebot.
//!
//! This crate provides the fundamental data types shared by the classifier,
//! the note store and the Telegram front end: notes, their read-side
//! summaries, and classification results. It also owns the slug rules that
//! decide category directory names and note filenames.

pub mod classification;
pub mod note;
pub mod text;

// Re-export main types
pub use classification::{ClassificationResult, ClassificationSource};
pub use note::{Note, NoteSummary, Provenance};
pub use text::{category_slug, derive_title, slugify, truncate_chars, FALLBACK_SLUG};
