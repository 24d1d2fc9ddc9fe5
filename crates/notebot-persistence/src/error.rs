//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to file system.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Category name is not a valid directory slug.
    #[error("invalid category name: {0:?}")]
    InvalidCategory(String),

    /// Every candidate filename was already taken.
    #[error("no free filename for {base} in {dir}")]
    NameExhausted { dir: PathBuf, base: String },

    /// File does not contain a well-formed frontmatter block.
    #[error("malformed frontmatter: {0}")]
    Frontmatter(String),

    /// Frontmatter block is not valid YAML for a note.
    #[error("invalid frontmatter yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
