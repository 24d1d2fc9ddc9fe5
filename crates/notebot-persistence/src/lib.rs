//! Persistence layer for Notebot.
//!
//! Notes are stored as markdown files with YAML frontmatter, one directory
//! per category, directly under a notes root. There is no index file: the
//! set of categories is the set of subdirectories, and every listing is
//! recomputed from disk. All writes go through a temp file followed by an
//! atomic rename, so a note is either fully visible under its final name or
//! not visible at all.
//!
//! ```text
//! notes/
//! ├── cooking/
//! │   ├── 2024-01-15_pasta_recipe.md
//! │   └── 2024-01-15_pasta_recipe_2.md
//! ├── work/
//! │   └── 2024-01-16_project_meeting.md
//! └── .backups/
//! ```
//!
//! # Example
//!
//! ```no_run
//! use notebot_models::{Note, Provenance};
//! use notebot_persistence::NoteStore;
//!
//! let store = NoteStore::new("/home/user/notes");
//!
//! let note = Note::new(
//!     "I tried a new pasta recipe today",
//!     "cooking",
//!     0.92,
//!     Provenance::new(42, "alice", 1001),
//!     Note::timestamp_now(),
//!     50,
//! );
//! let path = store.save(&note).unwrap();
//!
//! let categories = store.list_categories().unwrap();
//! assert!(categories.contains("cooking"));
//! # let _ = path;
//! ```

pub mod atomic;
pub mod error;
pub mod frontmatter;
pub mod note_store;

pub use error::{PersistenceError, Result};
pub use frontmatter::{parse_note_file, render_note, NoteFrontmatter};
pub use note_store::{NoteStore, BACKUP_DIR, NOTE_EXTENSION};
