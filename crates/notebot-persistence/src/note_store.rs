//! Note store: one markdown file per note, one directory per category.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use notebot_models::{category_slug, slugify, Note, NoteSummary};
use tracing::{debug, info, warn};

use crate::atomic::{atomic_create, atomic_write, ensure_dir, read_to_string};
use crate::error::{PersistenceError, Result};
use crate::frontmatter::{parse_note_file, render_note};

/// Extension of note files, without the dot.
pub const NOTE_EXTENSION: &str = "md";

/// Directory under the notes root that holds backup copies.
pub const BACKUP_DIR: &str = ".backups";

/// Default maximum filename length in bytes, extension included.
const DEFAULT_MAX_FILENAME_LENGTH: usize = 100;

/// Upper bound on `_N` collision suffixes tried before giving up.
const MAX_NAME_ATTEMPTS: usize = 9_999;

/// A note file that was read and parsed successfully.
struct ScannedNote {
    summary: NoteSummary,
    body: String,
}

/// Manages note files under a notes root.
///
/// Layout:
/// ```text
/// root/
/// ├── {category}/
/// │   ├── {YYYY-MM-DD}_{title-slug}.md
/// │   └── {YYYY-MM-DD}_{title-slug}_2.md
/// └── .backups/
///     └── {stem}_{YYYYmmdd_HHMMSS}.md
/// ```
///
/// Read operations never modify the tree. Files that cannot be read or
/// parsed are logged and skipped.
#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
    max_filename_length: usize,
    backup_enabled: bool,
}

impl NoteStore {
    /// Creates a new NoteStore rooted at `root`, without backups.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_filename_length: DEFAULT_MAX_FILENAME_LENGTH,
            backup_enabled: false,
        }
    }

    /// Sets the maximum filename length (bytes, extension included).
    pub fn with_max_filename_length(mut self, max: usize) -> Self {
        self.max_filename_length = max;
        self
    }

    /// Enables or disables backup copies of saved notes.
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    /// Returns the notes root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the notes root if it does not exist.
    pub fn ensure_root(&self) -> Result<()> {
        ensure_dir(&self.root)
    }

    /// Saves a note and returns the path it was written to.
    ///
    /// The file lands in `root/{category}/` as `{date}_{slug(title)}.md`,
    /// with `_2`, `_3`, ... appended when the name is taken. Existing files
    /// are never overwritten.
    pub fn save(&self, note: &Note) -> Result<PathBuf> {
        if category_slug(&note.category).as_deref() != Some(note.category.as_str()) {
            return Err(PersistenceError::InvalidCategory(note.category.clone()));
        }

        let dir = self.root.join(&note.category);
        let content = render_note(note);
        let path = atomic_create(&dir, self.candidate_names(note), content.as_bytes())?;

        info!(
            path = %path.display(),
            category = %note.category,
            user_id = note.provenance.user_id,
            "Note saved"
        );

        if self.backup_enabled {
            self.backup(&path, &content);
        }

        Ok(path)
    }

    /// Loads a note file.
    pub fn load(&self, path: &Path) -> Result<Note> {
        let content = read_to_string(path)?;
        let (fm, body) = parse_note_file(&content)?;
        Ok(fm.into_note(body))
    }

    /// Lists categories, i.e. the non-hidden subdirectories of the root.
    pub fn list_categories(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .category_dirs()?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Counts `.md` files per category. Empty categories map to 0.
    pub fn count_by_category(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for (name, dir) in self.category_dirs()? {
            let count = match note_files(&dir) {
                Ok(files) => files.len(),
                Err(e) => {
                    warn!(error = %e, category = %name, "Skipping unreadable category");
                    continue;
                }
            };
            counts.insert(name, count);
        }
        Ok(counts)
    }

    /// Total number of notes across all categories.
    pub fn total_notes(&self) -> Result<usize> {
        Ok(self.count_by_category()?.values().sum())
    }

    /// Returns the `limit` most recently created notes.
    ///
    /// Ordered by `created_at` descending; ties broken by filename ascending.
    pub fn recent(&self, limit: usize) -> Result<Vec<NoteSummary>> {
        let mut notes: Vec<NoteSummary> = self
            .scan(None)?
            .into_iter()
            .map(|n| n.summary)
            .collect();
        sort_newest_first(&mut notes);
        notes.truncate(limit);
        Ok(notes)
    }

    /// Case-insensitive search over filenames and note bodies.
    pub fn search(&self, query: &str) -> Result<Vec<NoteSummary>> {
        self.search_in(query, None)
    }

    /// Like [`search`](Self::search), optionally restricted to one category.
    ///
    /// Ordered newest first. A blank query matches nothing.
    pub fn search_in(&self, query: &str, category: Option<&str>) -> Result<Vec<NoteSummary>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<NoteSummary> = self
            .scan(category)?
            .into_iter()
            .filter(|n| {
                n.summary.filename.to_lowercase().contains(&needle)
                    || n.body.to_lowercase().contains(&needle)
            })
            .map(|n| n.summary)
            .collect();
        sort_newest_first(&mut matches);

        debug!(query = %query, results = matches.len(), "Search complete");
        Ok(matches)
    }

    /// Deletes backups older than `max_age`. Returns how many were removed.
    pub fn prune_backups(&self, max_age: Duration) -> Result<usize> {
        let dir = self.root.join(BACKUP_DIR);
        if !dir.exists() {
            return Ok(0);
        }

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;

        for path in note_files(&dir)? {
            let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Cannot stat backup");
                    continue;
                }
            };
            if modified < cutoff {
                fs::remove_file(&path)
                    .map_err(|source| PersistenceError::WriteError { path: path.clone(), source })?;
                debug!(path = %path.display(), "Deleted old backup");
                removed += 1;
            }
        }

        info!(removed, "Pruned old backups");
        Ok(removed)
    }

    /// Candidate filenames for a note, in the order they are tried.
    fn candidate_names(&self, note: &Note) -> impl Iterator<Item = String> {
        let stem = format!("{}_{}", note.date_prefix(), slugify(&note.title));
        let max_len = self.max_filename_length;

        (1..=MAX_NAME_ATTEMPTS).map(move |n| {
            let suffix = if n == 1 { String::new() } else { format!("_{}", n) };
            let budget = max_len.saturating_sub(suffix.len() + NOTE_EXTENSION.len() + 1);
            let base = truncate_bytes(&stem, budget).trim_end_matches('_');
            format!("{}{}.{}", base, suffix, NOTE_EXTENSION)
        })
    }

    /// Best-effort copy of a freshly saved note into the backup directory.
    fn backup(&self, path: &Path, content: &str) {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("note");
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let backup_path = self
            .root
            .join(BACKUP_DIR)
            .join(format!("{}_{}.{}", stem, timestamp, NOTE_EXTENSION));

        match atomic_write(&backup_path, content.as_bytes()) {
            Ok(()) => debug!(path = %backup_path.display(), "Backup created"),
            Err(e) => warn!(error = %e, path = %path.display(), "Failed to create backup"),
        }
    }

    /// Category directories as `(name, path)`, sorted by name.
    fn category_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|source| PersistenceError::ReadError {
            path: self.root.clone(),
            source,
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, root = %self.root.display(), "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            dirs.push((name, path));
        }

        dirs.sort();
        Ok(dirs)
    }

    /// Reads and parses every note, optionally within one category.
    fn scan(&self, category: Option<&str>) -> Result<Vec<ScannedNote>> {
        let dirs = match category {
            Some(name) => {
                let Some(slug) = category_slug(name) else {
                    return Ok(Vec::new());
                };
                let dir = self.root.join(&slug);
                if dir.is_dir() {
                    vec![(slug, dir)]
                } else {
                    Vec::new()
                }
            }
            None => self.category_dirs()?,
        };

        let mut notes = Vec::new();
        for (name, dir) in dirs {
            let files = match note_files(&dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!(error = %e, category = %name, "Skipping unreadable category");
                    continue;
                }
            };
            for path in files {
                match read_note(&name, &path) {
                    Ok(note) => notes.push(note),
                    Err(e) => warn!(error = %e, path = %path.display(), "Skipping unreadable note"),
                }
            }
        }
        Ok(notes)
    }
}

/// Paths of `.md` regular files directly inside `dir`.
fn note_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| PersistenceError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == NOTE_EXTENSION))
        .collect())
}

fn read_note(category: &str, path: &Path) -> Result<ScannedNote> {
    let content = read_to_string(path)?;
    let (fm, body) = parse_note_file(&content)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ScannedNote {
        summary: NoteSummary {
            category: category.to_string(),
            title: fm.title,
            created_at: fm.created_at,
            filename,
            path: path.to_path_buf(),
        },
        body,
    })
}

fn sort_newest_first(notes: &mut [NoteSummary]) {
    notes.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.filename.cmp(&b.filename))
    });
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone};
    use notebot_models::Provenance;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_705_314_600 + secs, 0).unwrap()
    }

    fn note(text: &str, category: &str, created: DateTime<Utc>) -> Note {
        Note::new(text, category, 0.9, Provenance::new(1, "alice", 10), created, 50)
    }

    #[test]
    fn test_save_writes_under_category() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());

        let path = store
            .save(&note("I tried a new pasta recipe today", "cooking", at(0)))
            .unwrap();

        assert_eq!(path.parent().unwrap(), dir.path().join("cooking"));
        assert_eq!(
            path.file_name().unwrap(),
            "2024-01-15_i_tried_a_new_pasta_recipe_today.md"
        );
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("classification: \"cooking\"\n"));
        assert!(content.contains("confidence: 0.9\n"));
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());

        let original = note("Ünïcode \"quotes\"\nsecond line\n", "misc", Note::timestamp_now());
        let path = store.save(&original).unwrap();

        assert_eq!(store.load(&path).unwrap(), original);
    }

    #[test]
    fn test_save_roundtrip_control_characters() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());

        let first = note("price\u{7f} list", "misc", at(0));
        let second = note("caf\u{80}e notes\u{2028}", "misc", at(60));
        let first_path = store.save(&first).unwrap();
        let second_path = store.save(&second).unwrap();

        assert_eq!(store.load(&first_path).unwrap(), first);
        assert_eq!(store.load(&second_path).unwrap(), second);
        assert_eq!(store.recent(10).unwrap().len(), 2);
    }

    #[test]
    fn test_save_collision_adds_suffix() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        let n = note("Same title", "work", at(0));

        let first = store.save(&n).unwrap();
        let second = store.save(&n).unwrap();
        let third = store.save(&n).unwrap();

        assert_eq!(first.file_name().unwrap(), "2024-01-15_same_title.md");
        assert_eq!(second.file_name().unwrap(), "2024-01-15_same_title_2.md");
        assert_eq!(third.file_name().unwrap(), "2024-01-15_same_title_3.md");
        assert!(first.exists() && second.exists() && third.exists());
    }

    #[test]
    fn test_save_concurrent_never_overwrites() {
        let dir = tempdir().unwrap();
        let store = Arc::new(NoteStore::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let mut n = note("Race", "race", at(0));
                    n.provenance.message_id = i;
                    store.save(&n).unwrap()
                })
            })
            .collect();

        let paths: BTreeSet<PathBuf> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(paths.len(), 8);

        let ids: BTreeSet<i64> = paths
            .iter()
            .map(|p| store.load(p).unwrap().provenance.message_id)
            .collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_filename_respects_max_length() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path()).with_max_filename_length(30);
        let n = Note::new(
            "a very long title that goes on and on and on",
            "long",
            0.8,
            Provenance::default(),
            at(0),
            200,
        );

        let first = store.save(&n).unwrap();
        let second = store.save(&n).unwrap();

        let first_name = first.file_name().unwrap().to_str().unwrap();
        let second_name = second.file_name().unwrap().to_str().unwrap();
        assert!(first_name.len() <= 30, "{}", first_name);
        assert!(second_name.len() <= 30, "{}", second_name);
        assert!(second_name.ends_with("_2.md"));
        assert_ne!(first_name, second_name);
    }

    #[test]
    fn test_empty_title_uses_placeholder() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());

        let path = store.save(&note("?!?", "misc", at(0))).unwrap();
        assert_eq!(path.file_name().unwrap(), "2024-01-15_note.md");
    }

    #[test]
    fn test_save_rejects_unsafe_category() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());

        for bad in ["../escape", "Upper", "", "a/b"] {
            let result = store.save(&note("text", bad, at(0)));
            assert!(matches!(result, Err(PersistenceError::InvalidCategory(_))), "{bad}");
        }
    }

    #[test]
    fn test_save_fails_when_root_is_a_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        fs::write(&root, "occupied").unwrap();
        let store = NoteStore::new(&root);

        let result = store.save(&note("text", "misc", at(0)));
        assert!(matches!(result, Err(PersistenceError::DirectoryError { .. })));
    }

    #[test]
    fn test_list_categories_ignores_hidden_and_files() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("cooking")).unwrap();
        fs::create_dir(dir.path().join("work")).unwrap();
        fs::create_dir(dir.path().join(".backups")).unwrap();
        fs::write(dir.path().join("stray.md"), "x").unwrap();
        let store = NoteStore::new(dir.path());

        let categories: Vec<String> = store.list_categories().unwrap().into_iter().collect();
        assert_eq!(categories, vec!["cooking".to_string(), "work".to_string()]);
    }

    #[test]
    fn test_missing_root_reads_empty() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path().join("nowhere"));

        assert!(store.list_categories().unwrap().is_empty());
        assert!(store.count_by_category().unwrap().is_empty());
        assert!(store.recent(10).unwrap().is_empty());
        assert!(store.search("x").unwrap().is_empty());
    }

    #[test]
    fn test_count_by_category() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("one", "cooking", at(0))).unwrap();
        store.save(&note("two", "cooking", at(1))).unwrap();
        store.save(&note("three", "work", at(2))).unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("work").join("readme.txt"), "not a note").unwrap();

        let counts = store.count_by_category().unwrap();
        assert_eq!(counts.get("cooking"), Some(&2));
        assert_eq!(counts.get("work"), Some(&1));
        assert_eq!(counts.get("empty"), Some(&0));
        assert_eq!(store.total_notes().unwrap(), 3);
    }

    #[test]
    fn test_recent_orders_and_limits() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("oldest", "a", at(0))).unwrap();
        store.save(&note("newest", "b", at(20))).unwrap();
        store.save(&note("middle", "a", at(10))).unwrap();

        let recent = store.recent(2).unwrap();
        let titles: Vec<&str> = recent.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "middle"]);
        assert_eq!(recent[0].category, "b");
    }

    #[test]
    fn test_recent_ties_broken_by_filename() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("zebra", "a", at(0))).unwrap();
        store.save(&note("apple", "b", at(0))).unwrap();

        let recent = store.recent(10).unwrap();
        let names: Vec<&str> = recent.iter().map(|n| n.filename.as_str()).collect();
        assert_eq!(names, vec!["2024-01-15_apple.md", "2024-01-15_zebra.md"]);
    }

    #[test]
    fn test_search_body_and_filename_case_insensitive() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("Dinner tonight\nwith PASTA and wine", "cooking", at(0))).unwrap();
        store.save(&note("Pasta shopping", "shopping", at(60))).unwrap();
        store.save(&note("Quarterly report", "work", at(120))).unwrap();

        let results = store.search("pasta").unwrap();
        let titles: Vec<&str> = results.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["Pasta shopping", "Dinner tonight"]);
    }

    #[test]
    fn test_search_does_not_match_frontmatter() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("plain text", "cooking", at(0))).unwrap();

        assert!(store.search("classification").unwrap().is_empty());
        assert!(store.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_search_in_category() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("meeting notes", "work", at(0))).unwrap();
        store.save(&note("meeting friends", "social", at(1))).unwrap();

        let results = store.search_in("meeting", Some("work")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].category, "work");
        assert!(store.search_in("meeting", Some("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_note_is_skipped() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        store.save(&note("good pasta", "cooking", at(0))).unwrap();
        fs::write(dir.path().join("cooking").join("broken.md"), "no frontmatter, pasta").unwrap();

        assert_eq!(store.recent(10).unwrap().len(), 1);
        assert_eq!(store.search("pasta").unwrap().len(), 1);
        assert_eq!(store.count_by_category().unwrap().get("cooking"), Some(&2));
    }

    #[test]
    fn test_reads_are_idempotent() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path()).with_backups(true);
        store.save(&note("alpha", "a", at(0))).unwrap();
        store.save(&note("beta", "b", at(1))).unwrap();

        let snapshot = || {
            (
                store.list_categories().unwrap(),
                store.count_by_category().unwrap(),
                store.recent(10).unwrap(),
                store.search("a").unwrap(),
            )
        };
        assert_eq!(snapshot(), snapshot());
    }

    #[test]
    fn test_backup_written_and_hidden() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path()).with_backups(true);
        store.save(&note("backed up", "misc", at(0))).unwrap();

        let backups = note_files(&dir.path().join(BACKUP_DIR)).unwrap();
        assert_eq!(backups.len(), 1);
        assert!(!store.list_categories().unwrap().contains(BACKUP_DIR));
    }

    #[test]
    fn test_prune_backups() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path()).with_backups(true);
        store.save(&note("backed up", "misc", at(0))).unwrap();

        assert_eq!(store.prune_backups(Duration::from_secs(3600)).unwrap(), 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.prune_backups(Duration::ZERO).unwrap(), 1);
        assert_eq!(store.prune_backups(Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_truncate_bytes_char_boundary() {
        assert_eq!(truncate_bytes("héllo", 2), "h");
        assert_eq!(truncate_bytes("héllo", 3), "hé");
        assert_eq!(truncate_bytes("abc", 10), "abc");
    }

    #[test]
    fn test_timestamps_order_across_days() {
        let dir = tempdir().unwrap();
        let store = NoteStore::new(dir.path());
        let base = at(0);
        store.save(&note("yesterday", "a", base - ChronoDuration::days(1))).unwrap();
        store.save(&note("today", "a", base)).unwrap();

        let recent = store.recent(1).unwrap();
        assert_eq!(recent[0].title, "today");
    }
}
