//! Shared state for the Telegram bot and the per-turn decision logic.
//!
//! Everything here is transport-free: handlers translate Telegram updates
//! into calls on [`BotState`] and render the returned [`NoteOutcome`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notebot_core::{Classifier, Config};
use notebot_models::{
    category_slug, ClassificationResult, ClassificationSource, Note, NoteSummary, Provenance,
};
use notebot_persistence::NoteStore;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::session::{PendingSuggestion, UserSession};

/// Longest category name accepted from a user reply, in characters.
pub const MAX_CATEGORY_LENGTH: usize = 50;

/// Confidence recorded when the user names the category themselves.
const USER_CHOSEN_CONFIDENCE: f64 = 1.0;

/// Why a note was rejected before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Text is empty or whitespace only.
    Empty,
    /// Text exceeds the configured maximum.
    TooLong { length: usize, max: usize },
}

/// A note that was written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedNote {
    pub path: PathBuf,
    pub category: String,
    pub confidence: f64,
    pub source: ClassificationSource,
    /// Whether the category directory did not exist before this save.
    pub new_category: bool,
}

/// Result of one conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub enum NoteOutcome {
    /// Note saved.
    Saved(SavedNote),
    /// Classification needs the user's confirmation; nothing written yet.
    AwaitingConfirmation {
        suggestion: ClassificationResult,
        low_confidence: bool,
    },
    /// User asked to pick another category; the pending note is kept.
    AwaitingCategory { suggestion: ClassificationResult },
    /// Pending note discarded.
    Cancelled,
    /// There is no live pending note to act on.
    NoPending,
    /// User is not on the allow-list.
    Unauthorized,
    /// Too many messages; retry after the given delay.
    RateLimited { retry_after: Duration },
    /// Text rejected before classification.
    Invalid(ValidationError),
    /// Reply could not be used as a category name; the pending note is kept.
    InvalidCategory(String),
}

/// Shared state for the Telegram bot, accessible across all handlers.
pub struct BotState {
    config: Config,
    store: NoteStore,
    classifier: Arc<dyn Classifier>,
    /// Active user sessions (user_id -> session).
    sessions: RwLock<HashMap<i64, UserSession>>,
}

impl BotState {
    /// Create a new BotState over the configured notes root.
    pub fn new(config: Config, classifier: Arc<dyn Classifier>) -> Self {
        let store = NoteStore::new(&config.notes_dir)
            .with_max_filename_length(config.max_filename_length)
            .with_backups(config.backup_enabled);

        Self {
            config,
            store,
            classifier,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get a reference to the note store.
    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.config.is_user_allowed(user_id)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.config.is_admin(user_id)
    }

    /// Handles an inbound text message.
    ///
    /// A live pending suggestion turns `text` into the user's chosen
    /// category. Otherwise the text is a new note: it is rate limited,
    /// validated, classified and then either saved or held for
    /// confirmation.
    pub async fn process_message(&self, provenance: Provenance, text: &str) -> Result<NoteOutcome> {
        let user_id = provenance.user_id;
        if !self.is_authorized(user_id) {
            warn!(user_id = %user_id, "Rejected message from unauthorized user");
            return Ok(NoteOutcome::Unauthorized);
        }

        let now = Instant::now();
        let pending = {
            let mut sessions = self.sessions.write().await;
            let window = self.config.rate_limit_window;
            sessions.retain(|_, session| !session.is_idle(now, window));

            let session = sessions.entry(user_id).or_default();
            let pending = session.take_pending(now);

            if pending.is_none() {
                if let Err(retry_after) = session.check_rate_limit(
                    now,
                    self.config.rate_limit_messages,
                    self.config.rate_limit_window,
                ) {
                    info!(user_id = %user_id, "Rate limit exceeded");
                    return Ok(NoteOutcome::RateLimited { retry_after });
                }
            }
            pending
        };

        if let Some(pending) = pending {
            return self.resolve_with_category(pending, text).await;
        }

        if let Err(e) = self.validate(text) {
            debug!(user_id = %user_id, error = ?e, "Rejected note");
            return Ok(NoteOutcome::Invalid(e));
        }

        let received_at = Note::timestamp_now();
        let existing = self.store.list_categories()?;
        let result = self.classifier.classify(text, &existing).await;
        debug!(
            user_id = %user_id,
            category = %result.category,
            confidence = result.confidence,
            source = %result.source,
            "Note classified"
        );

        let threshold = self.config.confidence_threshold;
        if result.meets(threshold) && result.is_existing(&existing) {
            let saved = self.save(
                text,
                &result.category,
                result.confidence,
                result.source,
                provenance,
                received_at,
            )?;
            return Ok(NoteOutcome::Saved(saved));
        }

        let low_confidence = !result.meets(threshold);
        let pending = PendingSuggestion::new(
            text.to_string(),
            result.clone(),
            provenance,
            received_at,
            low_confidence,
            Instant::now() + self.config.pending_timeout,
        );
        self.sessions
            .write()
            .await
            .entry(user_id)
            .or_default()
            .set_pending(pending);

        info!(
            user_id = %user_id,
            category = %result.category,
            low_confidence,
            "Awaiting category confirmation"
        );
        Ok(NoteOutcome::AwaitingConfirmation {
            suggestion: result,
            low_confidence,
        })
    }

    /// Saves the pending note under its suggested category.
    pub async fn accept_pending(&self, user_id: i64) -> Result<NoteOutcome> {
        if !self.is_authorized(user_id) {
            return Ok(NoteOutcome::Unauthorized);
        }

        let Some(pending) = self.take_pending(user_id).await else {
            return Ok(NoteOutcome::NoPending);
        };

        let PendingSuggestion {
            text,
            suggestion,
            provenance,
            received_at,
            ..
        } = pending;

        let saved = self.save(
            &text,
            &suggestion.category,
            suggestion.confidence,
            suggestion.source,
            provenance,
            received_at,
        )?;
        Ok(NoteOutcome::Saved(saved))
    }

    /// Keeps the pending note and waits for the user to name a category.
    pub async fn choose_different(&self, user_id: i64) -> Result<NoteOutcome> {
        if !self.is_authorized(user_id) {
            return Ok(NoteOutcome::Unauthorized);
        }

        let mut sessions = self.sessions.write().await;
        let pending = sessions
            .get_mut(&user_id)
            .and_then(|s| s.pending(Instant::now()))
            .map(|p| p.suggestion.clone());

        Ok(match pending {
            Some(suggestion) => NoteOutcome::AwaitingCategory { suggestion },
            None => NoteOutcome::NoPending,
        })
    }

    /// Discards the pending note without saving it.
    pub async fn cancel_pending(&self, user_id: i64) -> Result<NoteOutcome> {
        if !self.is_authorized(user_id) {
            return Ok(NoteOutcome::Unauthorized);
        }

        Ok(match self.take_pending(user_id).await {
            Some(_) => {
                info!(user_id = %user_id, "Pending note cancelled");
                NoteOutcome::Cancelled
            }
            None => NoteOutcome::NoPending,
        })
    }

    /// Whether the user has a live pending note.
    pub async fn has_pending(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions
            .get_mut(&user_id)
            .is_some_and(|s| s.pending(Instant::now()).is_some())
    }

    // --- Read-only queries ---

    pub fn categories(&self) -> Result<BTreeSet<String>> {
        Ok(self.store.list_categories()?)
    }

    pub fn stats(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.store.count_by_category()?)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<NoteSummary>> {
        Ok(self.store.recent(limit)?)
    }

    pub fn search(&self, query: &str, category: Option<&str>) -> Result<Vec<NoteSummary>> {
        Ok(self.store.search_in(query, category)?)
    }

    /// Deletes backups older than `days` days. Returns how many were removed.
    pub fn cleanup_backups(&self, days: u64) -> Result<usize> {
        Ok(self
            .store
            .prune_backups(Duration::from_secs(days.saturating_mul(24 * 60 * 60)))?)
    }

    // --- Internals ---

    fn validate(&self, text: &str) -> std::result::Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        let length = text.chars().count();
        if length > self.config.max_message_length {
            return Err(ValidationError::TooLong {
                length,
                max: self.config.max_message_length,
            });
        }
        Ok(())
    }

    /// Saves a pending note under the category named in `reply`. An unusable
    /// name puts the pending note back.
    async fn resolve_with_category(&self, pending: PendingSuggestion, reply: &str) -> Result<NoteOutcome> {
        let reply = reply.trim();
        let category = category_slug(reply)
            .filter(|_| !reply.contains('\n') && reply.chars().count() <= MAX_CATEGORY_LENGTH);

        let Some(category) = category else {
            let user_id = pending.provenance.user_id;
            self.sessions
                .write()
                .await
                .entry(user_id)
                .or_default()
                .set_pending(pending);
            return Ok(NoteOutcome::InvalidCategory(reply.to_string()));
        };

        let PendingSuggestion {
            text,
            provenance,
            received_at,
            ..
        } = pending;

        let saved = self.save(
            &text,
            &category,
            USER_CHOSEN_CONFIDENCE,
            ClassificationSource::User,
            provenance,
            received_at,
        )?;
        Ok(NoteOutcome::Saved(saved))
    }

    async fn take_pending(&self, user_id: i64) -> Option<PendingSuggestion> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&user_id)?;
        let pending = session.take_pending(now);
        if session.is_idle(now, self.config.rate_limit_window) {
            sessions.remove(&user_id);
        }
        pending
    }

    fn save(
        &self,
        text: &str,
        category: &str,
        confidence: f64,
        source: ClassificationSource,
        provenance: Provenance,
        received_at: DateTime<Utc>,
    ) -> Result<SavedNote> {
        let user_id = provenance.user_id;
        let new_category = !self.store.root().join(category).is_dir();
        let note = Note::new(
            text,
            category,
            confidence,
            provenance,
            received_at,
            self.config.title_max_length,
        );
        let path = self.store.save(&note)?;

        debug!(
            user_id = %user_id,
            source = %source,
            new_category,
            "Note filed"
        );

        Ok(SavedNote {
            path,
            category: category.to_string(),
            confidence: note.confidence,
            source,
            new_category,
        })
    }
}

/// Create a shared BotState wrapped in Arc.
pub fn create_shared_state(config: Config, classifier: Arc<dyn Classifier>) -> Arc<BotState> {
    Arc::new(BotState::new(config, classifier))
}
