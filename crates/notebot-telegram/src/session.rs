//! Per-user conversation state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use notebot_models::{ClassificationResult, Provenance};

/// A note waiting for the user to confirm its category.
#[derive(Debug, Clone)]
pub struct PendingSuggestion {
    /// The note text, exactly as received.
    pub text: String,
    /// What the classifier proposed.
    pub suggestion: ClassificationResult,
    /// Who sent the note.
    pub provenance: Provenance,
    /// When the note arrived; becomes the note's `created_at`.
    pub received_at: DateTime<Utc>,
    /// Whether the proposal fell below the confidence threshold.
    pub low_confidence: bool,
    expires_at: Instant,
}

impl PendingSuggestion {
    pub fn new(
        text: String,
        suggestion: ClassificationResult,
        provenance: Provenance,
        received_at: DateTime<Utc>,
        low_confidence: bool,
        expires_at: Instant,
    ) -> Self {
        Self {
            text,
            suggestion,
            provenance,
            received_at,
            low_confidence,
            expires_at,
        }
    }

    /// Whether the suggestion has timed out at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A user's session: recent message times for rate limiting and at most
/// one pending suggestion.
#[derive(Debug, Default)]
pub struct UserSession {
    /// Arrival times of messages inside the current window, oldest first.
    recent: VecDeque<Instant>,
    pending: Option<PendingSuggestion>,
}

impl UserSession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message at `now` if fewer than `max` messages arrived in the
    /// last `window`. Otherwise returns how long until a slot frees up.
    pub fn check_rate_limit(
        &mut self,
        now: Instant,
        max: u32,
        window: Duration,
    ) -> Result<(), Duration> {
        self.prune(now, window);

        if self.recent.len() >= max as usize {
            let retry_after = self
                .recent
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return Err(retry_after);
        }

        self.recent.push_back(now);
        Ok(())
    }

    /// Messages counted against the limit at `now`.
    pub fn messages_in_window(&mut self, now: Instant, window: Duration) -> usize {
        self.prune(now, window);
        self.recent.len()
    }

    /// The live pending suggestion, discarding it first if it has expired.
    pub fn pending(&mut self, now: Instant) -> Option<&PendingSuggestion> {
        self.drop_expired(now);
        self.pending.as_ref()
    }

    /// Removes and returns the live pending suggestion.
    pub fn take_pending(&mut self, now: Instant) -> Option<PendingSuggestion> {
        self.drop_expired(now);
        self.pending.take()
    }

    /// Stores a suggestion, replacing any previous one.
    pub fn set_pending(&mut self, pending: PendingSuggestion) {
        self.pending = Some(pending);
    }

    /// Whether the session holds nothing worth keeping at `now`.
    pub fn is_idle(&mut self, now: Instant, window: Duration) -> bool {
        self.prune(now, window);
        self.drop_expired(now);
        self.recent.is_empty() && self.pending.is_none()
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) >= window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn drop_expired(&mut self, now: Instant) {
        if self.pending.as_ref().is_some_and(|p| p.is_expired(now)) {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    fn pending_at(expires_at: Instant) -> PendingSuggestion {
        PendingSuggestion::new(
            "Planning my workout routine".to_string(),
            ClassificationResult::model("fitness", 0.85),
            Provenance::new(1, "bob", 7),
            Utc::now(),
            false,
            expires_at,
        )
    }

    #[test]
    fn test_rate_limit_blocks_after_max() {
        let mut session = UserSession::new();
        let start = Instant::now();

        for i in 0..3 {
            assert!(session
                .check_rate_limit(start + Duration::from_secs(i), 3, WINDOW)
                .is_ok());
        }

        let retry = session
            .check_rate_limit(start + Duration::from_secs(10), 3, WINDOW)
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(50));
        assert_eq!(session.messages_in_window(start + Duration::from_secs(10), WINDOW), 3);
    }

    #[test]
    fn test_rate_limit_window_slides() {
        let mut session = UserSession::new();
        let start = Instant::now();

        session.check_rate_limit(start, 2, WINDOW).unwrap();
        session
            .check_rate_limit(start + Duration::from_secs(30), 2, WINDOW)
            .unwrap();
        assert!(session
            .check_rate_limit(start + Duration::from_secs(59), 2, WINDOW)
            .is_err());

        // The first message has left the window.
        assert!(session
            .check_rate_limit(start + Duration::from_secs(60), 2, WINDOW)
            .is_ok());
    }

    #[test]
    fn test_rejected_messages_are_not_counted() {
        let mut session = UserSession::new();
        let start = Instant::now();

        session.check_rate_limit(start, 1, WINDOW).unwrap();
        for i in 1..10 {
            assert!(session
                .check_rate_limit(start + Duration::from_secs(i), 1, WINDOW)
                .is_err());
        }
        assert!(session
            .check_rate_limit(start + WINDOW, 1, WINDOW)
            .is_ok());
    }

    #[test]
    fn test_pending_expires() {
        let mut session = UserSession::new();
        let now = Instant::now();
        session.set_pending(pending_at(now + Duration::from_secs(300)));

        assert!(session.pending(now).is_some());
        assert!(session.pending(now + Duration::from_secs(300)).is_none());
        assert!(session.take_pending(now).is_none());
    }

    #[test]
    fn test_take_pending_clears() {
        let mut session = UserSession::new();
        let now = Instant::now();
        session.set_pending(pending_at(now + Duration::from_secs(300)));

        let taken = session.take_pending(now).unwrap();
        assert_eq!(taken.suggestion.category, "fitness");
        assert!(session.take_pending(now).is_none());
    }

    #[test]
    fn test_is_idle() {
        let mut session = UserSession::new();
        let now = Instant::now();
        assert!(session.is_idle(now, WINDOW));

        session.check_rate_limit(now, 5, WINDOW).unwrap();
        assert!(!session.is_idle(now, WINDOW));
        assert!(session.is_idle(now + WINDOW, WINDOW));

        session.set_pending(pending_at(now + Duration::from_secs(10)));
        assert!(!session.is_idle(now, WINDOW));
        assert!(session.is_idle(now + WINDOW, WINDOW));
    }
}
