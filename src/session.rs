//! Session identity and expiry tracking.
//!
//! A session is an externally issued, time-bounded authorization enabling
//! transfers. The guard only tracks identity and expiry; it never talks to
//! whatever issued the session.

use chrono::{DateTime, Duration, Utc};

/// Tracks the current transfer session and its expiry.
///
/// Absence of an expiry means no expiry policy is enforced. Expiry checks
/// apply a caller-chosen buffer to absorb clock skew between this process
/// and the session issuer.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    session_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session, replacing any previous one.
    pub fn set(&mut self, session_id: impl Into<String>, expires_at: DateTime<Utc>) {
        let session_id = session_id.into();
        tracing::info!(session_id = %session_id, expires_at = %expires_at, "session set");
        self.session_id = Some(session_id);
        self.expires_at = Some(expires_at);
    }

    /// Forget the current session and its expiry policy.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.expires_at = None;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// True iff an expiry is set and `now + buffer` has reached it.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                let expired = Utc::now() + buffer >= expires_at;
                if expired {
                    tracing::warn!(expires_at = %expires_at, "session expired");
                }
                expired
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_expiry_means_never_expired() {
        let guard = SessionGuard::new();
        assert!(!guard.is_expired(Duration::seconds(30)));
    }

    #[test]
    fn expiry_applies_buffer() {
        let mut guard = SessionGuard::new();

        // Far in the future: valid even with the buffer.
        guard.set("sess-1", Utc::now() + Duration::minutes(10));
        assert!(!guard.is_expired(Duration::seconds(30)));

        // Inside the buffer window: treated as expired.
        guard.set("sess-1", Utc::now() + Duration::seconds(10));
        assert!(guard.is_expired(Duration::seconds(30)));

        // Already past.
        guard.set("sess-1", Utc::now() - Duration::seconds(1));
        assert!(guard.is_expired(Duration::zero()));
    }

    #[test]
    fn clear_removes_policy() {
        let mut guard = SessionGuard::new();
        guard.set("sess-1", Utc::now() - Duration::minutes(1));
        assert!(guard.is_expired(Duration::seconds(30)));

        guard.clear();
        assert!(!guard.is_expired(Duration::seconds(30)));
        assert!(guard.session_id().is_none());
    }
}
