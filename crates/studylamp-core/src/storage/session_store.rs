//! Durable slot for the active session snapshot.
//!
//! Every failure here degrades to "no session available": write errors are
//! logged and swallowed (the in-memory session stays authoritative), and
//! unreadable, foreign, or stale snapshots load as `None`.

use tracing::{debug, warn};

use super::config::StoreConfig;
use super::kv::PersistentStore;
use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::session::PersistedSession;

/// Engine-wide slot key.
pub const SESSION_SLOT_KEY: &str = "studylamp.active_session";

pub struct SessionStore<S> {
    backend: S,
    clock: SharedClock,
    key: String,
    staleness_ms: i64,
}

impl<S: PersistentStore> SessionStore<S> {
    /// Default key and 24h staleness.
    pub fn new(backend: S, clock: SharedClock) -> Self {
        Self::with_config(backend, clock, &StoreConfig::default())
    }

    pub fn with_config(backend: S, clock: SharedClock, config: &StoreConfig) -> Self {
        Self {
            backend,
            clock,
            key: config.slot_key.clone(),
            staleness_ms: config.staleness_ms(),
        }
    }

    /// Stamp `last_saved_at` and overwrite the slot, logging any failure.
    pub fn save(&self, session: &mut PersistedSession) {
        if let Err(e) = self.try_save(session) {
            warn!(
                error = %e,
                session_id = %session.session_id,
                "failed to persist session; keeping in-memory state"
            );
        }
    }

    /// Like [`save`](Self::save) but reports the failure.
    ///
    /// The stamp is applied even when the write fails.
    ///
    /// # Errors
    /// Returns an error if serialization or the backend write fails.
    pub fn try_save(&self, session: &mut PersistedSession) -> Result<(), StoreError> {
        session.last_saved_at_epoch_ms = self.clock.now_ms().max(session.created_at_epoch_ms);
        let json = serde_json::to_string(session)?;
        self.backend.set(&self.key, &json)?;
        debug!(
            session_id = %session.session_id,
            bytes = json.len(),
            "session saved"
        );
        Ok(())
    }

    /// Read the active snapshot.
    ///
    /// With `learner_id`, a snapshot belonging to someone else is reported
    /// as absent and left in place. A snapshot older than the staleness
    /// threshold is cleared.
    pub fn load(&self, learner_id: Option<&str>) -> Option<PersistedSession> {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "failed to read session slot");
                return None;
            }
        };

        let session = match PersistedSession::from_json(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "discarding unusable session snapshot");
                return None;
            }
        };

        if let Some(requested) = learner_id {
            if session.learner_id != requested {
                debug!("stored session belongs to another learner");
                return None;
            }
        }

        let age_ms = self.clock.now_ms().saturating_sub(session.last_saved_at_epoch_ms);
        if age_ms > self.staleness_ms {
            warn!(
                session_id = %session.session_id,
                age_ms,
                "evicting stale session"
            );
            self.clear();
            return None;
        }

        Some(session)
    }

    pub fn clear(&self) {
        if let Err(e) = self.backend.delete(&self.key) {
            warn!(error = %e, "failed to clear session slot");
        }
    }

    pub fn has_active(&self, learner_id: &str) -> bool {
        self.load(Some(learner_id)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::session::recorder;
    use crate::storage::MemoryStore;
    use std::rc::Rc;

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn store() -> (SessionStore<Rc<MemoryStore>>, Rc<MemoryStore>, ManualClock) {
        let backend = Rc::new(MemoryStore::new());
        let clock = ManualClock::new(1_700_000_000_000);
        let store = SessionStore::new(Rc::clone(&backend), Rc::new(clock.clone()));
        (store, backend, clock)
    }

    #[test]
    fn save_stamps_and_load_returns() {
        let (store, _backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        clock.advance_secs(30);
        store.save(&mut session);
        assert_eq!(session.last_saved_at_epoch_ms, clock.now_ms());

        let loaded = store.load(Some("a")).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(store.load(None), Some(session));
    }

    #[test]
    fn empty_slot_loads_none() {
        let (store, _backend, _clock) = store();
        assert!(store.load(None).is_none());
        assert!(!store.has_active("a"));
    }

    #[test]
    fn other_learner_sees_nothing() {
        let (store, backend, clock) = store();
        let mut session = recorder::create_new_session("A", "s", "L1", 1, clock.now_ms());
        store.save(&mut session);

        assert!(store.load(Some("B")).is_none());
        assert!(!store.has_active("B"));
        // The slot still belongs to A.
        assert!(!backend.is_empty());
        assert!(store.has_active("A"));
    }

    #[test]
    fn stale_session_is_evicted() {
        let (store, backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        store.save(&mut session);

        clock.advance_ms(25 * HOUR_MS);
        assert!(store.load(Some("a")).is_none());
        assert!(backend.is_empty());
    }

    #[test]
    fn recent_session_is_returned_unchanged() {
        let (store, _backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        store.save(&mut session);

        clock.advance_ms(23 * HOUR_MS);
        assert_eq!(store.load(Some("a")), Some(session));
    }

    #[test]
    fn corrupted_snapshot_is_absent() {
        let (store, backend, _clock) = store();
        backend.set(SESSION_SLOT_KEY, "{\"childId\": \"a\", \"sessionId\"").unwrap();
        assert!(store.load(Some("a")).is_none());
        backend.set(SESSION_SLOT_KEY, "[1, 2, 3]").unwrap();
        assert!(store.load(None).is_none());
    }

    #[test]
    fn inconsistent_snapshot_is_absent() {
        let (store, backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        session.problems_completed = 4;
        backend
            .set(SESSION_SLOT_KEY, &serde_json::to_string(&session).unwrap())
            .unwrap();
        assert!(store.load(Some("a")).is_none());
    }

    #[test]
    fn write_failure_is_swallowed() {
        let backend = MemoryStore::with_quota(32);
        let clock = ManualClock::new(5_000);
        let store = SessionStore::new(backend, Rc::new(clock.clone()));
        let mut session = recorder::create_new_session("a", "s", "A", 1, 0);

        clock.advance_secs(1);
        store.save(&mut session);
        assert_eq!(session.last_saved_at_epoch_ms, 6_000);
        assert!(store.load(None).is_none());
        assert!(matches!(store.try_save(&mut session), Err(StoreError::QuotaExceeded { .. })));
    }

    #[test]
    fn save_never_stamps_before_creation() {
        let (store, _backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        clock.advance_secs(-120);
        store.save(&mut session);
        assert_eq!(session.last_saved_at_epoch_ms, session.created_at_epoch_ms);
        assert!(store.load(None).is_some());
    }

    #[test]
    fn clear_removes_slot() {
        let (store, backend, clock) = store();
        let mut session = recorder::create_new_session("a", "s", "A", 1, clock.now_ms());
        store.save(&mut session);
        store.clear();
        assert!(backend.is_empty());
        store.clear();
    }

    #[test]
    fn custom_key_and_threshold() {
        let backend = Rc::new(MemoryStore::new());
        let clock = ManualClock::new(0);
        let config = StoreConfig {
            slot_key: "custom".into(),
            staleness_hours: 1,
            ..StoreConfig::default()
        };
        let store = SessionStore::with_config(Rc::clone(&backend), Rc::new(clock.clone()), &config);
        let mut session = recorder::create_new_session("a", "s", "A", 1, 0);
        store.save(&mut session);
        assert!(backend.get("custom").unwrap().is_some());

        clock.advance_ms(HOUR_MS + 1);
        assert!(store.load(None).is_none());
    }
}
