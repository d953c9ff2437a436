use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::watch;
use tracing::debug;

use crate::domain::{BotError, UserId};

/// What to do when an owner already has a session running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveSessionPolicy {
    #[default]
    Reject,
    Supersede,
}

/// Registry entry for a running session. Dropping it closes the cancel channel.
#[derive(Debug)]
pub struct RegisteredSession {
    pub session_id: u64,
    pub target: String,
    pub started_at: Instant,
    cancel: watch::Sender<bool>,
}

impl RegisteredSession {
    pub fn new(session_id: u64, target: String, cancel: watch::Sender<bool>) -> Self {
        Self {
            session_id,
            target,
            started_at: Instant::now(),
            cancel,
        }
    }

    /// Asks the owning session task to kill its process.
    pub fn signal_cancel(&self) {
        self.cancel.send_replace(true);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub session_id: u64,
    pub target: String,
    pub started_at: Instant,
}

/// Owner identity to running session. One mutex guards the whole map, so every
/// operation on the same owner is serialized.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<UserId, RegisteredSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, RegisteredSession>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts `entry` for `owner`. Under `Supersede` the previous entry is
    /// returned, already signalled for cancellation.
    pub fn register(
        &self,
        owner: UserId,
        entry: RegisteredSession,
        policy: ActiveSessionPolicy,
    ) -> Result<Option<RegisteredSession>, BotError> {
        let mut sessions = self.lock();
        if sessions.contains_key(&owner) && policy == ActiveSessionPolicy::Reject {
            return Err(BotError::SessionActive);
        }
        let previous = sessions.insert(owner, entry);
        if let Some(previous) = &previous {
            debug!(
                user_id = owner,
                session_id = previous.session_id,
                "Superseding active session"
            );
            previous.signal_cancel();
        }
        Ok(previous)
    }

    pub fn lookup(&self, owner: UserId) -> Option<ActiveSession> {
        self.lock().get(&owner).map(|entry| ActiveSession {
            session_id: entry.session_id,
            target: entry.target.clone(),
            started_at: entry.started_at,
        })
    }

    /// Removes whatever is registered for `owner`. Removing an absent key is a no-op.
    pub fn unregister(&self, owner: UserId) -> Option<RegisteredSession> {
        self.lock().remove(&owner)
    }

    /// Removes the entry only if it still belongs to `session_id`, so a finished
    /// session never evicts the one that superseded it.
    pub fn unregister_session(&self, owner: UserId, session_id: u64) -> bool {
        let mut sessions = self.lock();
        match sessions.get(&owner) {
            Some(entry) if entry.session_id == session_id => {
                sessions.remove(&owner);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a session's registry entry when dropped, whichever way the session ends.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<SessionRegistry>,
    owner: UserId,
    session_id: u64,
}

impl RegistrationGuard {
    pub fn new(registry: Arc<SessionRegistry>, owner: UserId, session_id: u64) -> Self {
        Self {
            registry,
            owner,
            session_id,
        }
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.registry.unregister_session(self.owner, self.session_id) {
            debug!(
                user_id = self.owner,
                session_id = self.session_id,
                "Session unregistered"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session_id: u64) -> (RegisteredSession, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (RegisteredSession::new(session_id, "magnet:?xt=1".into(), tx), rx)
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = SessionRegistry::new();
        let (e, _rx) = entry(1);
        registry.register(10, e, ActiveSessionPolicy::Reject).unwrap();

        assert_eq!(registry.lookup(10).unwrap().session_id, 1);
        assert!(registry.lookup(11).is_none());

        assert!(registry.unregister(10).is_some());
        assert!(registry.unregister(10).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reject_policy_keeps_existing_session() {
        let registry = SessionRegistry::new();
        let (first, first_rx) = entry(1);
        let (second, _rx) = entry(2);
        registry.register(10, first, ActiveSessionPolicy::Reject).unwrap();

        let err = registry
            .register(10, second, ActiveSessionPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, BotError::SessionActive));
        assert_eq!(registry.lookup(10).unwrap().session_id, 1);
        assert!(!*first_rx.borrow());
    }

    #[test]
    fn test_supersede_policy_cancels_previous() {
        let registry = SessionRegistry::new();
        let (first, first_rx) = entry(1);
        let (second, _rx) = entry(2);
        registry.register(10, first, ActiveSessionPolicy::Reject).unwrap();

        let previous = registry
            .register(10, second, ActiveSessionPolicy::Supersede)
            .unwrap()
            .unwrap();
        assert_eq!(previous.session_id, 1);
        assert!(*first_rx.borrow());
        assert_eq!(registry.lookup(10).unwrap().session_id, 2);
    }

    #[test]
    fn test_different_owners_do_not_interfere() {
        let registry = SessionRegistry::new();
        let (a, _ra) = entry(1);
        let (b, _rb) = entry(2);
        registry.register(10, a, ActiveSessionPolicy::Reject).unwrap();
        registry.register(20, b, ActiveSessionPolicy::Reject).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_guard_only_removes_its_own_session() {
        let registry = Arc::new(SessionRegistry::new());
        let (first, _r1) = entry(1);
        let (second, _r2) = entry(2);
        registry.register(10, first, ActiveSessionPolicy::Reject).unwrap();
        let stale = RegistrationGuard::new(registry.clone(), 10, 1);
        registry
            .register(10, second, ActiveSessionPolicy::Supersede)
            .unwrap();

        drop(stale);
        assert_eq!(registry.lookup(10).unwrap().session_id, 2);

        drop(RegistrationGuard::new(registry.clone(), 10, 2));
        assert!(registry.lookup(10).is_none());
    }
}
