//! Registry of online users.
//!
//! Two concurrent maps index the same sessions: by user id and by session
//! token. Registry operations never take a session's own lock.

use super::dashmap_ext::DashMapExt;
use super::session::UserSession;
use crate::error::RegistryError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rhythm_proto::UserId;
use std::sync::Arc;
use tracing::warn;

#[derive(Default)]
pub struct SessionRegistry {
    by_id: DashMap<UserId, Arc<UserSession>>,
    by_token: DashMap<String, Arc<UserSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// A token that is already registered is rejected and the first
    /// registrant kept. If the user already had a live session under another
    /// token, that session is returned so the caller can evict it; the new
    /// one takes its place in the id index.
    pub fn add(
        &self,
        session: Arc<UserSession>,
    ) -> Result<Option<Arc<UserSession>>, RegistryError> {
        match self.by_token.entry(session.token().to_string()) {
            Entry::Occupied(_) => {
                warn!(user_id = session.id(), "Rejected session with duplicate token");
                return Err(RegistryError::DuplicateToken);
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&session));
            }
        }
        Ok(self.by_id.insert(session.id(), session))
    }

    /// Deregister the session holding `token`. Absent tokens are a no-op.
    pub fn remove_by_token(&self, token: &str) -> Option<Arc<UserSession>> {
        let (_, session) = self.by_token.remove(token)?;
        // A newer login may already own the id slot.
        self.by_id
            .remove_if(&session.id(), |_, current| Arc::ptr_eq(current, &session));
        Some(session)
    }

    pub fn get_by_id(&self, id: UserId) -> Option<Arc<UserSession>> {
        self.by_id.get_cloned(&id)
    }

    pub fn get_by_token(&self, token: &str) -> Option<Arc<UserSession>> {
        self.by_token.get_cloned(token)
    }

    /// Number of online users.
    ///
    /// Shards are read one after another, so a login or logout racing with
    /// the call may or may not be counted. Neither this nor [`Self::all`]
    /// ever waits on a session lock.
    pub fn count(&self) -> usize {
        self.by_id.len()
    }

    /// Every online user's session.
    ///
    /// Each shard is copied under its own read lock. The result is exact
    /// for every shard but not one instant across all of them: a session
    /// added or removed during the call may be missing or still present.
    /// Callers that need a count matching the list use its length.
    pub fn all(&self) -> Vec<Arc<UserSession>> {
        self.by_id.values_cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::state::testing::{session_in, session_with_token};

    #[test]
    fn add_and_lookup() {
        let registry = SessionRegistry::new();
        let session = Arc::new(session_in(1, Arc::new(MemoryStore::new())));
        let token = session.token().to_string();

        assert!(registry.add(Arc::clone(&session)).unwrap().is_none());
        assert_eq!(registry.count(), 1);
        assert!(Arc::ptr_eq(&registry.get_by_id(1).unwrap(), &session));
        assert!(Arc::ptr_eq(&registry.get_by_token(&token).unwrap(), &session));
    }

    #[test]
    fn duplicate_token_keeps_first_registrant() {
        let registry = SessionRegistry::new();
        let first = Arc::new(session_with_token(1, "same"));
        let second = Arc::new(session_with_token(2, "same"));

        registry.add(Arc::clone(&first)).unwrap();
        assert!(matches!(
            registry.add(second),
            Err(RegistryError::DuplicateToken)
        ));

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get_by_token("same").unwrap().id(), 1);
        assert!(registry.get_by_id(2).is_none());
    }

    #[test]
    fn second_login_returns_previous_session() {
        let registry = SessionRegistry::new();
        let old = Arc::new(session_with_token(1, "old"));
        let new = Arc::new(session_with_token(1, "new"));

        registry.add(Arc::clone(&old)).unwrap();
        let evicted = registry.add(Arc::clone(&new)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&evicted, &old));

        // Tearing down the old session must not unregister the new one.
        registry.remove_by_token("old");
        assert!(Arc::ptr_eq(&registry.get_by_id(1).unwrap(), &new));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.add(Arc::new(session_with_token(1, "tok"))).unwrap();

        assert!(registry.remove_by_token("tok").is_some());
        assert!(registry.remove_by_token("tok").is_none());
        assert!(registry.remove_by_token("never").is_none());
        assert!(registry.get_by_token("tok").is_none());
        assert!(registry.get_by_id(1).is_none());
        assert_eq!(registry.count(), 0);
    }
}
