//! Cache write protocol.
//!
//! The in-memory registries are authoritative. Every mutation is applied
//! there first, the entity lock is released, and only then is the matching
//! record rewritten here. The two steps are not transactional: a crash
//! between them leaves a stale row until the entity changes again or the
//! next startup clears the namespace. That window is accepted.
//!
//! Nothing here returns an error. Failures are logged, counted, and dropped.

use super::keys;
use super::records::{self, PlayerRecord};
use super::{CacheError, CacheStore};
use crate::state::RoomSettings;
use rhythm_proto::{ClientStatus, RoomId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Best-effort writer for session and room records.
#[derive(Clone)]
pub struct CacheSync {
    store: Arc<dyn CacheStore>,
}

impl CacheSync {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    fn report<T>(&self, op: &'static str, key: &str, result: Result<T, CacheError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(op, key = %key, error = %e, "Cache write failed");
                crate::metrics::record_cache_error(op);
                None
            }
        }
    }

    /// Map a fresh session token to its user.
    pub async fn publish_session(&self, token: &str, user_id: UserId) {
        let key = keys::session(token);
        let result = self.store.set(&key, &user_id.to_string()).await;
        self.report("publish_session", &key, result);
    }

    /// Delete a session's token and status records.
    pub async fn remove_session(&self, token: &str, user_id: UserId) {
        let key = keys::session(token);
        let result = self
            .store
            .delete(&[key.clone(), keys::user_status(user_id)])
            .await;
        self.report("remove_session", &key, result);
    }

    pub async fn publish_status(&self, user_id: UserId, status: &ClientStatus) {
        let key = keys::user_status(user_id);
        let result = self
            .store
            .replace_hash(&key, &records::status_fields(status))
            .await;
        self.report("publish_status", &key, result);
    }

    /// Delete a user's status record, leaving any session token alone.
    pub async fn remove_status(&self, user_id: UserId) {
        let key = keys::user_status(user_id);
        let result = self.store.delete(std::slice::from_ref(&key)).await;
        self.report("remove_status", &key, result);
    }

    pub async fn publish_online_count(&self, count: usize) {
        let result = self.store.set(keys::ONLINE_USERS, &count.to_string()).await;
        self.report("publish_online_count", keys::ONLINE_USERS, result);
    }

    /// Drop every session token and user status record. Sessions never
    /// survive a restart.
    pub async fn clear_sessions(&self) {
        for pattern in [keys::SESSION_PATTERN, keys::USER_STATUS_PATTERN] {
            let result = self.store.delete_matching(pattern).await;
            if let Some(removed) = self.report("clear_sessions", pattern, result) {
                info!(pattern, removed, "Cleared stale session records");
            }
        }
    }

    /// Drop every room record. Rooms live in memory only, so none survive a restart.
    pub async fn clear_rooms(&self) {
        let result = self.store.delete_matching(keys::ROOM_PATTERN).await;
        if let Some(removed) = self.report("clear_rooms", keys::ROOM_PATTERN, result) {
            info!(removed, "Cleared stale room records");
        }
    }

    pub async fn publish_room_settings(
        &self,
        room_id: RoomId,
        settings: &RoomSettings,
        has_password: bool,
    ) {
        let key = keys::room(room_id);
        let result = self
            .store
            .replace_hash(&key, &records::settings_fields(settings, has_password))
            .await;
        self.report("publish_room_settings", &key, result);
    }

    pub async fn publish_player(&self, room_id: RoomId, player: &PlayerRecord) {
        let key = keys::room_player(room_id, player.user_id);
        let result = self
            .store
            .replace_hash(&key, &records::player_fields(player))
            .await;
        self.report("publish_player", &key, result);
    }

    pub async fn remove_player(&self, room_id: RoomId, user_id: UserId) {
        let key = keys::room_player(room_id, user_id);
        let result = self.store.delete(std::slice::from_ref(&key)).await;
        self.report("remove_player", &key, result);
    }

    /// Delete a room's settings record and the records of `player_ids`.
    pub async fn remove_room(&self, room_id: RoomId, player_ids: &[UserId]) {
        let key = keys::room(room_id);
        let mut doomed = Vec::with_capacity(player_ids.len() + 1);
        doomed.push(key.clone());
        doomed.extend(player_ids.iter().map(|&id| keys::room_player(room_id, id)));
        debug!(room_id, keys = doomed.len(), "Removing room records");
        let result = self.store.delete(&doomed).await;
        self.report("remove_room", &key, result);
    }
}
