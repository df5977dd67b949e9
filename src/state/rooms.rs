//! Registry of active rooms.
//!
//! Besides the rooms themselves this tracks which room each user is in, so a
//! user is a member of at most one room. Membership is reserved here before
//! the room's own join runs and rolled back if the join is refused.

use super::dashmap_ext::DashMapExt;
use super::room::{GameRoom, LeaveOutcome, PlayerProfile, RoomSettings, validate_settings};
use crate::cache::CacheSync;
use crate::error::RoomError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rhythm_proto::{MapInfo, RoomId, UserId};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::info;

/// A room creation request.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub password: Option<String>,
    pub max_players: u8,
    pub map: MapInfo,
}

pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<GameRoom>>,
    memberships: DashMap<UserId, RoomId>,
    next_id: AtomicI32,
    cache: CacheSync,
}

impl RoomRegistry {
    pub fn new(cache: CacheSync) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            next_id: AtomicI32::new(1),
            cache,
        }
    }

    fn reserve(&self, user_id: UserId, room_id: RoomId) -> Result<(), RoomError> {
        match self.memberships.entry(user_id) {
            Entry::Occupied(_) => Err(RoomError::AlreadyMember),
            Entry::Vacant(slot) => {
                slot.insert(room_id);
                Ok(())
            }
        }
    }

    /// Create a room hosted by `host`.
    pub async fn create(
        &self,
        request: NewRoom,
        host: PlayerProfile,
    ) -> Result<Arc<GameRoom>, RoomError> {
        validate_settings(&request.name, request.max_players, 1)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let host_id = host.user_id;
        self.reserve(host_id, id)?;

        let settings = RoomSettings::new(request.name, request.max_players, request.map, host_id);
        let room = Arc::new(GameRoom::new(
            id,
            settings,
            request.password,
            host,
            self.cache.clone(),
        ));
        self.rooms.insert(id, Arc::clone(&room));
        crate::metrics::set_active_rooms(self.rooms.len());
        info!(room_id = id, host_id, "Room created");

        room.publish().await;
        Ok(room)
    }

    /// Add a user to a room.
    pub async fn join(
        &self,
        room_id: RoomId,
        profile: PlayerProfile,
        password: Option<&str>,
    ) -> Result<Arc<GameRoom>, RoomError> {
        let room = self.get(room_id).ok_or(RoomError::NoSuchRoom)?;
        let user_id = profile.user_id;
        self.reserve(user_id, room_id)?;
        if let Err(e) = room.join(profile, password).await {
            self.memberships.remove_if(&user_id, |_, r| *r == room_id);
            return Err(e);
        }
        Ok(room)
    }

    /// Take a user out of whatever room they are in.
    ///
    /// Returns the room and what happened, or `None` if the user was in no
    /// room. An emptied room is dropped from the registry.
    pub async fn leave(&self, user_id: UserId) -> Option<(Arc<GameRoom>, LeaveOutcome)> {
        let (_, room_id) = self.memberships.remove(&user_id)?;
        let room = self.get(room_id)?;
        let outcome = room.leave(user_id).await;
        if outcome == LeaveOutcome::Emptied {
            self.rooms.remove(&room_id);
            crate::metrics::set_active_rooms(self.rooms.len());
            info!(room_id, "Room emptied");
        }
        Some((room, outcome))
    }

    /// Close a room and drop it. `by` must be the host unless `None`.
    ///
    /// Returns the former members.
    pub async fn remove(
        &self,
        room_id: RoomId,
        by: Option<UserId>,
    ) -> Result<Vec<UserId>, RoomError> {
        let room = self.get(room_id).ok_or(RoomError::NoSuchRoom)?;
        let members = room.close(by).await?;
        self.rooms.remove(&room_id);
        for member in &members {
            self.memberships.remove_if(member, |_, r| *r == room_id);
        }
        crate::metrics::set_active_rooms(self.rooms.len());
        info!(room_id, members = members.len(), "Room closed");
        Ok(members)
    }

    /// The room `user_id` is in.
    pub fn room_of(&self, user_id: UserId) -> Option<Arc<GameRoom>> {
        let room_id = self.memberships.get_cloned(&user_id)?;
        self.get(room_id)
    }

    pub fn get(&self, room_id: RoomId) -> Option<Arc<GameRoom>> {
        self.rooms.get_cloned(&room_id)
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }

    pub fn all(&self) -> Vec<Arc<GameRoom>> {
        self.rooms.values_cloned()
    }
}
