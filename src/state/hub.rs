//! Process-wide server context shared by every connection task.

use super::registry::SessionRegistry;
use super::rooms::RoomRegistry;
use super::session::UserSession;
use super::token::generate_token;
use crate::cache::CacheSync;
use crate::config::{FloodConfig, TimeoutsConfig};
use crate::db::{Database, UserInfo};
use crate::network::{Broadcaster, Connection, PacketCodec};
use std::sync::Arc;

pub struct Hub {
    pub sessions: SessionRegistry,
    pub rooms: RoomRegistry,
    pub broadcaster: Broadcaster,
    pub cache: CacheSync,
    pub db: Database,
    pub timeouts: TimeoutsConfig,
    pub flood: FloodConfig,
}

impl Hub {
    pub fn new(
        db: Database,
        cache: CacheSync,
        timeouts: TimeoutsConfig,
        flood: FloodConfig,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms: RoomRegistry::new(cache.clone()),
            broadcaster: Broadcaster::new(PacketCodec::new(timeouts.write())),
            cache,
            db,
            timeouts,
            flood,
        }
    }

    /// Build a session with a fresh token. It is not registered yet.
    pub fn create_session(&self, info: UserInfo, conn: Arc<dyn Connection>) -> Arc<UserSession> {
        Arc::new(UserSession::new(
            info,
            generate_token(),
            conn,
            self.cache.clone(),
            self.broadcaster.clone(),
        ))
    }
}
