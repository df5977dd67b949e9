//! State management module.
//!
//! Contains the [`Hub`] (shared server state) and the entities it tracks:
//! online users in the [`SessionRegistry`] and multiplayer rooms in the
//! [`RoomRegistry`].

mod dashmap_ext;
mod hub;
mod online;
mod registry;
mod room;
mod rooms;
mod session;
mod token;

pub use hub::Hub;
pub use online::run_online_count_publisher;
pub use registry::SessionRegistry;
pub use room::{GameRoom, LeaveOutcome, PlayerProfile, RoomSettings};
pub use rooms::{NewRoom, RoomRegistry};
pub use session::{UserSession, now_ms};

/// Fixtures shared by tests across the crate.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::cache::{CacheStore, CacheSync, MemoryStore};
    use crate::db::UserInfo;
    use crate::network::testing::RecordingConnection;
    use crate::network::{Broadcaster, Connection, PacketCodec};
    use rhythm_proto::{GameMode, MapInfo, UserId};
    use std::sync::Arc;
    use std::time::Duration;

    pub fn profile(id: UserId) -> UserInfo {
        UserInfo {
            id,
            steam_id: format!("steam{id}"),
            username: format!("player{id}"),
            user_groups: 1,
            mute_end_time: 0,
            country: "NL".to_string(),
            avatar_url: format!("https://avatars.example/{id}"),
        }
    }

    pub fn player(id: UserId) -> PlayerProfile {
        PlayerProfile::from(&profile(id))
    }

    pub fn map(id: i32) -> MapInfo {
        MapInfo {
            id,
            mapset_id: id * 10,
            md5: format!("md5-{id}"),
            name: format!("Map {id}"),
            game_mode: GameMode::Keys4,
            difficulty_rating: 5.25,
        }
    }

    pub fn broadcaster() -> Broadcaster {
        Broadcaster::new(PacketCodec::new(Duration::from_millis(100)))
    }

    fn build(
        info: UserInfo,
        token: String,
        conn: Arc<dyn Connection>,
        store: Arc<dyn CacheStore>,
    ) -> UserSession {
        UserSession::new(info, token, conn, CacheSync::new(store), broadcaster())
    }

    pub fn session_for(info: UserInfo, store: Arc<dyn CacheStore>) -> UserSession {
        let token = format!("token{}", info.id);
        build(info, token, Arc::new(RecordingConnection::default()), store)
    }

    pub fn session_in(id: UserId, store: Arc<dyn CacheStore>) -> UserSession {
        session_for(profile(id), store)
    }

    pub fn session_with(id: UserId, conn: Arc<dyn Connection>) -> UserSession {
        build(
            profile(id),
            format!("token{id}"),
            conn,
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn session_with_token(id: UserId, token: &str) -> UserSession {
        build(
            profile(id),
            token.to_string(),
            Arc::new(RecordingConnection::default()),
            Arc::new(MemoryStore::new()),
        )
    }
}
