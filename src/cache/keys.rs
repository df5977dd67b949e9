//! Cache key scheme.
//!
//! Keys are colon-delimited and derived only from entity identity, so any
//! process can compute them.

use rhythm_proto::{RoomId, UserId};

/// Count of connected users (string).
pub const ONLINE_USERS: &str = "server:online_users";

/// Every session key.
pub const SESSION_PATTERN: &str = "server:session:*";

/// Every user status key.
pub const USER_STATUS_PATTERN: &str = "server:user_status:*";

/// Every room settings and per-player key.
pub const ROOM_PATTERN: &str = "server:multiplayer:*";

/// Session token to user id (string).
pub fn session(token: &str) -> String {
    format!("server:session:{token}")
}

/// Client status of a user (hash).
pub fn user_status(user_id: UserId) -> String {
    format!("server:user_status:{user_id}")
}

/// Room settings (hash).
pub fn room(room_id: RoomId) -> String {
    format!("server:multiplayer:{room_id}")
}

/// One player's state inside a room (hash).
pub fn room_player(room_id: RoomId, user_id: UserId) -> String {
    format!("server:multiplayer:{room_id}:player:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_derived_from_identity() {
        assert_eq!(session("abc"), "server:session:abc");
        assert_eq!(user_status(7), "server:user_status:7");
        assert_eq!(room(42), "server:multiplayer:42");
        assert_eq!(room_player(42, 7), "server:multiplayer:42:player:7");
    }

    #[test]
    fn patterns_cover_their_namespaces() {
        let sessions = glob::Pattern::new(SESSION_PATTERN).unwrap();
        assert!(sessions.matches(&session("tok")));
        assert!(!sessions.matches(&user_status(1)));

        let statuses = glob::Pattern::new(USER_STATUS_PATTERN).unwrap();
        assert!(statuses.matches(&user_status(1)));
        assert!(!statuses.matches(&session("tok")));

        let rooms = glob::Pattern::new(ROOM_PATTERN).unwrap();
        assert!(rooms.matches(&room(1)));
        assert!(rooms.matches(&room_player(1, 2)));
        assert!(!rooms.matches(ONLINE_USERS));
    }
}
