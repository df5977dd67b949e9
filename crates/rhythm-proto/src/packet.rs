//! Client-bound and server-bound packets.

use crate::error::ProtocolError;
use crate::room::{MapInfo, RoomSnapshot, SettingsPatch};
use crate::status::ClientStatus;
use crate::user::{PacketUser, UserStats};
use crate::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Largest inbound frame the server will try to decode.
pub const MAX_CLIENT_PACKET_BYTES: usize = 16 * 1024;

/// Packets sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientPacket {
    /// First frame of every connection.
    Login {
        /// Account name.
        username: String,
        /// Plaintext password (TLS terminates in front of the server).
        password: String,
    },
    /// Client-initiated keepalive.
    Ping,
    /// Reply to a server [`ServerPacket::Ping`].
    Pong,
    /// New client status.
    Status {
        /// The status to publish.
        status: ClientStatus,
    },
    /// Anti-cheat report of suspicious running processes.
    Processes {
        /// Process names.
        list: Vec<String>,
    },
    /// Ask the server to reload and send this user's statistics.
    StatsRequest,
    /// Create a room and become its host.
    RoomCreate {
        /// Room name.
        name: String,
        /// Optional join password.
        #[serde(default)]
        password: Option<String>,
        /// Member cap.
        max_players: u8,
        /// Initially selected map.
        map: MapInfo,
    },
    /// Join an existing room.
    RoomJoin {
        /// Room to join.
        id: RoomId,
        /// Password, if the room has one.
        #[serde(default)]
        password: Option<String>,
    },
    /// Leave the current room.
    RoomLeave,
    /// Toggle the ready flag.
    RoomReady {
        /// New ready flag.
        ready: bool,
    },
    /// Report whether the selected map is available locally.
    RoomHasMap {
        /// Whether the client has the map.
        has_map: bool,
    },
    /// Change personal modifiers (free-mod rooms).
    RoomMods {
        /// New modifier bitmask.
        modifiers: i64,
    },
    /// Change room settings (host only).
    RoomSettings {
        /// Fields to change.
        #[serde(flatten)]
        patch: SettingsPatch,
    },
    /// Select a different map (host only).
    RoomMap {
        /// The new map.
        map: MapInfo,
    },
    /// Start the match (host only).
    RoomStart,
    /// Finish the match, optionally crediting a winner (host only).
    RoomFinish {
        /// Winning player.
        #[serde(default)]
        winner: Option<UserId>,
    },
    /// Hand the host role to another member (host only).
    RoomHost {
        /// New host.
        user_id: UserId,
    },
    /// Close the room for everyone (host only).
    RoomClose,
}

impl ClientPacket {
    /// Decode a text frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        if frame.len() > MAX_CLIENT_PACKET_BYTES {
            return Err(ProtocolError::TooLarge(frame.len()));
        }
        Ok(serde_json::from_str(frame)?)
    }

    /// Short name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Status { .. } => "status",
            Self::Processes { .. } => "processes",
            Self::StatsRequest => "stats_request",
            Self::RoomCreate { .. } => "room_create",
            Self::RoomJoin { .. } => "room_join",
            Self::RoomLeave => "room_leave",
            Self::RoomReady { .. } => "room_ready",
            Self::RoomHasMap { .. } => "room_has_map",
            Self::RoomMods { .. } => "room_mods",
            Self::RoomSettings { .. } => "room_settings",
            Self::RoomMap { .. } => "room_map",
            Self::RoomStart => "room_start",
            Self::RoomFinish { .. } => "room_finish",
            Self::RoomHost { .. } => "room_host",
            Self::RoomClose => "room_close",
        }
    }
}

/// Packets sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerPacket {
    /// Login accepted.
    Welcome {
        /// The authenticated user.
        user: PacketUser,
        /// Session token for out-of-band lookups.
        token: String,
    },
    /// A request was rejected or the connection is about to close.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Server keepalive; the client answers with `pong`.
    Ping {
        /// Server time in unix milliseconds.
        timestamp: i64,
    },
    /// Reply to a client `ping`.
    Pong,
    /// Another user came online.
    UserConnected {
        /// The user.
        user: PacketUser,
    },
    /// A user went offline.
    UserDisconnected {
        /// The user.
        user_id: UserId,
    },
    /// Everyone online at login time.
    UsersOnline {
        /// Online users.
        users: Vec<PacketUser>,
    },
    /// A user changed their client status.
    StatusUpdate {
        /// The user.
        user_id: UserId,
        /// Their new status.
        status: ClientStatus,
    },
    /// Statistics for every tracked mode.
    Stats {
        /// One entry per mode.
        stats: Vec<UserStats>,
    },
    /// Full room state, sent to a player entering a room.
    RoomInfo {
        /// The room.
        room: RoomSnapshot,
    },
    /// A player joined the room.
    RoomPlayerJoined {
        /// Room id.
        room_id: RoomId,
        /// The player.
        user_id: UserId,
    },
    /// A player left the room.
    RoomPlayerLeft {
        /// Room id.
        room_id: RoomId,
        /// The player.
        user_id: UserId,
    },
    /// Room state changed.
    RoomUpdate {
        /// The room.
        room: RoomSnapshot,
    },
    /// The room no longer exists.
    RoomClosed {
        /// Room id.
        room_id: RoomId,
    },
}
