//! # rhythm-proto
//!
//! Wire types for the rhythmd multiplayer session protocol.
//!
//! Every packet is a single JSON object carried in one WebSocket text frame.
//! Packets are internally tagged by a `"t"` field:
//!
//! ```rust
//! use rhythm_proto::ClientPacket;
//!
//! let packet = ClientPacket::decode(r#"{"t":"room_ready","ready":true}"#).unwrap();
//! assert_eq!(packet, ClientPacket::RoomReady { ready: true });
//! ```
//!
//! Server-bound packets are [`ClientPacket`]s, client-bound packets are
//! [`ServerPacket`]s. The shared value types (client status, statistics,
//! room settings) live in their own modules and are re-exported here.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod packet;
pub mod room;
pub mod status;
pub mod user;

pub use error::ProtocolError;
pub use packet::{ClientPacket, ServerPacket};
pub use room::{FreeModType, MapInfo, RoomPlayer, RoomSnapshot, Ruleset, SettingsPatch};
pub use status::{ClientStatus, ClientStatusKind, GameMode};
pub use user::{PacketUser, UserStats};

/// Numeric user identifier (primary key in the persistent store).
pub type UserId = i32;

/// Numeric multiplayer room identifier.
pub type RoomId = i32;
