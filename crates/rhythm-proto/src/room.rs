//! Multiplayer room value types.

use crate::status::GameMode;
use crate::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// How players are grouped in a match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ruleset {
    /// Every player for themselves.
    #[default]
    FreeForAll = 0,
    /// Red versus blue.
    Team = 1,
}

impl Ruleset {
    /// Numeric value used in cache records.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Which modifiers players may pick themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeModType {
    /// The host picks every modifier.
    #[default]
    None = 0,
    /// Players pick gameplay modifiers.
    Regular = 1,
    /// Players pick their own playback rate.
    Rate = 2,
}

impl FreeModType {
    /// Numeric value used in cache records.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The map currently selected in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Map id, `-1` for unsubmitted maps.
    pub id: i32,
    /// Mapset id, `-1` for unsubmitted maps.
    pub mapset_id: i32,
    /// Content checksum.
    pub md5: String,
    /// Display name ("Artist - Title [Difficulty]").
    pub name: String,
    /// Game mode of the map.
    pub game_mode: GameMode,
    /// Difficulty rating of the map.
    pub difficulty_rating: f64,
}

/// Per-player view of a room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPlayer {
    /// Member user id.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Ready flag.
    pub ready: bool,
    /// Whether the player has the selected map.
    pub has_map: bool,
    /// Personal modifier bitmask.
    pub modifiers: i64,
    /// Matches won in this room.
    pub wins: u32,
}

/// Owned snapshot of a room sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room id.
    pub id: RoomId,
    /// Room name.
    pub name: String,
    /// Whether joining requires a password.
    pub has_password: bool,
    /// Member cap.
    pub max_players: u8,
    /// Selected map.
    pub map: MapInfo,
    /// Current host.
    pub host_id: UserId,
    /// Team ruleset.
    pub ruleset: Ruleset,
    /// Whether the host role rotates after every match.
    pub host_rotation: bool,
    /// Whether a match is being played.
    pub in_progress: bool,
    /// Modifiers applied to every player.
    pub global_modifiers: i64,
    /// Free-mod mode.
    pub free_mod: FreeModType,
    /// Tournament mode flag.
    pub tournament: bool,
    /// Members in join order.
    pub players: Vec<RoomPlayer>,
}

/// Partial settings update sent by the host. Absent fields are left alone.
///
/// An empty `password` clears the room password.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    /// New room name.
    pub name: Option<String>,
    /// New password, empty to clear.
    pub password: Option<String>,
    /// New member cap.
    pub max_players: Option<u8>,
    /// New team ruleset.
    pub ruleset: Option<Ruleset>,
    /// New host rotation flag.
    pub host_rotation: Option<bool>,
    /// New global modifier bitmask.
    pub global_modifiers: Option<i64>,
    /// New free-mod mode.
    pub free_mod: Option<FreeModType>,
    /// New tournament flag.
    pub tournament: Option<bool>,
}
