//! Client status and game mode.

use serde::{Deserialize, Serialize};

/// Key-count game modes tracked by the server.
///
/// The discriminant is the value stored in the persistent store and the
/// external cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Four keys.
    #[default]
    Keys4 = 1,
    /// Five keys.
    Keys5 = 2,
    /// Six keys.
    Keys6 = 3,
    /// Seven keys.
    Keys7 = 4,
}

impl GameMode {
    /// Every mode the server keeps statistics for, in storage order.
    pub const ALL: [GameMode; 4] = [
        GameMode::Keys4,
        GameMode::Keys5,
        GameMode::Keys6,
        GameMode::Keys7,
    ];

    /// Numeric value used in storage and cache records.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Resolve a stored numeric value.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_i32() == value)
    }
}

/// What the client is currently doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatusKind {
    /// Browsing the song select screen.
    #[default]
    Selecting = 0,
    /// Playing a map.
    Playing = 1,
    /// Paused mid-play.
    Paused = 2,
    /// Watching a replay or spectating.
    Watching = 3,
    /// In the map editor.
    Editing = 4,
    /// Browsing the multiplayer lobby.
    InLobby = 5,
    /// Inside a multiplayer room.
    Multiplayer = 6,
    /// Listening to music.
    Listening = 7,
}

impl ClientStatusKind {
    /// Numeric value used in cache records.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// The user-reported activity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    /// Activity kind.
    #[serde(rename = "s")]
    pub status: ClientStatusKind,
    /// Map being played, `-1` when none.
    #[serde(rename = "id")]
    pub map_id: i32,
    /// Content hash of the map file.
    #[serde(rename = "md5", default)]
    pub map_md5: String,
    /// Game mode of the map.
    #[serde(rename = "gm", default)]
    pub game_mode: GameMode,
    /// Free-text detail (map title, editor file, ...).
    #[serde(rename = "c", default)]
    pub content: String,
    /// Active gameplay modifier bitmask.
    #[serde(rename = "m", default)]
    pub modifiers: i64,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            status: ClientStatusKind::Selecting,
            map_id: -1,
            map_md5: String::new(),
            game_mode: GameMode::Keys4,
            content: String::new(),
            modifiers: 0,
        }
    }
}
