//! User-facing snapshots sent to clients.

use crate::status::GameMode;
use crate::UserId;
use serde::{Deserialize, Serialize};

/// Public view of a connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketUser {
    /// User id.
    pub id: UserId,
    /// External platform (Steam) id.
    #[serde(rename = "sid")]
    pub steam_id: String,
    /// Display name.
    #[serde(rename = "u")]
    pub username: String,
    /// User group bitmask.
    #[serde(rename = "ug")]
    pub user_groups: i64,
    /// Mute expiry as unix milliseconds.
    #[serde(rename = "m")]
    pub mute_end_time: i64,
    /// Two-letter country code.
    #[serde(rename = "c")]
    pub country: String,
}

/// Statistics for one game mode, as loaded from the persistent store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    /// Mode these statistics belong to.
    pub mode: GameMode,
    /// Sum of all submitted scores.
    pub total_score: i64,
    /// Sum of ranked scores.
    pub ranked_score: i64,
    /// Weighted accuracy percentage.
    pub overall_accuracy: f64,
    /// Weighted performance rating.
    pub overall_performance_rating: f64,
    /// Number of plays.
    pub play_count: i32,
    /// Position on the global leaderboard (1-based).
    pub global_rank: i64,
    /// Position on the country leaderboard (1-based).
    pub country_rank: i64,
}
