//! Field encoding for cache hash records.
//!
//! Field names are short because every other service reading the cache
//! decodes them by name. Booleans are `"0"`/`"1"`; numbers are decimal text.

use crate::state::RoomSettings;
use rhythm_proto::{ClientStatus, UserId};

/// Field list for one hash record.
pub type Fields = Vec<(&'static str, String)>;

/// One room member's row, copied out of the room under its lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
    pub user_id: UserId,
    pub username: String,
    pub steam_id: String,
    pub avatar_url: String,
    pub country: String,
    pub wins: u32,
    pub modifiers: i64,
    pub ready: bool,
    pub has_map: bool,
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// `server:user_status:<id>` fields.
pub fn status_fields(status: &ClientStatus) -> Fields {
    vec![
        ("s", status.status.as_u8().to_string()),
        ("mid", status.map_id.to_string()),
        ("md5", status.map_md5.clone()),
        ("gm", status.game_mode.as_i32().to_string()),
        ("c", status.content.clone()),
        ("m", status.modifiers.to_string()),
    ]
}

/// `server:multiplayer:<roomId>` fields.
pub fn settings_fields(settings: &RoomSettings, has_password: bool) -> Fields {
    vec![
        ("n", settings.name.clone()),
        ("pw", flag(has_password)),
        ("mp", settings.max_players.to_string()),
        ("md5", settings.map.md5.clone()),
        ("mid", settings.map.id.to_string()),
        ("msid", settings.map.mapset_id.to_string()),
        ("map", settings.map.name.clone()),
        ("host", settings.host_id.to_string()),
        ("r", settings.ruleset.as_u8().to_string()),
        ("hr", flag(settings.host_rotation)),
        ("gm", settings.map.game_mode.as_i32().to_string()),
        // f64 Display is the shortest text that parses back to the same value.
        ("d", settings.map.difficulty_rating.to_string()),
        ("inp", flag(settings.in_progress)),
        ("m", settings.global_modifiers.to_string()),
        ("fm", settings.free_mod.as_u8().to_string()),
        ("trn", flag(settings.tournament)),
    ]
}

/// `server:multiplayer:<roomId>:player:<userId>` fields.
pub fn player_fields(player: &PlayerRecord) -> Fields {
    vec![
        ("id", player.user_id.to_string()),
        ("u", player.username.clone()),
        ("sid", player.steam_id.clone()),
        ("a", player.avatar_url.clone()),
        ("c", player.country.clone()),
        ("w", player.wins.to_string()),
        ("m", player.modifiers.to_string()),
        ("r", flag(player.ready)),
        ("hm", flag(player.has_map)),
    ]
}
