//! Multiplayer room.
//!
//! All room state sits behind one mutex. Every operation validates and
//! mutates under the lock, copies out the records the cache needs, releases
//! the lock, and only then writes the cache.
//!
//! Writes from concurrent operations can land in any order, including after
//! a leave or close already deleted the record. Each write is therefore
//! followed by a settle step that re-reads the room and rewrites or deletes
//! the record until the cache agrees with what the room holds.

use crate::cache::CacheSync;
use crate::cache::records::PlayerRecord;
use crate::db::UserInfo;
use crate::error::RoomError;
use parking_lot::Mutex;
use rhythm_proto::{
    FreeModType, MapInfo, RoomId, RoomPlayer, RoomSnapshot, Ruleset, SettingsPatch, UserId,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Smallest allowed member cap.
pub const MIN_PLAYERS: u8 = 2;
/// Largest allowed member cap.
pub const MAX_PLAYERS: u8 = 16;

/// Room settings, mirrored field for field into the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSettings {
    pub name: String,
    pub max_players: u8,
    pub map: MapInfo,
    pub host_id: UserId,
    pub ruleset: Ruleset,
    pub host_rotation: bool,
    pub in_progress: bool,
    pub global_modifiers: i64,
    pub free_mod: FreeModType,
    pub tournament: bool,
}

impl RoomSettings {
    pub fn new(name: String, max_players: u8, map: MapInfo, host_id: UserId) -> Self {
        Self {
            name,
            max_players,
            map,
            host_id,
            ruleset: Ruleset::default(),
            host_rotation: false,
            in_progress: false,
            global_modifiers: 0,
            free_mod: FreeModType::default(),
            tournament: false,
        }
    }
}

/// Check a room name and member cap.
pub fn validate_settings(name: &str, max_players: u8, members: usize) -> Result<(), RoomError> {
    if name.trim().is_empty() {
        return Err(RoomError::InvalidSettings("name must not be empty".to_string()));
    }
    if !(MIN_PLAYERS..=MAX_PLAYERS).contains(&max_players) {
        return Err(RoomError::InvalidSettings(format!(
            "max players must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
        )));
    }
    if usize::from(max_players) < members {
        return Err(RoomError::InvalidSettings(
            "max players is below the current member count".to_string(),
        ));
    }
    Ok(())
}

/// The part of a user's profile a room keeps for its cache rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerProfile {
    pub user_id: UserId,
    pub username: String,
    pub steam_id: String,
    pub avatar_url: String,
    pub country: String,
}

impl From<&UserInfo> for PlayerProfile {
    fn from(info: &UserInfo) -> Self {
        Self {
            user_id: info.id,
            username: info.username.clone(),
            steam_id: info.steam_id.clone(),
            avatar_url: info.avatar_url.clone(),
            country: info.country.clone(),
        }
    }
}

/// Result of a member leaving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The user was not in the room.
    NotMember,
    /// The user left; nothing else changed.
    Left,
    /// The host left and the role passed to this member.
    HostTransferred(UserId),
    /// The last member left. The room is closed and its records are gone.
    Emptied,
}

struct PlayerState {
    profile: PlayerProfile,
    modifiers: i64,
    wins: u32,
}

struct RoomState {
    settings: RoomSettings,
    password: Option<String>,
    /// Member ids in join order.
    members: Vec<UserId>,
    players: HashMap<UserId, PlayerState>,
    ready: HashSet<UserId>,
    without_map: HashSet<UserId>,
    closed: bool,
}

impl RoomState {
    fn ensure_open(&self) -> Result<(), RoomError> {
        if self.closed {
            Err(RoomError::NoSuchRoom)
        } else {
            Ok(())
        }
    }

    fn ensure_member(&self, user_id: UserId) -> Result<(), RoomError> {
        self.ensure_open()?;
        if self.players.contains_key(&user_id) {
            Ok(())
        } else {
            Err(RoomError::NotMember(user_id))
        }
    }

    fn ensure_host(&self, by: UserId) -> Result<(), RoomError> {
        self.ensure_open()?;
        if self.settings.host_id == by {
            Ok(())
        } else {
            Err(RoomError::NotHost)
        }
    }

    fn record(&self, user_id: UserId) -> Option<PlayerRecord> {
        let player = self.players.get(&user_id)?;
        Some(PlayerRecord {
            user_id,
            username: player.profile.username.clone(),
            steam_id: player.profile.steam_id.clone(),
            avatar_url: player.profile.avatar_url.clone(),
            country: player.profile.country.clone(),
            wins: player.wins,
            modifiers: player.modifiers,
            ready: self.ready.contains(&user_id),
            has_map: !self.without_map.contains(&user_id),
        })
    }

    /// What the cache should hold for `user_id` right now.
    fn live_record(&self, user_id: UserId) -> Option<PlayerRecord> {
        if self.closed {
            None
        } else {
            self.record(user_id)
        }
    }

    /// What the cache should hold for the settings record right now.
    fn live_settings(&self) -> Option<(RoomSettings, bool)> {
        (!self.closed).then(|| (self.settings.clone(), self.password.is_some()))
    }

    fn member_record(&self, user_id: UserId) -> Result<PlayerRecord, RoomError> {
        self.record(user_id).ok_or(RoomError::NotMember(user_id))
    }

    fn records(&self) -> Vec<PlayerRecord> {
        self.members.iter().filter_map(|&id| self.record(id)).collect()
    }

    /// Member after `user_id` in join order, wrapping around.
    fn next_member_after(&self, user_id: UserId) -> Option<UserId> {
        let pos = self.members.iter().position(|&id| id == user_id)?;
        self.members
            .iter()
            .cycle()
            .skip(pos + 1)
            .take(self.members.len())
            .copied()
            .find(|&id| id != user_id)
    }
}

/// One multiplayer match.
pub struct GameRoom {
    id: RoomId,
    cache: CacheSync,
    state: Mutex<RoomState>,
}

impl GameRoom {
    /// Create a room with `host` as its only member.
    ///
    /// Nothing is written to the cache until [`GameRoom::publish`].
    pub fn new(
        id: RoomId,
        mut settings: RoomSettings,
        password: Option<String>,
        host: PlayerProfile,
        cache: CacheSync,
    ) -> Self {
        settings.host_id = host.user_id;
        let members = vec![host.user_id];
        let mut players = HashMap::new();
        players.insert(
            host.user_id,
            PlayerState {
                profile: host,
                modifiers: 0,
                wins: 0,
            },
        );
        Self {
            id,
            cache,
            state: Mutex::new(RoomState {
                settings,
                password: password.filter(|p| !p.is_empty()),
                members,
                players,
                ready: HashSet::new(),
                without_map: HashSet::new(),
                closed: false,
            }),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Member ids in join order.
    pub fn members(&self) -> Vec<UserId> {
        self.state.lock().members.clone()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let state = self.state.lock();
        let s = &state.settings;
        let players = state
            .records()
            .into_iter()
            .map(|r| RoomPlayer {
                user_id: r.user_id,
                username: r.username,
                ready: r.ready,
                has_map: r.has_map,
                modifiers: r.modifiers,
                wins: r.wins,
            })
            .collect();
        RoomSnapshot {
            id: self.id,
            name: s.name.clone(),
            has_password: state.password.is_some(),
            max_players: s.max_players,
            map: s.map.clone(),
            host_id: s.host_id,
            ruleset: s.ruleset,
            host_rotation: s.host_rotation,
            in_progress: s.in_progress,
            global_modifiers: s.global_modifiers,
            free_mod: s.free_mod,
            tournament: s.tournament,
            players,
        }
    }

    async fn write_settings(&self, settings: RoomSettings, has_password: bool) {
        self.cache
            .publish_room_settings(self.id, &settings, has_password)
            .await;
        self.settle_settings(Some((settings, has_password))).await;
    }

    async fn write_player(&self, record: PlayerRecord) {
        self.cache.publish_player(self.id, &record).await;
        self.settle_player(record.user_id, Some(record)).await;
    }

    /// Repeat the settings write or delete until the cache matches the room.
    ///
    /// `written` is what this task last put in the cache. Each round that
    /// finds the room changed performs one more write, so this ends as soon
    /// as no other task is mutating the room.
    async fn settle_settings(&self, mut written: Option<(RoomSettings, bool)>) {
        loop {
            let current = self.state.lock().live_settings();
            if current == written {
                return;
            }
            match &current {
                Some((settings, has_password)) => {
                    self.cache
                        .publish_room_settings(self.id, settings, *has_password)
                        .await
                }
                None => self.cache.remove_room(self.id, &[]).await,
            }
            written = current;
        }
    }

    /// Same as [`Self::settle_settings`] for one player's record.
    async fn settle_player(&self, user_id: UserId, mut written: Option<PlayerRecord>) {
        loop {
            let current = self.state.lock().live_record(user_id);
            if current == written {
                return;
            }
            match &current {
                Some(record) => self.cache.publish_player(self.id, record).await,
                None => {
                    debug!(room_id = self.id, user_id, "Dropping late player record");
                    self.cache.remove_player(self.id, user_id).await
                }
            }
            written = current;
        }
    }

    /// Write the settings record and every player record.
    pub async fn publish(&self) {
        let (settings, has_password, records) = {
            let state = self.state.lock();
            (
                state.settings.clone(),
                state.password.is_some(),
                state.records(),
            )
        };
        self.write_settings(settings, has_password).await;
        for record in records {
            self.write_player(record).await;
        }
    }

    /// Add a member. New players are not ready, have the map, and start with
    /// no modifiers and no wins.
    pub async fn join(
        &self,
        profile: PlayerProfile,
        password: Option<&str>,
    ) -> Result<(), RoomError> {
        let user_id = profile.user_id;
        let record = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            if state.players.contains_key(&user_id) {
                return Err(RoomError::AlreadyMember);
            }
            if let Some(expected) = &state.password
                && password != Some(expected.as_str())
            {
                return Err(RoomError::WrongPassword);
            }
            if state.members.len() >= usize::from(state.settings.max_players) {
                return Err(RoomError::Full);
            }
            state.members.push(user_id);
            state.players.insert(
                user_id,
                PlayerState {
                    profile,
                    modifiers: 0,
                    wins: 0,
                },
            );
            state.member_record(user_id)?
        };
        debug!(room_id = self.id, user_id, "Player joined room");
        self.write_player(record).await;
        Ok(())
    }

    /// Remove a member, passing the host role on if needed.
    pub async fn leave(&self, user_id: UserId) -> LeaveOutcome {
        let (outcome, settings) = {
            let mut state = self.state.lock();
            if state.closed || !state.players.contains_key(&user_id) {
                return LeaveOutcome::NotMember;
            }
            let successor = state.next_member_after(user_id);
            state.members.retain(|&id| id != user_id);
            state.players.remove(&user_id);
            state.ready.remove(&user_id);
            state.without_map.remove(&user_id);

            if state.members.is_empty() {
                state.closed = true;
                (LeaveOutcome::Emptied, None)
            } else if state.settings.host_id == user_id {
                // Non-empty room: the leaver had a successor.
                let new_host = successor.unwrap_or(state.members[0]);
                state.settings.host_id = new_host;
                (
                    LeaveOutcome::HostTransferred(new_host),
                    Some((state.settings.clone(), state.password.is_some())),
                )
            } else {
                (LeaveOutcome::Left, None)
            }
        };

        debug!(room_id = self.id, user_id, outcome = ?outcome, "Player left room");
        match outcome {
            LeaveOutcome::Emptied => self.cache.remove_room(self.id, &[user_id]).await,
            _ => {
                self.cache.remove_player(self.id, user_id).await;
                self.settle_player(user_id, None).await;
                if let Some((settings, has_password)) = settings {
                    self.write_settings(settings, has_password).await;
                }
            }
        }
        outcome
    }

    pub async fn set_ready(&self, user_id: UserId, ready: bool) -> Result<(), RoomError> {
        let record = {
            let mut state = self.state.lock();
            state.ensure_member(user_id)?;
            if ready {
                state.ready.insert(user_id);
            } else {
                state.ready.remove(&user_id);
            }
            state.member_record(user_id)?
        };
        self.write_player(record).await;
        Ok(())
    }

    pub async fn set_has_map(&self, user_id: UserId, has_map: bool) -> Result<(), RoomError> {
        let record = {
            let mut state = self.state.lock();
            state.ensure_member(user_id)?;
            if has_map {
                state.without_map.remove(&user_id);
            } else {
                state.without_map.insert(user_id);
            }
            state.member_record(user_id)?
        };
        self.write_player(record).await;
        Ok(())
    }

    pub async fn set_player_modifiers(
        &self,
        user_id: UserId,
        modifiers: i64,
    ) -> Result<(), RoomError> {
        let record = {
            let mut state = self.state.lock();
            state.ensure_member(user_id)?;
            if let Some(player) = state.players.get_mut(&user_id) {
                player.modifiers = modifiers;
            }
            state.member_record(user_id)?
        };
        self.write_player(record).await;
        Ok(())
    }

    /// Credit a member with a win, returning their new total.
    pub async fn add_win(&self, user_id: UserId) -> Result<u32, RoomError> {
        let record = {
            let mut state = self.state.lock();
            state.ensure_member(user_id)?;
            if let Some(player) = state.players.get_mut(&user_id) {
                player.wins = player.wins.saturating_add(1);
            }
            state.member_record(user_id)?
        };
        let wins = record.wins;
        self.write_player(record).await;
        Ok(wins)
    }

    /// Apply a settings patch (host only). An empty password clears it.
    pub async fn update_settings(&self, by: UserId, patch: SettingsPatch) -> Result<(), RoomError> {
        let (settings, has_password) = {
            let mut state = self.state.lock();
            state.ensure_host(by)?;
            if state.settings.in_progress {
                return Err(RoomError::InProgress);
            }
            let name = patch.name.unwrap_or_else(|| state.settings.name.clone());
            let max_players = patch.max_players.unwrap_or(state.settings.max_players);
            validate_settings(&name, max_players, state.members.len())?;

            let s = &mut state.settings;
            s.name = name;
            s.max_players = max_players;
            if let Some(ruleset) = patch.ruleset {
                s.ruleset = ruleset;
            }
            if let Some(rotation) = patch.host_rotation {
                s.host_rotation = rotation;
            }
            if let Some(mods) = patch.global_modifiers {
                s.global_modifiers = mods;
            }
            if let Some(free_mod) = patch.free_mod {
                s.free_mod = free_mod;
            }
            if let Some(tournament) = patch.tournament {
                s.tournament = tournament;
            }
            if let Some(password) = patch.password {
                state.password = Some(password).filter(|p| !p.is_empty());
            }
            (state.settings.clone(), state.password.is_some())
        };
        self.write_settings(settings, has_password).await;
        Ok(())
    }

    /// Select a new map (host only). Everyone becomes unready and is assumed
    /// to have the map until they report otherwise.
    pub async fn change_map(&self, by: UserId, map: MapInfo) -> Result<(), RoomError> {
        {
            let mut state = self.state.lock();
            state.ensure_host(by)?;
            if state.settings.in_progress {
                return Err(RoomError::InProgress);
            }
            state.settings.map = map;
            state.ready.clear();
            state.without_map.clear();
        }
        self.publish().await;
        Ok(())
    }

    /// Start the match (host only).
    pub async fn start(&self, by: UserId) -> Result<(), RoomError> {
        let (settings, has_password) = {
            let mut state = self.state.lock();
            state.ensure_host(by)?;
            if state.settings.in_progress {
                return Err(RoomError::InProgress);
            }
            state.settings.in_progress = true;
            (state.settings.clone(), state.password.is_some())
        };
        self.write_settings(settings, has_password).await;
        Ok(())
    }

    /// End the match (host only). Clears ready flags and, with host rotation
    /// on, passes the host role to the next member.
    pub async fn finish(&self, by: UserId) -> Result<(), RoomError> {
        {
            let mut state = self.state.lock();
            state.ensure_host(by)?;
            if !state.settings.in_progress {
                return Err(RoomError::NotInProgress);
            }
            state.settings.in_progress = false;
            state.ready.clear();
            if state.settings.host_rotation
                && let Some(next) = state.next_member_after(by)
            {
                state.settings.host_id = next;
            }
        }
        self.publish().await;
        Ok(())
    }

    /// Hand the host role to another member (host only).
    pub async fn transfer_host(&self, by: UserId, to: UserId) -> Result<(), RoomError> {
        let (settings, has_password) = {
            let mut state = self.state.lock();
            state.ensure_host(by)?;
            state.ensure_member(to)?;
            state.settings.host_id = to;
            (state.settings.clone(), state.password.is_some())
        };
        self.write_settings(settings, has_password).await;
        Ok(())
    }

    /// Close the room and delete all of its records.
    ///
    /// `by` must be the host; `None` closes unconditionally. Returns the
    /// members at the time of closing.
    pub async fn close(&self, by: Option<UserId>) -> Result<Vec<UserId>, RoomError> {
        let members = {
            let mut state = self.state.lock();
            match by {
                Some(by) => state.ensure_host(by)?,
                None => state.ensure_open()?,
            }
            state.closed = true;
            state.players.clear();
            state.ready.clear();
            state.without_map.clear();
            std::mem::take(&mut state.members)
        };
        self.cache.remove_room(self.id, &members).await;
        Ok(members)
    }
}
