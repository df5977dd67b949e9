//! Per-connection user session.
//!
//! Identity and profile are fixed at login. Everything that changes while the
//! user is online lives in [`SessionState`] behind a single mutex, which is
//! only ever held for the duration of one read or write and never across an
//! `.await`.

use crate::cache::CacheSync;
use crate::db::{DbError, StatsSource, UserInfo};
use crate::network::{Broadcaster, Connection};
use parking_lot::Mutex;
use rhythm_proto::{ClientStatus, GameMode, PacketUser, ServerPacket, UserId, UserStats};
use std::collections::HashMap;
use std::sync::Arc;

/// Current time in unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct SessionState {
    last_ping: i64,
    last_pong: i64,
    processes: Vec<String>,
    status: ClientStatus,
    stats: HashMap<GameMode, UserStats>,
    /// Set once the session is deregistered. Its cache records then belong
    /// to whichever session owns the user id next, or to nobody.
    retired: bool,
}

/// One authenticated, connected user.
pub struct UserSession {
    id: UserId,
    token: String,
    info: UserInfo,
    conn: Arc<dyn Connection>,
    cache: CacheSync,
    broadcaster: Broadcaster,
    state: Mutex<SessionState>,
}

impl UserSession {
    pub fn new(
        info: UserInfo,
        token: String,
        conn: Arc<dyn Connection>,
        cache: CacheSync,
        broadcaster: Broadcaster,
    ) -> Self {
        let now = now_ms();
        Self {
            id: info.id,
            token,
            info,
            conn,
            cache,
            broadcaster,
            state: Mutex::new(SessionState {
                last_ping: now,
                last_pong: now,
                processes: Vec::new(),
                status: ClientStatus::default(),
                stats: HashMap::new(),
                retired: false,
            }),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn info(&self) -> &UserInfo {
        &self.info
    }

    pub fn connection(&self) -> &dyn Connection {
        self.conn.as_ref()
    }

    pub fn last_ping_timestamp(&self) -> i64 {
        self.state.lock().last_ping
    }

    pub fn touch_ping(&self) {
        self.state.lock().last_ping = now_ms();
    }

    pub fn last_pong_timestamp(&self) -> i64 {
        self.state.lock().last_pong
    }

    pub fn touch_pong(&self) {
        self.state.lock().last_pong = now_ms();
    }

    pub fn last_detected_processes(&self) -> Vec<String> {
        self.state.lock().processes.clone()
    }

    pub fn set_last_detected_processes(&self, processes: Vec<String>) {
        self.state.lock().processes = processes;
    }

    pub fn client_status(&self) -> ClientStatus {
        self.state.lock().status.clone()
    }

    /// Replace the client status, then mirror it to the cache.
    ///
    /// The local update always succeeds; a cache failure is only logged. A
    /// concurrent change that overtook this write is written again.
    ///
    /// Returns `false` if the session was retired before the write settled.
    /// The record may then belong to a replacement session or to nobody, and
    /// the caller has to reconcile it.
    pub async fn set_client_status(&self, status: ClientStatus) -> bool {
        {
            let mut state = self.state.lock();
            state.status = status.clone();
            if state.retired {
                return false;
            }
        }

        let mut written = status;
        loop {
            self.cache.publish_status(self.id, &written).await;
            written = {
                let state = self.state.lock();
                if state.retired {
                    return false;
                }
                if state.status == written {
                    return true;
                }
                state.status.clone()
            };
        }
    }

    /// Mark the session as torn down. Status changes after this stay local.
    pub fn retire(&self) {
        self.state.lock().retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }

    pub fn stats(&self) -> HashMap<GameMode, UserStats> {
        self.state.lock().stats.clone()
    }

    /// Reload statistics for every mode.
    ///
    /// Loads run without the lock held. The cached map is swapped only after
    /// every mode loaded; on any failure it is left exactly as it was.
    pub async fn refresh_stats(&self, source: &dyn StatsSource) -> Result<(), DbError> {
        let mut fresh = HashMap::with_capacity(GameMode::ALL.len());
        for mode in GameMode::ALL {
            let stats = source.user_stats(self.id, &self.info.country, mode).await?;
            fresh.insert(mode, stats);
        }
        self.state.lock().stats = fresh;
        Ok(())
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted_at(now_ms())
    }

    /// Whether the mute is still running at `now` (unix ms).
    pub fn is_muted_at(&self, now: i64) -> bool {
        self.info.mute_end_time > now
    }

    pub fn to_packet(&self) -> PacketUser {
        self.info.to_packet()
    }

    /// Send one packet to this user.
    pub async fn send(&self, packet: &ServerPacket) -> bool {
        self.broadcaster.send_to(packet, self).await
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::state::testing::{profile, session_in};
    use async_trait::async_trait;
    use rhythm_proto::ClientStatusKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeStats {
        fail_on: Option<GameMode>,
        rating: f64,
        calls: AtomicUsize,
    }

    impl FakeStats {
        fn new(rating: f64, fail_on: Option<GameMode>) -> Self {
            Self {
                fail_on,
                rating,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StatsSource for FakeStats {
        async fn user_stats(
            &self,
            _user_id: UserId,
            _country: &str,
            mode: GameMode,
        ) -> Result<UserStats, DbError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(mode) {
                return Err(DbError::Sqlx(sqlx::Error::RowNotFound));
            }
            Ok(UserStats {
                mode,
                total_score: 1,
                ranked_score: 1,
                overall_accuracy: 99.0,
                overall_performance_rating: self.rating,
                play_count: 1,
                global_rank: 1,
                country_rank: 1,
            })
        }
    }

    fn playing(map_id: i32) -> ClientStatus {
        ClientStatus {
            status: ClientStatusKind::Playing,
            map_id,
            map_md5: format!("md5-{map_id}"),
            game_mode: GameMode::Keys7,
            content: format!("map {map_id}"),
            modifiers: i64::from(map_id),
        }
    }

    #[tokio::test]
    async fn status_change_is_mirrored_to_cache() {
        let store = Arc::new(MemoryStore::new());
        let session = session_in(5, store.clone());

        assert!(session.set_client_status(playing(12)).await);

        assert_eq!(session.client_status(), playing(12));
        assert_eq!(store.field("server:user_status:5", "mid").as_deref(), Some("12"));
        assert_eq!(store.field("server:user_status:5", "s").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn retired_session_keeps_status_local() {
        let store = Arc::new(MemoryStore::new());
        let session = session_in(5, store.clone());
        session.retire();

        assert!(!session.set_client_status(playing(4)).await);
        assert_eq!(session.client_status(), playing(4));
        assert!(!store.contains("server:user_status:5"));
    }

    #[tokio::test]
    async fn status_survives_cache_failure() {
        let session = session_in(5, Arc::new(crate::cache::testing::FailingStore));
        session.set_client_status(playing(3)).await;
        assert_eq!(session.client_status().map_id, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_status_writes_never_tear() {
        let session = Arc::new(session_in(1, Arc::new(MemoryStore::new())));

        let mut tasks = Vec::new();
        for map_id in 0..8 {
            let session = Arc::clone(&session);
            tasks.push(tokio::spawn(async move {
                for _ in 0..100 {
                    session.set_client_status(playing(map_id)).await;
                    let seen = session.client_status();
                    // Every field must come from the same write.
                    assert_eq!(seen, playing(seen.map_id));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn refresh_stats_loads_every_mode() {
        let session = session_in(1, Arc::new(MemoryStore::new()));
        let source = FakeStats::new(10.0, None);

        session.refresh_stats(&source).await.unwrap();

        let stats = session.stats();
        assert_eq!(stats.len(), GameMode::ALL.len());
        assert_eq!(source.calls.load(Ordering::SeqCst), GameMode::ALL.len());
    }

    #[tokio::test]
    async fn refresh_stats_is_all_or_nothing() {
        let session = session_in(1, Arc::new(MemoryStore::new()));
        session
            .refresh_stats(&FakeStats::new(10.0, None))
            .await
            .unwrap();

        let result = session
            .refresh_stats(&FakeStats::new(99.0, Some(GameMode::Keys6)))
            .await;

        assert!(result.is_err());
        let stats = session.stats();
        assert_eq!(stats.len(), GameMode::ALL.len());
        assert!(stats.values().all(|s| s.overall_performance_rating == 10.0));
    }

    #[test]
    fn mute_boundary_is_exclusive() {
        let mut info = profile(1);
        info.mute_end_time = 1_000;
        let session = crate::state::testing::session_for(info, Arc::new(MemoryStore::new()));

        assert!(session.is_muted_at(999));
        assert!(!session.is_muted_at(1_000));
        assert!(!session.is_muted_at(1_001));
    }

    #[test]
    fn never_muted_by_default() {
        let session = session_in(1, Arc::new(MemoryStore::new()));
        assert!(!session.is_muted());
    }

    #[test]
    fn timestamps_and_processes() {
        let session = session_in(1, Arc::new(MemoryStore::new()));
        let created = session.last_pong_timestamp();
        assert_eq!(session.last_ping_timestamp(), created);

        session.touch_ping();
        session.touch_pong();
        assert!(session.last_pong_timestamp() >= created);
        assert!(session.last_ping_timestamp() >= created);

        session.set_last_detected_processes(vec!["cheat.exe".into()]);
        assert_eq!(session.last_detected_processes(), vec!["cheat.exe".to_string()]);
    }

    #[tokio::test]
    async fn close_closes_connection() {
        let conn = Arc::new(crate::network::testing::RecordingConnection::default());
        let session = crate::state::testing::session_with(1, conn.clone());
        session.close().await;
        assert!(conn.is_closed());
    }
}
