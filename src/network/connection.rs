//! Per-connection event loop.
//!
//! A connection first has to log in with its first text frame. After that
//! the loop reads packets and dispatches them while a keepalive timer pings
//! the client and drops it once pongs stop arriving. Every way out of the
//! loop ends in the same teardown.

use super::broadcast::PacketCodec;
use super::flood::PacketLimiter;
use super::transport::Connection;
use crate::error::{HandlerError, LoginError};
use crate::handlers;
use crate::state::{Hub, UserSession, now_ms};
use futures_util::{Stream, StreamExt};
use rhythm_proto::{ClientPacket, ServerPacket};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};

/// Next text frame, or `None` once the peer is gone.
async fn next_text<S>(stream: &mut S) -> Option<String>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) => return None,
            Ok(other) => trace!(kind = ?other, "Ignoring non-text frame"),
            Err(e) => {
                debug!(error = %e, "WebSocket read failed");
                return None;
            }
        }
    }
    None
}

/// Authenticate the first frame and register the resulting session.
pub(super) async fn login<S>(
    hub: &Hub,
    stream: &mut S,
    conn: Arc<dyn Connection>,
) -> Result<Arc<UserSession>, LoginError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let frame = tokio::time::timeout(hub.timeouts.login(), next_text(stream))
        .await
        .map_err(|_| LoginError::Timeout)?
        .ok_or(LoginError::Closed)?;

    let ClientPacket::Login { username, password } = ClientPacket::decode(&frame)? else {
        return Err(LoginError::NotLogin);
    };
    let info = hub.db.users().authenticate(&username, &password).await?;
    Ok(handlers::complete_login(hub, info, conn).await?)
}

/// Tell a client why its login failed and hang up.
pub(super) async fn reject(hub: &Hub, conn: &dyn Connection, err: &LoginError) {
    crate::metrics::record_login_failure(err.reason());
    if let Some(reply) = err.to_reply() {
        let codec = PacketCodec::new(hub.timeouts.write());
        let written = match PacketCodec::encode(&reply) {
            Ok(frame) => codec.write(conn, frame).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            debug!(error = %e, "Failed to send login rejection");
        }
    }
    conn.close().await;
}

fn pong_overdue(last_pong: i64, now: i64, timeout: Duration) -> bool {
    now.saturating_sub(last_pong) > i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX)
}

/// Serve a logged-in session until the client leaves, then tear it down.
pub(super) async fn run<S>(hub: &Hub, session: &Arc<UserSession>, mut stream: S)
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let limiter = PacketLimiter::new(hub.flood.rate, hub.flood.burst);
    let mut violations: u8 = 0;
    let mut keepalive = tokio::time::interval(hub.timeouts.ping_interval());
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    keepalive.tick().await;

    let reason = loop {
        tokio::select! {
            frame = next_text(&mut stream) => {
                let Some(text) = frame else {
                    break "closed";
                };

                if !limiter.check() {
                    violations = violations.saturating_add(1);
                    crate::metrics::record_rate_limited();
                    session.send(&HandlerError::Flooding.to_reply()).await;
                    if violations >= hub.flood.max_violations {
                        warn!(user_id = session.id(), violations, "Disconnecting flooding client");
                        break "flooding";
                    }
                    continue;
                }
                violations = 0;

                let result = match ClientPacket::decode(&text) {
                    Ok(packet) => handlers::dispatch(hub, session, packet).await,
                    Err(e) => {
                        crate::metrics::record_packet_error("undecodable", "protocol_error");
                        Err(HandlerError::from(e))
                    }
                };
                if let Err(e) = result {
                    session.send(&e.to_reply()).await;
                }
            }
            _ = keepalive.tick() => {
                if hub.sessions.get_by_token(session.token()).is_none() {
                    break "replaced";
                }
                let now = now_ms();
                let last_pong = session.last_pong_timestamp();
                if pong_overdue(last_pong, now, hub.timeouts.pong_timeout()) {
                    debug!(
                        user_id = session.id(),
                        last_ping = session.last_ping_timestamp(),
                        last_pong,
                        "Pong overdue"
                    );
                    break "ping_timeout";
                }
                session.touch_ping();
                session.send(&ServerPacket::Ping { timestamp: now }).await;
            }
        }
    };

    info!(user_id = session.id(), reason, "Connection loop ended");
    handlers::disconnect(hub, session.token()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSync, MemoryStore};
    use crate::config::{FloodConfig, TimeoutsConfig};
    use crate::db::{Database, DbError, testing::insert_user};
    use crate::handlers::testing::{hub, login as login_as};
    use crate::network::testing::RecordingConnection;
    use futures_util::stream;

    fn text(frame: &str) -> Result<Message, WsError> {
        Ok(Message::Text(frame.to_string()))
    }

    fn frames(
        list: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(list)
    }

    #[tokio::test]
    async fn login_with_valid_credentials_creates_session() {
        let (store, hub) = hub().await;
        let id = insert_user(hub.db.pool(), "alice", "pw", "NL").await;
        let conn = Arc::new(RecordingConnection::default());

        let mut input = frames(vec![
            Ok(Message::Ping(Vec::new())),
            text(r#"{"t":"login","username":"alice","password":"pw"}"#),
        ]);
        let session = login(&hub, &mut input, conn.clone()).await.unwrap();

        assert_eq!(session.id(), id);
        assert!(store.contains(&format!("server:session:{}", session.token())));
        assert!(matches!(
            conn.packets().first(),
            Some(ServerPacket::Welcome { user, .. }) if user.username == "alice"
        ));
    }

    #[tokio::test]
    async fn login_failures_are_classified() {
        let (_, hub) = hub().await;
        insert_user(hub.db.pool(), "bob", "right", "US").await;
        let conn: Arc<dyn Connection> = Arc::new(RecordingConnection::default());

        let mut wrong = frames(vec![text(r#"{"t":"login","username":"bob","password":"wrong"}"#)]);
        assert!(matches!(
            login(&hub, &mut wrong, Arc::clone(&conn)).await,
            Err(LoginError::Db(DbError::InvalidCredentials))
        ));

        let mut not_login = frames(vec![text(r#"{"t":"ping"}"#)]);
        assert!(matches!(
            login(&hub, &mut not_login, Arc::clone(&conn)).await,
            Err(LoginError::NotLogin)
        ));

        let mut garbage = frames(vec![text("hello")]);
        assert!(matches!(
            login(&hub, &mut garbage, Arc::clone(&conn)).await,
            Err(LoginError::Protocol(_))
        ));

        let mut closed = frames(vec![Ok(Message::Close(None))]);
        assert!(matches!(
            login(&hub, &mut closed, Arc::clone(&conn)).await,
            Err(LoginError::Closed)
        ));
        assert_eq!(hub.sessions.count(), 0);
    }

    #[tokio::test]
    async fn reject_replies_then_closes() {
        let (_, hub) = hub().await;
        let conn = RecordingConnection::default();

        reject(&hub, &conn, &LoginError::Db(DbError::InvalidCredentials)).await;

        assert_eq!(
            conn.packets(),
            vec![ServerPacket::Error {
                message: "invalid username or password".to_string()
            }]
        );
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn loop_dispatches_then_tears_down_on_close() {
        let (store, hub) = hub().await;
        let (session, conn) = login_as(&hub, 1).await;

        let input = frames(vec![
            text(r#"{"t":"ping"}"#),
            text("{not json"),
            text(r#"{"t":"pong"}"#),
        ]);
        run(&hub, &session, input).await;

        let packets = conn.packets();
        assert!(packets.contains(&ServerPacket::Pong));
        assert!(packets.iter().any(|p| matches!(
            p,
            ServerPacket::Error { message } if message.starts_with("protocol error")
        )));
        assert!(hub.sessions.get_by_id(1).is_none());
        assert!(!store.contains("server:user_status:1"));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn flooding_client_is_disconnected() {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(
            Database::new(":memory:").await.unwrap(),
            CacheSync::new(store),
            TimeoutsConfig::default(),
            FloodConfig {
                rate: 1,
                burst: 1,
                max_violations: 2,
            },
        );
        let (session, conn) = login_as(&hub, 1).await;
        let before = conn.packets().len();

        let ping = r#"{"t":"ping"}"#;
        run(&hub, &session, frames(vec![text(ping), text(ping), text(ping), text(ping)])).await;

        let slow_down = ServerPacket::Error {
            message: "slow down".to_string(),
        };
        assert_eq!(
            conn.packets()[before..].to_vec(),
            vec![ServerPacket::Pong, slow_down.clone(), slow_down]
        );
        assert!(hub.sessions.get_by_id(1).is_none());
    }

    #[test]
    fn pong_deadline() {
        let timeout = Duration::from_secs(90);
        assert!(!pong_overdue(1_000, 91_000, timeout));
        assert!(pong_overdue(1_000, 91_001, timeout));
    }
}
