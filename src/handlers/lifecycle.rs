//! Session login and teardown.

use super::room::{close_all, leave_current};
use crate::db::UserInfo;
use crate::error::RegistryError;
use crate::network::Connection;
use crate::state::{Hub, UserSession};
use rhythm_proto::{ServerPacket, UserId};
use std::sync::Arc;
use tracing::info;

/// Register an authenticated user and announce them.
///
/// If the user was already online, the older session is torn down first so
/// its cleanup cannot delete the new session's records.
pub async fn complete_login(
    hub: &Hub,
    info: UserInfo,
    conn: Arc<dyn Connection>,
) -> Result<Arc<UserSession>, RegistryError> {
    let session = hub.create_session(info, conn);
    let user_id = session.id();

    if let Some(previous) = hub.sessions.add(Arc::clone(&session))? {
        info!(user_id, "User logged in again, closing previous session");
        previous
            .send(&ServerPacket::Error {
                message: "logged in from another location".to_string(),
            })
            .await;
        disconnect(hub, previous.token()).await;
    }

    hub.cache.publish_session(session.token(), user_id).await;
    hub.cache
        .publish_status(user_id, &session.client_status())
        .await;

    session
        .send(&ServerPacket::Welcome {
            user: session.to_packet(),
            token: session.token().to_string(),
        })
        .await;

    let online = hub.sessions.all();
    let users = online.iter().map(|s| s.to_packet()).collect();
    session.send(&ServerPacket::UsersOnline { users }).await;

    let others: Vec<Arc<UserSession>> = online
        .into_iter()
        .filter(|s| !Arc::ptr_eq(s, &session))
        .collect();
    hub.broadcaster
        .send_to_many(
            &ServerPacket::UserConnected {
                user: session.to_packet(),
            },
            &others,
        )
        .await;

    crate::metrics::record_session_created();
    crate::metrics::set_connected_users(hub.sessions.count());
    info!(user_id, username = %session.info().username, "User logged in");
    Ok(session)
}

/// Tear down the session holding `token`.
///
/// Deregisters it, takes the user out of their room, deletes its cache
/// records and closes the connection. Calling this for a token that is
/// already gone does nothing, so every exit path may call it.
pub async fn disconnect(hub: &Hub, token: &str) {
    let Some(session) = hub.sessions.remove_by_token(token) else {
        return;
    };
    let user_id = session.id();
    session.retire();

    leave_current(hub, user_id).await;
    hub.cache.remove_session(session.token(), user_id).await;
    crate::metrics::set_connected_users(hub.sessions.count());

    // A replacement login keeps the user online.
    if hub.sessions.get_by_id(user_id).is_none() {
        hub.broadcaster
            .send_to_many(&ServerPacket::UserDisconnected { user_id }, &hub.sessions.all())
            .await;
    }

    session.close().await;
    info!(user_id, "User disconnected");
}

/// Make `user_id`'s status record match the session that owns the id now,
/// or delete it if the user is offline.
///
/// Used when a retired session's status write may have landed after its
/// teardown. Each round re-checks the registry after touching the cache, so
/// a login or status change racing with this one is never overwritten.
pub(super) async fn resync_status(hub: &Hub, user_id: UserId) {
    loop {
        match hub.sessions.get_by_id(user_id) {
            Some(current) => {
                let status = current.client_status();
                hub.cache.publish_status(user_id, &status).await;
                if !current.is_retired() && current.client_status() == status {
                    return;
                }
            }
            None => {
                hub.cache.remove_status(user_id).await;
                if hub.sessions.get_by_id(user_id).is_none() {
                    return;
                }
            }
        }
    }
}

/// Close all rooms and disconnect everyone, leaving no records behind.
pub async fn shutdown(hub: &Hub) {
    let online = hub.sessions.count();
    let rooms = hub.rooms.count();
    close_all(hub).await;
    for session in hub.sessions.all() {
        session
            .send(&ServerPacket::Error {
                message: "server is shutting down".to_string(),
            })
            .await;
        disconnect(hub, session.token()).await;
    }
    info!(online, rooms, "All sessions closed");
}
