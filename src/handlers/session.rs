//! Keepalive, status, anti-cheat and statistics packets.

use crate::error::HandlerResult;
use crate::state::{Hub, UserSession};
use rhythm_proto::{ClientStatus, GameMode, ServerPacket};
use std::sync::Arc;
use tracing::{debug, info};

pub(super) async fn ping(session: &UserSession) -> HandlerResult {
    session.send(&ServerPacket::Pong).await;
    Ok(())
}

/// Store the new status and tell every online user about it.
pub(super) async fn status(
    hub: &Hub,
    session: &Arc<UserSession>,
    status: ClientStatus,
) -> HandlerResult {
    if !session.set_client_status(status.clone()).await {
        debug!(user_id = session.id(), "Status changed during teardown");
        super::lifecycle::resync_status(hub, session.id()).await;
        return Ok(());
    }

    let update = ServerPacket::StatusUpdate {
        user_id: session.id(),
        status,
    };
    let delivered = hub.broadcaster.send_to_many(&update, &hub.sessions.all()).await;
    debug!(user_id = session.id(), delivered, "Status broadcast");
    Ok(())
}

/// Keep the latest anti-cheat report. Only changes are logged.
pub(super) fn processes(session: &UserSession, list: Vec<String>) {
    if !list.is_empty() && session.last_detected_processes() != list {
        info!(user_id = session.id(), processes = ?list, "Client reported suspicious processes");
    }
    session.set_last_detected_processes(list);
}

/// Reload statistics from the database and send them back.
///
/// A failed reload leaves the previous statistics in place and reports the
/// error to the client.
pub(super) async fn stats(hub: &Hub, session: &UserSession) -> HandlerResult {
    session.refresh_stats(&hub.db).await?;

    let loaded = session.stats();
    let stats = GameMode::ALL
        .iter()
        .filter_map(|mode| loaded.get(mode).cloned())
        .collect();
    session.send(&ServerPacket::Stats { stats }).await;
    Ok(())
}
