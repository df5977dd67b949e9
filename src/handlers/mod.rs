//! Inbound packet handlers.
//!
//! The connection loop decodes a frame and hands the packet to [`dispatch`].
//! Handlers mutate sessions and rooms through their own locked operations
//! and then notify the affected users. Errors come back to the loop, which
//! turns them into `error` packets.

mod lifecycle;
mod room;
mod session;

pub use lifecycle::{complete_login, disconnect, shutdown};

use crate::error::{HandlerError, HandlerResult};
use crate::state::{Hub, UserSession};
use crate::telemetry::{PacketTimer, spans};
use rhythm_proto::ClientPacket;
use std::sync::Arc;
use tracing::{Instrument, debug};

/// Route one packet from a logged-in session to its handler.
pub async fn dispatch(
    hub: &Hub,
    session: &Arc<UserSession>,
    packet: ClientPacket,
) -> HandlerResult {
    let name = packet.name();
    let _timer = PacketTimer::new(name);

    let result = route(hub, session, packet)
        .instrument(spans::packet(name, session.id()))
        .await;

    if let Err(ref e) = result {
        crate::metrics::record_packet_error(name, e.error_code());
        debug!(packet = name, user_id = session.id(), error = %e, "Packet error");
    }
    result
}

async fn route(hub: &Hub, session: &Arc<UserSession>, packet: ClientPacket) -> HandlerResult {
    match packet {
        ClientPacket::Login { .. } => Err(HandlerError::AlreadyLoggedIn),
        ClientPacket::Ping => session::ping(session).await,
        ClientPacket::Pong => {
            session.touch_pong();
            Ok(())
        }
        ClientPacket::Status { status } => session::status(hub, session, status).await,
        ClientPacket::Processes { list } => {
            session::processes(session, list);
            Ok(())
        }
        ClientPacket::StatsRequest => session::stats(hub, session).await,
        ClientPacket::RoomCreate {
            name,
            password,
            max_players,
            map,
        } => room::create(hub, session, name, password, max_players, map).await,
        ClientPacket::RoomJoin { id, password } => {
            room::join(hub, session, id, password.as_deref()).await
        }
        ClientPacket::RoomLeave => room::leave(hub, session).await,
        ClientPacket::RoomReady { ready } => room::ready(hub, session, ready).await,
        ClientPacket::RoomHasMap { has_map } => room::has_map(hub, session, has_map).await,
        ClientPacket::RoomMods { modifiers } => room::mods(hub, session, modifiers).await,
        ClientPacket::RoomSettings { patch } => room::settings(hub, session, patch).await,
        ClientPacket::RoomMap { map } => room::change_map(hub, session, map).await,
        ClientPacket::RoomStart => room::start(hub, session).await,
        ClientPacket::RoomFinish { winner } => room::finish(hub, session, winner).await,
        ClientPacket::RoomHost { user_id } => room::transfer_host(hub, session, user_id).await,
        ClientPacket::RoomClose => room::close(hub, session).await,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{hub, last, login};
    use super::*;
    use rhythm_proto::ServerPacket;

    #[tokio::test]
    async fn second_login_packet_is_refused() {
        let (_, hub) = hub().await;
        let (session, _) = login(&hub, 1).await;

        let result = dispatch(
            &hub,
            &session,
            ClientPacket::Login {
                username: "again".into(),
                password: "pw".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(HandlerError::AlreadyLoggedIn)));
    }

    #[tokio::test]
    async fn ping_is_answered_and_pong_recorded() {
        let (_, hub) = hub().await;
        let (session, conn) = login(&hub, 1).await;

        dispatch(&hub, &session, ClientPacket::Ping).await.unwrap();
        assert_eq!(last(&conn), ServerPacket::Pong);

        let before = session.last_pong_timestamp();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        dispatch(&hub, &session, ClientPacket::Pong).await.unwrap();
        assert!(session.last_pong_timestamp() > before);
    }
}
