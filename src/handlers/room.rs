//! Multiplayer room packets.
//!
//! Every handler here acts on the room the sender is currently in, except
//! create and join. After a successful change the new room state is sent to
//! all members.

use crate::error::{HandlerError, HandlerResult, RoomError};
use crate::state::{GameRoom, Hub, LeaveOutcome, NewRoom, PlayerProfile, UserSession};
use rhythm_proto::{MapInfo, RoomId, ServerPacket, SettingsPatch, UserId};
use std::sync::Arc;
use tracing::debug;

fn sessions_of(hub: &Hub, members: &[UserId]) -> Vec<Arc<UserSession>> {
    members
        .iter()
        .filter_map(|&id| hub.sessions.get_by_id(id))
        .collect()
}

async fn notify(hub: &Hub, members: &[UserId], packet: &ServerPacket) -> usize {
    hub.broadcaster
        .send_to_many(packet, &sessions_of(hub, members))
        .await
}

async fn send_update(hub: &Hub, room: &GameRoom) {
    let packet = ServerPacket::RoomUpdate {
        room: room.snapshot(),
    };
    notify(hub, &room.members(), &packet).await;
}

fn current_room(hub: &Hub, session: &UserSession) -> Result<Arc<GameRoom>, HandlerError> {
    hub.rooms
        .room_of(session.id())
        .ok_or(HandlerError::NotInRoom)
}

pub(super) async fn create(
    hub: &Hub,
    session: &UserSession,
    name: String,
    password: Option<String>,
    max_players: u8,
    map: MapInfo,
) -> HandlerResult {
    if session.is_muted() {
        return Err(HandlerError::Muted);
    }
    let request = NewRoom {
        name,
        password: password.filter(|p| !p.is_empty()),
        max_players,
        map,
    };
    let room = hub
        .rooms
        .create(request, PlayerProfile::from(session.info()))
        .await?;
    session
        .send(&ServerPacket::RoomInfo {
            room: room.snapshot(),
        })
        .await;
    Ok(())
}

pub(super) async fn join(
    hub: &Hub,
    session: &UserSession,
    room_id: RoomId,
    password: Option<&str>,
) -> HandlerResult {
    let user_id = session.id();
    let room = hub
        .rooms
        .join(room_id, PlayerProfile::from(session.info()), password)
        .await?;

    session
        .send(&ServerPacket::RoomInfo {
            room: room.snapshot(),
        })
        .await;

    let others: Vec<UserId> = room
        .members()
        .into_iter()
        .filter(|&id| id != user_id)
        .collect();
    notify(hub, &others, &ServerPacket::RoomPlayerJoined { room_id, user_id }).await;
    Ok(())
}

/// Take `user_id` out of its room and tell the remaining members.
///
/// Returns `false` when the user was in no room.
pub(super) async fn leave_current(hub: &Hub, user_id: UserId) -> bool {
    let Some((room, outcome)) = hub.rooms.leave(user_id).await else {
        return false;
    };
    let room_id = room.id();
    match outcome {
        LeaveOutcome::NotMember | LeaveOutcome::Emptied => {}
        LeaveOutcome::Left => {
            notify(hub, &room.members(), &ServerPacket::RoomPlayerLeft { room_id, user_id }).await;
        }
        LeaveOutcome::HostTransferred(new_host) => {
            debug!(room_id, new_host, "Host left, role passed on");
            notify(hub, &room.members(), &ServerPacket::RoomPlayerLeft { room_id, user_id }).await;
            send_update(hub, &room).await;
        }
    }
    true
}

pub(super) async fn leave(hub: &Hub, session: &UserSession) -> HandlerResult {
    if leave_current(hub, session.id()).await {
        Ok(())
    } else {
        Err(HandlerError::NotInRoom)
    }
}

pub(super) async fn ready(hub: &Hub, session: &UserSession, ready: bool) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.set_ready(session.id(), ready).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn has_map(hub: &Hub, session: &UserSession, has_map: bool) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.set_has_map(session.id(), has_map).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn mods(hub: &Hub, session: &UserSession, modifiers: i64) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.set_player_modifiers(session.id(), modifiers).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn settings(
    hub: &Hub,
    session: &UserSession,
    patch: SettingsPatch,
) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.update_settings(session.id(), patch).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn change_map(hub: &Hub, session: &UserSession, map: MapInfo) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.change_map(session.id(), map).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn start(hub: &Hub, session: &UserSession) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.start(session.id()).await?;
    send_update(hub, &room).await;
    Ok(())
}

/// End the match and credit the winner, if one was named.
pub(super) async fn finish(
    hub: &Hub,
    session: &UserSession,
    winner: Option<UserId>,
) -> HandlerResult {
    let room = current_room(hub, session)?;
    if let Some(winner) = winner
        && !room.members().contains(&winner)
    {
        return Err(RoomError::NotMember(winner).into());
    }
    room.finish(session.id()).await?;
    if let Some(winner) = winner {
        match room.add_win(winner).await {
            Ok(wins) => debug!(room_id = room.id(), winner, wins, "Win recorded"),
            // The winner left between the check and the finish.
            Err(e) => debug!(room_id = room.id(), winner, error = %e, "Win not recorded"),
        }
    }
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn transfer_host(hub: &Hub, session: &UserSession, to: UserId) -> HandlerResult {
    let room = current_room(hub, session)?;
    room.transfer_host(session.id(), to).await?;
    send_update(hub, &room).await;
    Ok(())
}

pub(super) async fn close(hub: &Hub, session: &UserSession) -> HandlerResult {
    let room = current_room(hub, session)?;
    let room_id = room.id();
    let members = hub.rooms.remove(room_id, Some(session.id())).await?;
    notify(hub, &members, &ServerPacket::RoomClosed { room_id }).await;
    Ok(())
}

/// Close every open room, telling its members.
pub(super) async fn close_all(hub: &Hub) {
    for room in hub.rooms.all() {
        let room_id = room.id();
        match hub.rooms.remove(room_id, None).await {
            Ok(members) => {
                notify(hub, &members, &ServerPacket::RoomClosed { room_id }).await;
            }
            // Emptied concurrently.
            Err(e) => debug!(room_id, error = %e, "Room already gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserInfo;
    use crate::handlers::dispatch;
    use crate::handlers::testing::{hub, last, login};
    use crate::network::testing::RecordingConnection;
    use crate::state::testing::{map, profile};
    use rhythm_proto::ClientPacket;

    fn create_packet(name: &str, password: Option<&str>) -> ClientPacket {
        ClientPacket::RoomCreate {
            name: name.into(),
            password: password.map(String::from),
            max_players: 8,
            map: map(3),
        }
    }

    async fn open_room(hub: &Hub, host: &Arc<UserSession>) -> RoomId {
        dispatch(hub, host, create_packet("lobby", None)).await.unwrap();
        hub.rooms.room_of(host.id()).unwrap().id()
    }

    #[tokio::test]
    async fn create_sends_room_info_to_host() {
        let (store, hub) = hub().await;
        let (host, conn) = login(&hub, 1).await;

        let room_id = open_room(&hub, &host).await;

        let ServerPacket::RoomInfo { room } = last(&conn) else {
            panic!("expected room info");
        };
        assert_eq!(room.id, room_id);
        assert_eq!(room.host_id, 1);
        assert!(store.contains(&format!("server:multiplayer:{room_id}:player:1")));
    }

    #[tokio::test]
    async fn muted_users_cannot_create_rooms() {
        let (_, hub) = hub().await;
        let muted = UserInfo {
            mute_end_time: crate::state::now_ms() + 60_000,
            ..profile(1)
        };
        let session = crate::handlers::complete_login(
            &hub,
            muted,
            Arc::new(RecordingConnection::default()),
        )
        .await
        .unwrap();

        let result = dispatch(&hub, &session, create_packet("quiet", None)).await;
        assert!(matches!(result, Err(HandlerError::Muted)));
        assert_eq!(hub.rooms.count(), 0);
    }

    #[tokio::test]
    async fn join_notifies_existing_members() {
        let (_, hub) = hub().await;
        let (host, host_conn) = login(&hub, 1).await;
        let (guest, guest_conn) = login(&hub, 2).await;
        let room_id = open_room(&hub, &host).await;

        dispatch(&hub, &guest, ClientPacket::RoomJoin { id: room_id, password: None })
            .await
            .unwrap();

        assert_eq!(
            last(&host_conn),
            ServerPacket::RoomPlayerJoined { room_id, user_id: 2 }
        );
        let ServerPacket::RoomInfo { room } = last(&guest_conn) else {
            panic!("expected room info");
        };
        assert_eq!(room.players.len(), 2);
    }

    #[tokio::test]
    async fn wrong_password_is_reported() {
        let (_, hub) = hub().await;
        let (host, _) = login(&hub, 1).await;
        let (guest, _) = login(&hub, 2).await;
        dispatch(&hub, &host, create_packet("locked", Some("secret"))).await.unwrap();
        let room_id = hub.rooms.room_of(1).unwrap().id();

        let result = dispatch(
            &hub,
            &guest,
            ClientPacket::RoomJoin {
                id: room_id,
                password: Some("guess".into()),
            },
        )
        .await;
        assert!(matches!(result, Err(HandlerError::Room(RoomError::WrongPassword))));
        assert!(hub.rooms.room_of(2).is_none());
    }

    #[tokio::test]
    async fn ready_change_is_broadcast_as_update() {
        let (_, hub) = hub().await;
        let (host, host_conn) = login(&hub, 1).await;
        let (guest, _) = login(&hub, 2).await;
        let room_id = open_room(&hub, &host).await;
        dispatch(&hub, &guest, ClientPacket::RoomJoin { id: room_id, password: None })
            .await
            .unwrap();

        dispatch(&hub, &guest, ClientPacket::RoomReady { ready: true }).await.unwrap();

        let ServerPacket::RoomUpdate { room } = last(&host_conn) else {
            panic!("expected room update");
        };
        let guest_view = room.players.iter().find(|p| p.user_id == 2).unwrap();
        assert!(guest_view.ready);
    }

    #[tokio::test]
    async fn room_packets_outside_a_room_fail() {
        let (_, hub) = hub().await;
        let (session, _) = login(&hub, 1).await;

        for packet in [
            ClientPacket::RoomLeave,
            ClientPacket::RoomStart,
            ClientPacket::RoomReady { ready: true },
        ] {
            let result = dispatch(&hub, &session, packet).await;
            assert!(matches!(result, Err(HandlerError::NotInRoom)));
        }
    }

    #[tokio::test]
    async fn only_the_host_starts_and_finish_credits_winner() {
        let (_, hub) = hub().await;
        let (host, _) = login(&hub, 1).await;
        let (guest, _) = login(&hub, 2).await;
        let room_id = open_room(&hub, &host).await;
        dispatch(&hub, &guest, ClientPacket::RoomJoin { id: room_id, password: None })
            .await
            .unwrap();

        let refused = dispatch(&hub, &guest, ClientPacket::RoomStart).await;
        assert!(matches!(refused, Err(HandlerError::Room(RoomError::NotHost))));

        dispatch(&hub, &host, ClientPacket::RoomStart).await.unwrap();
        assert!(hub.rooms.get(room_id).unwrap().snapshot().in_progress);

        dispatch(&hub, &host, ClientPacket::RoomFinish { winner: Some(2) })
            .await
            .unwrap();
        let room = hub.rooms.get(room_id).unwrap().snapshot();
        assert!(!room.in_progress);
        let guest_view = room.players.iter().find(|p| p.user_id == 2).unwrap();
        assert_eq!(guest_view.wins, 1);
    }

    #[tokio::test]
    async fn finish_rejects_unknown_winner_without_ending_match() {
        let (_, hub) = hub().await;
        let (host, _) = login(&hub, 1).await;
        let room_id = open_room(&hub, &host).await;
        dispatch(&hub, &host, ClientPacket::RoomStart).await.unwrap();

        let result = dispatch(&hub, &host, ClientPacket::RoomFinish { winner: Some(99) }).await;
        assert!(matches!(result, Err(HandlerError::Room(RoomError::NotMember(99)))));
        assert!(hub.rooms.get(room_id).unwrap().snapshot().in_progress);
    }

    #[tokio::test]
    async fn host_leaving_passes_role_and_notifies() {
        let (_, hub) = hub().await;
        let (host, _) = login(&hub, 1).await;
        let (guest, guest_conn) = login(&hub, 2).await;
        let room_id = open_room(&hub, &host).await;
        dispatch(&hub, &guest, ClientPacket::RoomJoin { id: room_id, password: None })
            .await
            .unwrap();

        dispatch(&hub, &host, ClientPacket::RoomLeave).await.unwrap();

        let packets = guest_conn.packets();
        assert!(packets.contains(&ServerPacket::RoomPlayerLeft { room_id, user_id: 1 }));
        let Some(ServerPacket::RoomUpdate { room }) = packets.last() else {
            panic!("expected room update");
        };
        assert_eq!(room.host_id, 2);
    }

    #[tokio::test]
    async fn close_tells_every_member() {
        let (store, hub) = hub().await;
        let (host, host_conn) = login(&hub, 1).await;
        let (guest, guest_conn) = login(&hub, 2).await;
        let room_id = open_room(&hub, &host).await;
        dispatch(&hub, &guest, ClientPacket::RoomJoin { id: room_id, password: None })
            .await
            .unwrap();

        dispatch(&hub, &host, ClientPacket::RoomClose).await.unwrap();

        assert_eq!(last(&host_conn), ServerPacket::RoomClosed { room_id });
        assert_eq!(last(&guest_conn), ServerPacket::RoomClosed { room_id });
        assert!(!store.contains(&format!("server:multiplayer:{room_id}")));
        assert!(hub.rooms.room_of(2).is_none());
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let (_, hub) = hub().await;
        let (a, a_conn) = login(&hub, 1).await;
        let (b, _) = login(&hub, 2).await;
        let room_a = open_room(&hub, &a).await;
        open_room(&hub, &b).await;

        close_all(&hub).await;

        assert_eq!(hub.rooms.count(), 0);
        assert_eq!(last(&a_conn), ServerPacket::RoomClosed { room_id: room_a });
    }
}
