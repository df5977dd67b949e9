//! Packet delivery.
//!
//! [`PacketCodec`] turns a packet into one JSON text frame and writes it with
//! a deadline. [`Broadcaster`] delivers a packet to one session or fans it out
//! to many, encoding once. Each recipient's write is independent: a failed or
//! slow peer is logged and counted, and the others still get the frame.

use super::transport::Connection;
use crate::error::TransportError;
use crate::state::UserSession;
use futures_util::future::join_all;
use rhythm_proto::ServerPacket;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// JSON frame encoder and bounded writer.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    write_timeout: Duration,
}

impl PacketCodec {
    pub fn new(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }

    /// Serialize a payload to a text frame.
    pub fn encode<T: Serialize>(payload: &T) -> Result<String, TransportError> {
        Ok(serde_json::to_string(payload)?)
    }

    /// Write one frame, giving up after the write timeout.
    pub async fn write(&self, conn: &dyn Connection, frame: String) -> Result<(), TransportError> {
        match tokio::time::timeout(self.write_timeout, conn.send_text(frame)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Delivers packets to sessions.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    codec: PacketCodec,
}

impl Broadcaster {
    pub fn new(codec: PacketCodec) -> Self {
        Self { codec }
    }

    /// Send to one session. Returns whether the frame was written.
    pub async fn send_to(&self, payload: &ServerPacket, session: &UserSession) -> bool {
        let frame = match PacketCodec::encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(user_id = session.id(), error = %e, "Failed to encode packet");
                crate::metrics::record_send_failure(e.kind());
                return false;
            }
        };
        self.deliver(session, frame).await
    }

    /// Send to every session in `sessions`, returning how many writes succeeded.
    pub async fn send_to_many(
        &self,
        payload: &ServerPacket,
        sessions: &[Arc<UserSession>],
    ) -> usize {
        if sessions.is_empty() {
            return 0;
        }
        let frame = match PacketCodec::encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(recipients = sessions.len(), error = %e, "Failed to encode packet");
                crate::metrics::record_send_failure(e.kind());
                return 0;
            }
        };

        let writes = sessions
            .iter()
            .map(|session| self.deliver(session, frame.clone()));
        let delivered = join_all(writes).await.into_iter().filter(|ok| *ok).count();

        crate::metrics::record_fanout(sessions.len());
        delivered
    }

    async fn deliver(&self, session: &UserSession, frame: String) -> bool {
        trace!(user_id = session.id(), frame = %frame, "Sending frame");
        match self.codec.write(session.connection(), frame).await {
            Ok(()) => {
                crate::metrics::record_packet_sent();
                true
            }
            Err(e) => {
                debug!(user_id = session.id(), error = %e, "Failed to deliver packet");
                crate::metrics::record_send_failure(e.kind());
                false
            }
        }
    }
}
