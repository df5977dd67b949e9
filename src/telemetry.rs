//! Telemetry utilities for packet timing and tracing spans.

use std::time::Instant;

/// Guard for timing packet handling and recording metrics.
///
/// Records handler latency when dropped.
pub struct PacketTimer {
    packet: &'static str,
    start: Instant,
}

impl PacketTimer {
    /// Start timing a packet.
    pub fn new(packet: &'static str) -> Self {
        Self {
            packet,
            start: Instant::now(),
        }
    }
}

impl Drop for PacketTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_packet(self.packet, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use rhythm_proto::UserId;
    use std::net::SocketAddr;
    use tracing::{Span, debug_span, info_span};

    /// Span for one client connection, before and after login.
    pub fn connection(addr: SocketAddr) -> Span {
        info_span!("connection", addr = %addr, user_id = tracing::field::Empty)
    }

    /// Span for handling one inbound packet.
    pub fn packet(name: &'static str, user_id: UserId) -> Span {
        debug_span!("packet", name = name, user_id = user_id)
    }
}
