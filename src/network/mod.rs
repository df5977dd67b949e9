//! Network module.
//!
//! Contains the Gateway (WebSocket listener and login), the per-connection
//! event loop, flood limiting and packet delivery.

mod broadcast;
mod connection;
mod flood;
mod gateway;
mod transport;

pub use broadcast::{Broadcaster, PacketCodec};
pub use gateway::Gateway;
pub use transport::{Connection, WsConnection};

#[cfg(test)]
pub(crate) use transport::testing;
