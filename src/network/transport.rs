//! Frame transport.
//!
//! A [`Connection`] is one client's outbound half: it writes whole text
//! frames and can be closed. The inbound half stays with the task that
//! reads from the socket.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;

/// Outbound side of a client connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write one text frame.
    async fn send_text(&self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is harmless.
    async fn close(&self);
}

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// WebSocket write half.
pub struct WsConnection {
    sink: Mutex<WsSink>,
    addr: SocketAddr,
}

impl WsConnection {
    pub fn new(sink: WsSink, addr: SocketAddr) -> Self {
        Self {
            sink: Mutex::new(sink),
            addr,
        }
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn send_text(&self, frame: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame)).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            other => TransportError::Write(other.to_string()),
        })
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(addr = %self.addr, error = %e, "WebSocket close failed");
        }
    }
}
