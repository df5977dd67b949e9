//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds the listening socket and spawns one task per client.
//! Each task performs the WebSocket handshake (checking the `Origin` header
//! against the configured allow list), runs the login exchange and then the
//! connection loop.

use super::connection;
use super::transport::{Connection, WsConnection};
use crate::config::ListenConfig;
use crate::state::Hub;
use crate::telemetry::spans;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    listen: Arc<ListenConfig>,
    hub: Arc<Hub>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(listen: ListenConfig, hub: Arc<Hub>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen.websocket).await?;
        info!(address = %listen.websocket, "WebSocket listener bound");
        Ok(Self {
            listener,
            listen: Arc::new(listen),
            hub,
        })
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "WebSocket connection attempt");
                    let listen = Arc::clone(&self.listen);
                    let hub = Arc::clone(&self.hub);
                    tokio::spawn(
                        serve(stream, addr, listen, hub).instrument(spans::connection(addr)),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

fn forbidden(message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = http::StatusCode::FORBIDDEN;
    response
}

async fn serve(stream: TcpStream, addr: SocketAddr, listen: Arc<ListenConfig>, hub: Arc<Hub>) {
    let origin_check = |req: &Request, response: Response| {
        let origin = req
            .headers()
            .get(http::header::ORIGIN)
            .and_then(|o| o.to_str().ok());
        if listen.origin_allowed(origin) {
            Ok(response)
        } else {
            warn!(%addr, origin = ?origin, "WebSocket origin rejected");
            Err(forbidden("origin not allowed"))
        }
    };

    let ws_stream = match accept_hdr_async(stream, origin_check).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let (sink, mut reader) = ws_stream.split();
    let conn: Arc<dyn Connection> = Arc::new(WsConnection::new(sink, addr));

    let session = match connection::login(&hub, &mut reader, Arc::clone(&conn)).await {
        Ok(session) => session,
        Err(e) => {
            info!(%addr, reason = e.reason(), "Login refused");
            connection::reject(&hub, conn.as_ref(), &e).await;
            return;
        }
    };

    Span::current().record("user_id", session.id());
    connection::run(&hub, &session, reader).await;
}
