//! Unified error handling for rhythmd.
//!
//! This module provides the error hierarchy for packet handling, room
//! operations, the transport and the session registry. Cache and database
//! errors live next to their backends (`cache::CacheError`, `db::DbError`).

use crate::db::DbError;
use rhythm_proto::{ProtocolError, ServerPacket};
use thiserror::Error;

// ============================================================================
// Handler Errors (packet processing)
// ============================================================================

/// Errors that can occur while handling an inbound packet.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("already logged in")]
    AlreadyLoggedIn,

    #[error("not in a room")]
    NotInRoom,

    #[error("you are muted")]
    Muted,

    #[error("slow down")]
    Flooding,

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl HandlerError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyLoggedIn => "already_logged_in",
            Self::NotInRoom => "not_in_room",
            Self::Muted => "muted",
            Self::Flooding => "flooding",
            Self::Room(e) => e.error_code(),
            Self::Db(_) => "db_error",
            Self::Protocol(_) => "protocol_error",
        }
    }

    /// Convert to an error packet for the client.
    ///
    /// Database details stay in the logs.
    pub fn to_reply(&self) -> ServerPacket {
        let message = match self {
            Self::Db(_) => "temporarily unavailable".to_string(),
            _ => self.to_string(),
        };
        ServerPacket::Error { message }
    }
}

/// Result type for packet handlers.
pub type HandlerResult = Result<(), HandlerError>;

// ============================================================================
// Login Errors
// ============================================================================

/// Reasons a connection never gets a session.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login timed out")]
    Timeout,

    #[error("connection closed before login")]
    Closed,

    #[error("expected a login packet")]
    NotLogin,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl LoginError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Closed => "closed",
            Self::NotLogin => "not_login",
            Self::Protocol(_) => "protocol_error",
            Self::Db(DbError::InvalidCredentials) => "invalid_credentials",
            Self::Db(_) => "db_error",
            Self::Registry(_) => "duplicate_token",
        }
    }

    /// Error packet sent before the connection is closed, if any.
    pub fn to_reply(&self) -> Option<ServerPacket> {
        let message = match self {
            Self::Closed => return None,
            Self::Timeout | Self::NotLogin | Self::Protocol(_) => self.to_string(),
            Self::Db(DbError::InvalidCredentials) => self.to_string(),
            Self::Db(_) | Self::Registry(_) => "temporarily unavailable".to_string(),
        };
        Some(ServerPacket::Error { message })
    }
}

// ============================================================================
// Room Errors
// ============================================================================

/// Room operation errors, reported to the requesting client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("no such room")]
    NoSuchRoom,

    #[error("room is full")]
    Full,

    #[error("wrong room password")]
    WrongPassword,

    #[error("already in a room")]
    AlreadyMember,

    #[error("user {0} is not in this room")]
    NotMember(i32),

    #[error("only the host can do that")]
    NotHost,

    #[error("a match is in progress")]
    InProgress,

    #[error("no match in progress")]
    NotInProgress,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl RoomError {
    /// Get a static error code string for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoSuchRoom => "no_such_room",
            Self::Full => "room_full",
            Self::WrongPassword => "wrong_password",
            Self::AlreadyMember => "already_member",
            Self::NotMember(_) => "not_member",
            Self::NotHost => "not_host",
            Self::InProgress => "in_progress",
            Self::NotInProgress => "not_in_progress",
            Self::InvalidSettings(_) => "invalid_settings",
        }
    }
}

// ============================================================================
// Transport Errors (per-recipient, never fatal)
// ============================================================================

/// Failures while encoding or writing a frame to one connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to serialize packet: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Write(String),

    #[error("write timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serialize(_) => "serialize",
            Self::Write(_) => "write",
            Self::Timeout => "timeout",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Session registry invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session token already registered")]
    DuplicateToken,
}
