//! User repository.
//!
//! Handles login verification and profile lookup for connecting clients.

use super::DbError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordVerifier},
};
use rhythm_proto::{PacketUser, UserId};
use sqlx::SqlitePool;

/// Profile of a user as stored in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: UserId,
    pub steam_id: String,
    pub username: String,
    pub user_groups: i64,
    /// Mute expiry as unix milliseconds (0 = never muted).
    pub mute_end_time: i64,
    pub country: String,
    pub avatar_url: String,
}

impl UserInfo {
    /// Public view sent in packets.
    pub fn to_packet(&self) -> PacketUser {
        PacketUser {
            id: self.id,
            steam_id: self.steam_id.clone(),
            username: self.username.clone(),
            user_groups: self.user_groups,
            mute_end_time: self.mute_end_time,
            country: self.country.clone(),
        }
    }
}

fn from_row(row: (i64, String, String, i64, i64, String, String)) -> Result<UserInfo, DbError> {
    let (id, steam_id, username, user_groups, mute_end_time, country, avatar_url) = row;
    Ok(UserInfo {
        id: super::narrow("users.id", id)?,
        steam_id,
        username,
        user_groups,
        mute_end_time,
        country,
        avatar_url,
    })
}

/// Repository for user operations.
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Verify credentials and return the user's profile.
    ///
    /// Unknown usernames and wrong passwords produce the same error and take
    /// roughly the same time, so login attempts cannot probe for accounts.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<UserInfo, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, i64, i64, String, String, String)>(
            r#"
            SELECT id, steam_id, username, user_groups, mute_end_time, country, avatar_url, password_hash
            FROM users
            WHERE username = ? COLLATE NOCASE
            "#,
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, steam_id, name, user_groups, mute_end_time, country, avatar_url, hash)) = row
        else {
            dummy_password_verify(password);
            return Err(DbError::InvalidCredentials);
        };

        verify_password(password, &hash)?;

        from_row((
            id,
            steam_id,
            name,
            user_groups,
            mute_end_time,
            country,
            avatar_url,
        ))
    }
}

/// Verify a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<(), DbError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| DbError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| DbError::InvalidCredentials)
}

/// Dummy password verification for constant-time account lookup.
///
/// Burns about as much CPU as a real verification so a missing account is
/// indistinguishable from a wrong password by response time.
fn dummy_password_verify(password: &str) {
    // Argon2id hash of a random string; never matches a real password.
    const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$dGltaW5nLW9yYWNsZS1kdW1teQ$K4VZh8k8YL3E8H7E8H7E8H7E8H7E8H7E8H7E8H7E8Hs";

    if let Ok(parsed) = PasswordHash::new(DUMMY_HASH) {
        let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
    }
}
