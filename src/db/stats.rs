//! Statistics repository.
//!
//! Reads per-mode statistics and derives leaderboard ranks by query.

use super::DbError;
use async_trait::async_trait;
use rhythm_proto::{GameMode, UserId, UserStats};
use sqlx::SqlitePool;

/// Source of per-mode statistics for a user.
///
/// Implemented by [`super::Database`]; sessions refresh their cached
/// statistics through this seam.
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// Load the statistics of `user_id` for one mode.
    async fn user_stats(
        &self,
        user_id: UserId,
        country: &str,
        mode: GameMode,
    ) -> Result<UserStats, DbError>;
}

/// Repository for statistics reads.
pub struct StatsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StatsRepository<'a> {
    /// Create a new statistics repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load one mode's statistics with global and country rank.
    ///
    /// Users without a row for the mode get zeroed statistics.
    pub async fn get(
        &self,
        user_id: UserId,
        country: &str,
        mode: GameMode,
    ) -> Result<UserStats, DbError> {
        let row = sqlx::query_as::<_, (i64, i64, f64, f64, i64)>(
            r#"
            SELECT total_score, ranked_score, overall_accuracy, overall_performance_rating, play_count
            FROM user_stats
            WHERE user_id = ? AND mode = ?
            "#,
        )
        .bind(user_id)
        .bind(mode.as_i32())
        .fetch_optional(self.pool)
        .await?;

        let (total_score, ranked_score, overall_accuracy, rating, play_count) =
            row.unwrap_or((0, 0, 0.0, 0.0, 0));

        let global_rank: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) + 1 FROM user_stats
            WHERE mode = ? AND overall_performance_rating > ?
            "#,
        )
        .bind(mode.as_i32())
        .bind(rating)
        .fetch_one(self.pool)
        .await?;

        let country_rank: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) + 1 FROM user_stats s
            JOIN users u ON u.id = s.user_id
            WHERE s.mode = ? AND u.country = ? AND s.overall_performance_rating > ?
            "#,
        )
        .bind(mode.as_i32())
        .bind(country)
        .bind(rating)
        .fetch_one(self.pool)
        .await?;

        Ok(UserStats {
            mode,
            total_score,
            ranked_score,
            overall_accuracy,
            overall_performance_rating: rating,
            play_count: super::narrow("user_stats.play_count", play_count)?,
            global_rank,
            country_rank,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::users::testing::insert_user;
    use crate::db::{Database, DbError};
    use rhythm_proto::GameMode;

    async fn insert_stats(db: &Database, user_id: i32, mode: GameMode, rating: f64) {
        sqlx::query(
            r#"
            INSERT INTO user_stats (user_id, mode, total_score, ranked_score, overall_accuracy, overall_performance_rating, play_count)
            VALUES (?, ?, 1000, 900, 97.5, ?, 12)
            "#,
        )
        .bind(user_id)
        .bind(mode.as_i32())
        .bind(rating)
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn ranks_are_derived_from_rating() {
        let db = Database::new(":memory:").await.unwrap();
        let nl_top = insert_user(db.pool(), "nl_top", "pw", "NL").await;
        let us_mid = insert_user(db.pool(), "us_mid", "pw", "US").await;
        let nl_low = insert_user(db.pool(), "nl_low", "pw", "NL").await;
        insert_stats(&db, nl_top, GameMode::Keys4, 300.0).await;
        insert_stats(&db, us_mid, GameMode::Keys4, 200.0).await;
        insert_stats(&db, nl_low, GameMode::Keys4, 100.0).await;

        let stats = db.stats().get(nl_low, "NL", GameMode::Keys4).await.unwrap();
        assert_eq!(stats.global_rank, 3);
        assert_eq!(stats.country_rank, 2);
        assert_eq!(stats.play_count, 12);
        assert_eq!(stats.total_score, 1000);
    }

    #[tokio::test]
    async fn oversized_play_count_is_an_error() {
        let db = Database::new(":memory:").await.unwrap();
        let id = insert_user(db.pool(), "grinder", "pw", "JP").await;
        insert_stats(&db, id, GameMode::Keys4, 50.0).await;
        sqlx::query("UPDATE user_stats SET play_count = ? WHERE user_id = ?")
            .bind(5_000_000_000_i64)
            .bind(id)
            .execute(db.pool())
            .await
            .unwrap();

        let result = db.stats().get(id, "JP", GameMode::Keys4).await;
        assert!(matches!(
            result,
            Err(DbError::OutOfRange { value: 5_000_000_000, .. })
        ));
    }

    #[tokio::test]
    async fn missing_row_yields_zeroed_stats() {
        let db = Database::new(":memory:").await.unwrap();
        let id = insert_user(db.pool(), "fresh", "pw", "FR").await;

        let stats = db.stats().get(id, "FR", GameMode::Keys7).await.unwrap();
        assert_eq!(stats.mode, GameMode::Keys7);
        assert_eq!(stats.total_score, 0);
        assert_eq!(stats.play_count, 0);
        assert_eq!(stats.global_rank, 1);
    }
}
