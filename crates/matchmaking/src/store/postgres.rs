//! PostgreSQL durable store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use common::{Difficulty, Match, MatchRef, MatchStatus, TopicSet, UserId, UserPreference};
use config::PostgresConfig;

use crate::store::traits::{MatchmakingStore, NewMatchOutcome, StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user_preferences (
        user_id     TEXT PRIMARY KEY,
        topics      TEXT[] NOT NULL DEFAULT '{}',
        difficulty  TEXT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS match_queue (
        user_id    TEXT PRIMARY KEY,
        joined_at  TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        match_id       UUID PRIMARY KEY,
        user1_id       TEXT NOT NULL,
        user2_id       TEXT NOT NULL,
        status         TEXT NOT NULL,
        workspace_ref  TEXT,
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn parse_user(raw: &str) -> StoreResult<UserId> {
    UserId::parse(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// PostgreSQL matchmaking store
pub struct PostgresMatchmakingStore {
    pool: Arc<PgPool>,
}

impl PostgresMatchmakingStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect using service configuration
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        info!(host = %config.host, port = config.port, database = %config.database, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.connection_url())
            .await
            .map_err(db_err)?;

        Ok(Self::new(pool))
    }

    /// Create tables if they do not exist
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(db_err)?;
        }
        debug!("Matchmaking schema ready");
        Ok(())
    }

    fn row_to_preference(row: &PgRow) -> StoreResult<UserPreference> {
        let user_id: String = row.try_get("user_id").map_err(db_err)?;
        let topics: Vec<String> = row.try_get("topics").map_err(db_err)?;
        let difficulty: String = row.try_get("difficulty").map_err(db_err)?;

        let topics =
            TopicSet::new(topics).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let difficulty = difficulty
            .parse::<Difficulty>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(UserPreference::new(parse_user(&user_id)?, topics, difficulty))
    }

    fn row_to_match(row: &PgRow) -> StoreResult<Match> {
        let status: String = row.try_get("status").map_err(db_err)?;
        let status = MatchStatus::parse(&status)
            .ok_or_else(|| StoreError::Serialization(format!("unknown match status '{}'", status)))?;
        let user1_id: String = row.try_get("user1_id").map_err(db_err)?;
        let user2_id: String = row.try_get("user2_id").map_err(db_err)?;

        Ok(Match {
            match_id: row.try_get("match_id").map_err(db_err)?,
            user1_id: parse_user(&user1_id)?,
            user2_id: parse_user(&user2_id)?,
            status,
            workspace_ref: row.try_get("workspace_ref").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
        })
    }
}

#[async_trait]
impl MatchmakingStore for PostgresMatchmakingStore {
    async fn get_preferences(&self, user_id: &UserId) -> StoreResult<Option<UserPreference>> {
        let row = sqlx::query(
            "SELECT user_id, topics, difficulty FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::row_to_preference).transpose()
    }

    async fn update_preferences(&self, preference: &UserPreference) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (user_id, topics, difficulty, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (user_id) DO UPDATE SET
                topics = EXCLUDED.topics,
                difficulty = EXCLUDED.difficulty,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(preference.user_id.as_str())
        .bind(preference.topics.to_vec())
        .bind(preference.difficulty.as_str())
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn add_to_queue(&self, user_id: &UserId) -> StoreResult<()> {
        sqlx::query("INSERT INTO match_queue (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn remove_from_queue(&self, user_id: &UserId) -> StoreResult<()> {
        sqlx::query("DELETE FROM match_queue WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn queue_members(&self) -> StoreResult<Vec<UserId>> {
        let rows = sqlx::query("SELECT user_id FROM match_queue ORDER BY joined_at ASC, user_id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let raw: String = row.try_get("user_id").map_err(db_err)?;
                parse_user(&raw)
            })
            .collect()
    }

    async fn queue_joined_at(&self, user_id: &UserId) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT joined_at FROM match_queue WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| r.try_get::<DateTime<Utc>, _>("joined_at").map_err(db_err))
            .transpose()
    }

    async fn restore_to_queue(&self, user_id: &UserId, joined_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO match_queue (user_id, joined_at) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id.as_str())
        .bind(joined_at)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn handle_new_match(
        &self,
        user1_id: &UserId,
        user2_id: &UserId,
        match_id: Uuid,
    ) -> StoreResult<NewMatchOutcome> {
        if user1_id == user2_id {
            return Ok(NewMatchOutcome::rejected("cannot match a user with themselves"));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let busy = sqlx::query(
            r#"
            SELECT match_id FROM matches
            WHERE status IN ('pending', 'active')
              AND (user1_id = ANY($1) OR user2_id = ANY($1))
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(vec![user1_id.to_string(), user2_id.to_string()])
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = busy {
            let existing: Uuid = row.try_get("match_id").map_err(db_err)?;
            tx.rollback().await.map_err(db_err)?;
            return Ok(NewMatchOutcome::rejected(format!(
                "a user is already in match {}",
                existing
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO matches (match_id, user1_id, user2_id, status, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(match_id)
        .bind(user1_id.as_str())
        .bind(user2_id.as_str())
        .bind(MatchStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(NewMatchOutcome::accepted())
    }

    async fn activate_match(&self, match_id: Uuid, workspace_ref: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE matches SET status = $2, workspace_ref = $3 WHERE match_id = $1",
        )
        .bind(match_id)
        .bind(MatchStatus::Active.as_str())
        .bind(workspace_ref)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MatchNotFound(match_id));
        }
        Ok(())
    }

    async fn delete_match(&self, match_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM matches WHERE match_id = $1")
            .bind(match_id)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get_match_status(&self, user_id: &UserId) -> StoreResult<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM matches
            WHERE status = 'active' AND (user1_id = $1 OR user2_id = $1)
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::row_to_match).transpose()
    }

    async fn get_match(&self, match_id: Uuid) -> StoreResult<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE match_id = $1")
            .bind(match_id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::row_to_match).transpose()
    }

    async fn clear_matches(&self, target: &MatchRef) -> StoreResult<Vec<Match>> {
        let rows = match target {
            MatchRef::Match(id) => {
                sqlx::query(
                    r#"
                    UPDATE matches SET status = 'cancelled'
                    WHERE match_id = $1 AND status IN ('pending', 'active')
                    RETURNING *
                    "#,
                )
                .bind(*id)
                .fetch_all(&*self.pool)
                .await
            }
            MatchRef::User(user) => {
                sqlx::query(
                    r#"
                    UPDATE matches SET status = 'cancelled'
                    WHERE (user1_id = $1 OR user2_id = $1) AND status IN ('pending', 'active')
                    RETURNING *
                    "#,
                )
                .bind(user.as_str())
                .fetch_all(&*self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.iter().map(Self::row_to_match).collect()
    }
}
