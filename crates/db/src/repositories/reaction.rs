use chrono::{DateTime, Utc};
use sqlx::Row;

use poapbot_core::domain::reaction::ReactionSnapshot;

use super::{ReactionLedger, RepositoryError};
use crate::DbPool;

pub struct SqlReactionLedger {
    pool: DbPool,
}

impl SqlReactionLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<ReactionSnapshot, RepositoryError> {
    let message_id: String =
        row.try_get("message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_id: String =
        row.try_get("channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reaction_count: i64 =
        row.try_get("reaction_count").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delivered: i64 =
        row.try_get("delivered").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let updated_at = DateTime::parse_from_rfc3339(&updated_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(ReactionSnapshot {
        message_id,
        channel_id,
        user_id,
        reaction_count: reaction_count.max(0) as u32,
        delivered: delivered != 0,
        updated_at,
    })
}

#[async_trait::async_trait]
impl ReactionLedger for SqlReactionLedger {
    async fn upsert(
        &self,
        message_id: &str,
        channel_id: &str,
        user_id: &str,
        reaction_count: u32,
    ) -> Result<(), RepositoryError> {
        // ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: the
        // replace form would recreate the row and silently reset its
        // `delivered` flag, breaking the false -> true monotonicity the
        // dedup guard depends on.
        sqlx::query(
            "INSERT INTO reaction_snapshot (message_id, channel_id, user_id, reaction_count, delivered, updated_at)
             VALUES (?, ?, ?, ?, 0, ?)
             ON CONFLICT(message_id, user_id) DO UPDATE SET
                 channel_id = excluded.channel_id,
                 reaction_count = excluded.reaction_count,
                 updated_at = excluded.updated_at",
        )
        .bind(message_id)
        .bind(channel_id)
        .bind(user_id)
        .bind(reaction_count as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<ReactionSnapshot>, RepositoryError> {
        let row = sqlx::query(
            "SELECT message_id, channel_id, user_id, reaction_count, delivered, updated_at
             FROM reaction_snapshot WHERE message_id = ? AND user_id = ?",
        )
        .bind(message_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_snapshot(r)?)),
            None => Ok(None),
        }
    }

    async fn mark_delivered(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE reaction_snapshot SET delivered = 1, updated_at = ?
             WHERE message_id = ? AND user_id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(message_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
