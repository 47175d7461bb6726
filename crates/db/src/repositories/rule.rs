use chrono::{DateTime, Utc};
use sqlx::Row;

use poapbot_core::domain::rule::{NewRule, PoapEventId, Rule, RuleId};

use super::{RepositoryError, RuleRepository};
use crate::DbPool;

pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<Rule, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel: String =
        row.try_get("channel").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reaction_threshold: i64 =
        row.try_get("reaction_threshold").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let event_id: String =
        row.try_get("event_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let poap_name: String =
        row.try_get("poap_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 = row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Rule {
        id: RuleId(id),
        channel,
        reaction_threshold: reaction_threshold.max(0) as u32,
        event_id: PoapEventId(event_id),
        poap_name,
        active: active != 0,
        created_at,
    })
}

#[async_trait::async_trait]
impl RuleRepository for SqlRuleRepository {
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, channel, reaction_threshold, event_id, poap_name, active, created_at
             FROM poap_rule WHERE active = 1 ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect::<Result<Vec<_>, _>>()
    }

    async fn find_active_by_channel(
        &self,
        channel: &str,
    ) -> Result<Option<Rule>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, channel, reaction_threshold, event_id, poap_name, active, created_at
             FROM poap_rule WHERE channel = ? AND active = 1 ORDER BY id ASC LIMIT 1",
        )
        .bind(channel)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_rule(r)?)),
            None => Ok(None),
        }
    }

    async fn create(&self, rule: NewRule) -> Result<RuleId, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO poap_rule (channel, reaction_threshold, event_id, poap_name, active, created_at)
             VALUES (?, ?, ?, ?, 1, ?)",
        )
        .bind(&rule.channel)
        .bind(rule.reaction_threshold as i64)
        .bind(&rule.event_id.0)
        .bind(&rule.poap_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(RuleId(result.last_insert_rowid()))
    }

    async fn deactivate(&self, id: RuleId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE poap_rule SET active = 0 WHERE id = ? AND active = 1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
