use chrono::Utc;
use sqlx::Row;

use poapbot_core::domain::delivery::{DeliveryStats, NewDeliveryRecord};

use super::{DeliveryLog, RepositoryError};
use crate::DbPool;

pub struct SqlDeliveryLog {
    pool: DbPool,
}

impl SqlDeliveryLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeliveryLog for SqlDeliveryLog {
    async fn append(&self, record: NewDeliveryRecord) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO poap_delivery (user_id, user_email, message_id, channel_id, event_id, claim_link, delivered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.user_id)
        .bind(&record.user_email)
        .bind(&record.message_id)
        .bind(&record.channel_id)
        .bind(&record.event_id.0)
        .bind(&record.claim_link)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn stats(&self) -> Result<DeliveryStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_deliveries,
                    COUNT(DISTINCT user_id) AS unique_recipients,
                    COUNT(DISTINCT event_id) AS unique_events
             FROM poap_delivery",
        )
        .fetch_one(&self.pool)
        .await?;

        let total: i64 = row
            .try_get("total_deliveries")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let recipients: i64 = row
            .try_get("unique_recipients")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let events: i64 =
            row.try_get("unique_events").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(DeliveryStats {
            total_deliveries: total.max(0) as u64,
            unique_recipients: recipients.max(0) as u64,
            unique_events: events.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use poapbot_core::domain::delivery::NewDeliveryRecord;
    use poapbot_core::domain::rule::PoapEventId;

    use super::SqlDeliveryLog;
    use crate::repositories::DeliveryLog;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlDeliveryLog {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDeliveryLog::new(pool)
    }

    fn record(user: &str, event: &str) -> NewDeliveryRecord {
        NewDeliveryRecord {
            user_id: user.to_owned(),
            user_email: format!("{user}@example.com"),
            message_id: "1730000000.1000".to_owned(),
            channel_id: "C1".to_owned(),
            event_id: PoapEventId(event.to_owned()),
            claim_link: Some("https://poap.xyz/claim/abc".to_owned()),
        }
    }

    #[tokio::test]
    async fn append_is_append_only_even_for_duplicates() {
        let log = setup().await;

        let first = log.append(record("U1", "event-1")).await.expect("append 1");
        let second = log.append(record("U1", "event-1")).await.expect("append 2");

        assert_ne!(first, second, "duplicate logical deliveries still get distinct rows");
        assert_eq!(log.stats().await.expect("stats").total_deliveries, 2);
    }

    #[tokio::test]
    async fn stats_count_distinct_recipients_and_events() {
        let log = setup().await;

        log.append(record("U1", "event-1")).await.expect("append 1");
        log.append(record("U1", "event-2")).await.expect("append 2");
        log.append(record("U2", "event-1")).await.expect("append 3");

        let stats = log.stats().await.expect("stats");
        assert_eq!(stats.total_deliveries, 3);
        assert_eq!(stats.unique_recipients, 2);
        assert_eq!(stats.unique_events, 2);
    }

    #[tokio::test]
    async fn stats_on_empty_log_are_zero() {
        let log = setup().await;
        let stats = log.stats().await.expect("stats");
        assert_eq!(stats.total_deliveries, 0);
        assert_eq!(stats.unique_recipients, 0);
        assert_eq!(stats.unique_events, 0);
    }
}
