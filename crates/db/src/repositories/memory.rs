//! In-memory repository implementations used by the engine tests and by
//! environments without a database (the SQL implementations are the
//! production path).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use poapbot_core::domain::delivery::{DeliveryRecord, DeliveryStats, NewDeliveryRecord};
use poapbot_core::domain::reaction::ReactionSnapshot;
use poapbot_core::domain::rule::{NewRule, Rule, RuleId};

use super::{DeliveryLog, ReactionLedger, RepositoryError, RuleRepository};

#[derive(Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<Vec<Rule>>,
    next_id: AtomicI64,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().filter(|rule| rule.active).cloned().collect())
    }

    async fn find_active_by_channel(
        &self,
        channel: &str,
    ) -> Result<Option<Rule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.iter().find(|rule| rule.active && rule.channel == channel).cloned())
    }

    async fn create(&self, rule: NewRule) -> Result<RuleId, RepositoryError> {
        let id = RuleId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut rules = self.rules.write().await;
        rules.push(Rule {
            id,
            channel: rule.channel,
            reaction_threshold: rule.reaction_threshold,
            event_id: rule.event_id,
            poap_name: rule.poap_name,
            active: true,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn deactivate(&self, id: RuleId) -> Result<bool, RepositoryError> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|rule| rule.id == id && rule.active) {
            Some(rule) => {
                rule.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryReactionLedger {
    snapshots: RwLock<HashMap<(String, String), ReactionSnapshot>>,
}

impl InMemoryReactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in the ledger; lets tests assert that the no-rule
    /// path leaves the ledger untouched.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl ReactionLedger for InMemoryReactionLedger {
    async fn upsert(
        &self,
        message_id: &str,
        channel_id: &str,
        user_id: &str,
        reaction_count: u32,
    ) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry((message_id.to_owned(), user_id.to_owned()))
            .and_modify(|snapshot| {
                snapshot.channel_id = channel_id.to_owned();
                snapshot.reaction_count = reaction_count;
                snapshot.updated_at = Utc::now();
            })
            .or_insert_with(|| ReactionSnapshot {
                message_id: message_id.to_owned(),
                channel_id: channel_id.to_owned(),
                user_id: user_id.to_owned(),
                reaction_count,
                delivered: false,
                updated_at: Utc::now(),
            });
        Ok(())
    }

    async fn find(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<ReactionSnapshot>, RepositoryError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&(message_id.to_owned(), user_id.to_owned())).cloned())
    }

    async fn mark_delivered(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write().await;
        if let Some(snapshot) = snapshots.get_mut(&(message_id.to_owned(), user_id.to_owned())) {
            snapshot.delivered = true;
            snapshot.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDeliveryLog {
    records: RwLock<Vec<DeliveryRecord>>,
    next_id: AtomicI64,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<DeliveryRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn append(&self, record: NewDeliveryRecord) -> Result<i64, RepositoryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut records = self.records.write().await;
        records.push(DeliveryRecord {
            id,
            user_id: record.user_id,
            user_email: record.user_email,
            message_id: record.message_id,
            channel_id: record.channel_id,
            event_id: record.event_id,
            claim_link: record.claim_link,
            delivered_at: Utc::now(),
        });
        Ok(id)
    }

    async fn stats(&self) -> Result<DeliveryStats, RepositoryError> {
        let records = self.records.read().await;
        let unique_recipients =
            records.iter().map(|r| r.user_id.as_str()).collect::<std::collections::HashSet<_>>();
        let unique_events =
            records.iter().map(|r| r.event_id.0.as_str()).collect::<std::collections::HashSet<_>>();

        Ok(DeliveryStats {
            total_deliveries: records.len() as u64,
            unique_recipients: unique_recipients.len() as u64,
            unique_events: unique_events.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use poapbot_core::domain::rule::NewRule;

    use super::{InMemoryReactionLedger, InMemoryRuleRepository};
    use crate::repositories::{ReactionLedger, RuleRepository};

    #[tokio::test]
    async fn in_memory_rules_honor_first_match_and_soft_delete() {
        let repo = InMemoryRuleRepository::new();

        let first = repo
            .create(NewRule::new("general", 3, "event-1", "POAP A").expect("valid"))
            .await
            .expect("create");
        repo.create(NewRule::new("general", 9, "event-2", "POAP B").expect("valid"))
            .await
            .expect("create");

        let found = repo.find_active_by_channel("general").await.expect("find").expect("exists");
        assert_eq!(found.id, first);

        repo.deactivate(first).await.expect("deactivate");
        let found = repo.find_active_by_channel("general").await.expect("find").expect("exists");
        assert_eq!(found.reaction_threshold, 9);
    }

    #[tokio::test]
    async fn in_memory_ledger_preserves_delivered_across_upserts() {
        let ledger = InMemoryReactionLedger::new();

        ledger.upsert("ts", "C1", "U1", 3).await.expect("upsert");
        ledger.mark_delivered("ts", "U1").await.expect("mark");
        ledger.upsert("ts", "C1", "U1", 8).await.expect("re-upsert");

        let snapshot = ledger.find("ts", "U1").await.expect("find").expect("exists");
        assert!(snapshot.delivered);
        assert_eq!(snapshot.reaction_count, 8);
    }
}
