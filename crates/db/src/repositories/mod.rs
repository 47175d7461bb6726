use async_trait::async_trait;
use thiserror::Error;

use poapbot_core::domain::delivery::{DeliveryStats, NewDeliveryRecord};
use poapbot_core::domain::reaction::ReactionSnapshot;
use poapbot_core::domain::rule::{NewRule, Rule, RuleId};

pub mod delivery;
pub mod memory;
pub mod reaction;
pub mod rule;

pub use delivery::SqlDeliveryLog;
pub use memory::{InMemoryDeliveryLog, InMemoryReactionLedger, InMemoryRuleRepository};
pub use reaction::SqlReactionLedger;
pub use rule::SqlRuleRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Store of per-channel delivery rules, matched by channel *name*.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Rule>, RepositoryError>;

    /// First active rule for the channel, by insertion order. Duplicate
    /// active rules for one channel are tolerated; only the first wins.
    async fn find_active_by_channel(
        &self,
        channel: &str,
    ) -> Result<Option<Rule>, RepositoryError>;

    async fn create(&self, rule: NewRule) -> Result<RuleId, RepositoryError>;

    /// Soft delete: clears `active`, keeps the row. Returns whether a
    /// row was actually flipped.
    async fn deactivate(&self, id: RuleId) -> Result<bool, RepositoryError>;
}

/// Dedup/state table keyed (message_id, user_id).
#[async_trait]
pub trait ReactionLedger: Send + Sync {
    /// Upsert the authoritative reaction count. Must never touch the
    /// `delivered` flag of an existing row.
    async fn upsert(
        &self,
        message_id: &str,
        channel_id: &str,
        user_id: &str,
        reaction_count: u32,
    ) -> Result<(), RepositoryError>;

    async fn find(
        &self,
        message_id: &str,
        user_id: &str,
    ) -> Result<Option<ReactionSnapshot>, RepositoryError>;

    /// Sets `delivered = true`. Idempotent: marking an already-delivered
    /// row is a no-op.
    async fn mark_delivered(&self, message_id: &str, user_id: &str)
        -> Result<(), RepositoryError>;
}

/// Append-only audit log of successful deliveries. Never deduplicates;
/// the evaluator's ledger guard is the sole dedup authority.
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn append(&self, record: NewDeliveryRecord) -> Result<i64, RepositoryError>;

    async fn stats(&self) -> Result<DeliveryStats, RepositoryError>;
}
