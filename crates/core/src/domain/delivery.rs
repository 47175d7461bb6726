use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::rule::PoapEventId;

/// One row of the append-only delivery audit log.
///
/// A record is written only after the claim email went out successfully.
/// The log is intentionally *not* consulted for deduplication -
/// `ReactionSnapshot::delivered` is authoritative for that - so repeated
/// appends for the same logical delivery are tolerated by the store and
/// prevented only by the evaluator's guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub user_id: String,
    pub user_email: String,
    pub message_id: String,
    pub channel_id: String,
    pub event_id: PoapEventId,
    pub claim_link: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDeliveryRecord {
    pub user_id: String,
    pub user_email: String,
    pub message_id: String,
    pub channel_id: String,
    pub event_id: PoapEventId,
    pub claim_link: Option<String>,
}

/// Aggregates backing the `/poap-stats` slash command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub total_deliveries: u64,
    pub unique_recipients: u64,
    pub unique_events: u64,
}
