use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A `reaction_added` notification reduced to the fields the evaluator
/// needs. The aggregate reaction count is deliberately absent: the
/// payload's per-emoji count is never trusted, the evaluator re-fetches
/// the live total from Slack before making any decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    /// Timestamp of the message that was reacted to; Slack's message key.
    pub message_ts: String,
    pub channel_id: String,
    /// User who added the reaction - not the message author.
    pub reactor_id: String,
}

/// Per-(message, author) reaction state, keyed `(message_id, user_id)`.
///
/// `reaction_count` always reflects the most recent authoritative
/// re-fetch (upsert semantics). `delivered` transitions false -> true
/// exactly once and is never reset; it is the sole dedup authority for
/// POAP delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSnapshot {
    pub message_id: String,
    pub channel_id: String,
    /// The message *author* who stands to receive the POAP.
    pub user_id: String,
    pub reaction_count: u32,
    pub delivered: bool,
    pub updated_at: DateTime<Utc>,
}

impl ReactionSnapshot {
    pub fn meets_threshold(&self, threshold: u32) -> bool {
        self.reaction_count >= threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::ReactionSnapshot;

    fn snapshot(count: u32) -> ReactionSnapshot {
        ReactionSnapshot {
            message_id: "1730000000.1000".to_owned(),
            channel_id: "C1".to_owned(),
            user_id: "U1".to_owned(),
            reaction_count: count,
            delivered: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn threshold_comparison_is_inclusive() {
        assert!(!snapshot(2).meets_threshold(3));
        assert!(snapshot(3).meets_threshold(3));
        assert!(snapshot(5).meets_threshold(3));
    }
}
