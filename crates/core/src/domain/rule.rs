use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub i64);

/// Provider-assigned identifier of the POAP drop a rule hands out.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoapEventId(pub String);

/// Per-channel delivery rule: when a message in `channel` collects
/// `reaction_threshold` or more reactions, its author earns the POAP
/// identified by `event_id`.
///
/// The store keeps at most one *active* rule per channel by convention
/// rather than a uniqueness constraint; lookups take the first active
/// match. Rules are never hard-deleted - deactivation clears `active`
/// and leaves the row for the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    /// Channel *name* as entered by the admin (for example `general`),
    /// not the raw `C...` identifier. Rule resolution translates the
    /// event's channel id to its name before matching.
    pub channel: String,
    pub reaction_threshold: u32,
    pub event_id: PoapEventId,
    pub poap_name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRule {
    pub channel: String,
    pub reaction_threshold: u32,
    pub event_id: PoapEventId,
    pub poap_name: String,
}

impl NewRule {
    pub fn new(
        channel: impl Into<String>,
        reaction_threshold: u32,
        event_id: impl Into<String>,
        poap_name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let channel = channel.into().trim_start_matches('#').trim().to_owned();
        if channel.is_empty() {
            return Err(DomainError::EmptyChannel);
        }
        if reaction_threshold < 1 {
            return Err(DomainError::InvalidThreshold { value: reaction_threshold });
        }
        let event_id = event_id.into();
        if event_id.trim().is_empty() {
            return Err(DomainError::EmptyEventId);
        }

        Ok(Self {
            channel,
            reaction_threshold,
            event_id: PoapEventId(event_id),
            poap_name: poap_name.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NewRule;
    use crate::errors::DomainError;

    #[test]
    fn strips_hash_prefix_from_channel() {
        let rule = NewRule::new("#general", 3, "event-123", "Engagement POAP").expect("valid");
        assert_eq!(rule.channel, "general");
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = NewRule::new("general", 0, "event-123", "Engagement POAP").unwrap_err();
        assert_eq!(err, DomainError::InvalidThreshold { value: 0 });
    }

    #[test]
    fn rejects_empty_channel_and_event_id() {
        assert_eq!(
            NewRule::new("#", 3, "event-123", "POAP").unwrap_err(),
            DomainError::EmptyChannel
        );
        assert_eq!(NewRule::new("general", 3, "  ", "POAP").unwrap_err(), DomainError::EmptyEventId);
    }
}
