use serde::Deserialize;
use thiserror::Error;

use poapbot_core::domain::reaction::ReactionEvent;

/// A parsed Events API request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundPayload {
    /// Slack's endpoint handshake; the challenge must be echoed back.
    UrlVerification { challenge: String },
    EventCallback(SlackEvent),
    /// Payload types this bot does not consume; acknowledged and dropped.
    Unsupported { payload_type: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ReactionAdded(ReactionAddedEvent),
    Unsupported { event_type: String },
}

/// The `reaction_added` event as delivered by Slack. The embedded
/// per-emoji data is intentionally not carried further: the evaluator
/// re-fetches the aggregate count from the Web API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionAddedEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub reactor_id: String,
    pub reaction: String,
}

impl ReactionAddedEvent {
    pub fn to_reaction_event(&self) -> ReactionEvent {
        ReactionEvent {
            message_ts: self.message_ts.clone(),
            channel_id: self.channel_id.clone(),
            reactor_id: self.reactor_id.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload is missing required field `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct RawItem {
    channel: Option<String>,
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    user: Option<String>,
    reaction: Option<String>,
    item: Option<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(rename = "type")]
    payload_type: Option<String>,
    challenge: Option<String>,
    event: Option<RawEvent>,
}

/// Parses an Events API request body. Unknown payload and event types
/// come back as `Unsupported` rather than errors so the webhook can
/// acknowledge them with a 200 without processing.
pub fn parse_payload(body: &str) -> Result<InboundPayload, EventParseError> {
    let raw: RawPayload =
        serde_json::from_str(body).map_err(|err| EventParseError::InvalidJson(err.to_string()))?;

    match raw.payload_type.as_deref() {
        Some("url_verification") => {
            let challenge = raw.challenge.ok_or(EventParseError::MissingField("challenge"))?;
            Ok(InboundPayload::UrlVerification { challenge })
        }
        Some("event_callback") => {
            let event = raw.event.ok_or(EventParseError::MissingField("event"))?;
            Ok(InboundPayload::EventCallback(parse_event(event)?))
        }
        Some(other) => Ok(InboundPayload::Unsupported { payload_type: other.to_owned() }),
        None => Err(EventParseError::MissingField("type")),
    }
}

fn parse_event(raw: RawEvent) -> Result<SlackEvent, EventParseError> {
    if raw.event_type != "reaction_added" {
        return Ok(SlackEvent::Unsupported { event_type: raw.event_type });
    }

    let item = raw.item.ok_or(EventParseError::MissingField("item"))?;
    let channel_id = item.channel.ok_or(EventParseError::MissingField("item.channel"))?;
    let message_ts = item.ts.ok_or(EventParseError::MissingField("item.ts"))?;
    let reactor_id = raw.user.ok_or(EventParseError::MissingField("user"))?;

    Ok(SlackEvent::ReactionAdded(ReactionAddedEvent {
        channel_id,
        message_ts,
        reactor_id,
        reaction: raw.reaction.unwrap_or_default(),
    }))
}

#[cfg(test)]
mod tests {
    use super::{parse_payload, EventParseError, InboundPayload, SlackEvent};

    #[test]
    fn parses_url_verification_challenge() {
        let payload = parse_payload(r#"{"type":"url_verification","challenge":"abc123"}"#)
            .expect("should parse");

        assert_eq!(payload, InboundPayload::UrlVerification { challenge: "abc123".to_owned() });
    }

    #[test]
    fn parses_reaction_added_callback() {
        let body = r#"{
            "type": "event_callback",
            "event": {
                "type": "reaction_added",
                "user": "U024BE7LH",
                "reaction": "thumbsup",
                "item": {"type": "message", "channel": "C0G9QF9GZ", "ts": "1360782400.498405"}
            }
        }"#;

        let payload = parse_payload(body).expect("should parse");
        let InboundPayload::EventCallback(SlackEvent::ReactionAdded(event)) = payload else {
            panic!("expected reaction_added, got {payload:?}");
        };

        assert_eq!(event.channel_id, "C0G9QF9GZ");
        assert_eq!(event.message_ts, "1360782400.498405");
        assert_eq!(event.reactor_id, "U024BE7LH");
        assert_eq!(event.reaction, "thumbsup");

        let reaction_event = event.to_reaction_event();
        assert_eq!(reaction_event.message_ts, "1360782400.498405");
        assert_eq!(reaction_event.reactor_id, "U024BE7LH");
    }

    #[test]
    fn unknown_event_types_are_unsupported_not_errors() {
        let body = r#"{
            "type": "event_callback",
            "event": {"type": "reaction_removed", "user": "U1"}
        }"#;

        let payload = parse_payload(body).expect("should parse");
        assert_eq!(
            payload,
            InboundPayload::EventCallback(SlackEvent::Unsupported {
                event_type: "reaction_removed".to_owned()
            })
        );
    }

    #[test]
    fn unknown_payload_types_are_unsupported() {
        let payload =
            parse_payload(r#"{"type":"app_rate_limited"}"#).expect("should parse");
        assert_eq!(
            payload,
            InboundPayload::Unsupported { payload_type: "app_rate_limited".to_owned() }
        );
    }

    #[test]
    fn reaction_added_without_item_is_an_error() {
        let body = r#"{
            "type": "event_callback",
            "event": {"type": "reaction_added", "user": "U1"}
        }"#;

        assert_eq!(parse_payload(body).unwrap_err(), EventParseError::MissingField("item"));
    }

    #[test]
    fn garbage_body_is_invalid_json() {
        assert!(matches!(parse_payload("not json"), Err(EventParseError::InvalidJson(_))));
    }
}
