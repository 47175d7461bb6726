//! The chat-platform collaborator: everything the delivery engine needs
//! to ask Slack for, behind one trait so tests can run against a fake.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Profile fields the delivery path cares about. `email` is optional -
/// workspaces can hide it, and its absence is a first-class outcome
/// (the "set your email" prompt).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub email: Option<String>,
    pub display_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
    pub is_private: bool,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("slack transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("slack api `{method}` returned error: {error}")]
    Api { method: &'static str, error: String },
}

/// Web API surface consumed by the evaluator and the admin endpoints.
/// All methods are fallible; none retry. A `None` from
/// `message_author` means the message is gone or unattributable
/// (lookup race, deleted message) and the caller aborts silently.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Author of the message at `message_ts` in `channel_id`.
    async fn message_author(
        &self,
        channel_id: &str,
        message_ts: &str,
    ) -> Result<Option<String>, GatewayError>;

    /// Human-readable channel name; falls back to the raw id when Slack
    /// omits the name.
    async fn channel_name(&self, channel_id: &str) -> Result<String, GatewayError>;

    /// Live aggregate reaction count for a message: the sum across all
    /// emoji types, not any single emoji's count.
    async fn total_reactions(
        &self,
        channel_id: &str,
        message_ts: &str,
    ) -> Result<u32, GatewayError>;

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile, GatewayError>;

    async fn post_dm(&self, user_id: &str, text: &str) -> Result<(), GatewayError>;

    /// Non-archived channels for the admin page's rule picker.
    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, GatewayError>;
}

pub struct HttpChatGateway {
    client: reqwest::Client,
    bot_token: SecretString,
    api_base: String,
}

impl HttpChatGateway {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(bot_token: SecretString, api_base: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), bot_token, api_base: api_base.into() }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), method)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    error: Option<String>,
    #[serde(flatten)]
    payload: T,
}

fn unwrap_envelope<T>(
    method: &'static str,
    envelope: Envelope<T>,
) -> Result<T, GatewayError> {
    if envelope.ok {
        Ok(envelope.payload)
    } else {
        Err(GatewayError::Api {
            method,
            error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    user: Option<String>,
    #[serde(default)]
    reactions: Vec<RawReaction>,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    count: u32,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct ReactionsPayload {
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfoPayload {
    channel: Option<RawChannel>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_archived: bool,
}

#[derive(Debug, Deserialize)]
struct ChannelListPayload {
    #[serde(default)]
    channels: Vec<RawChannel>,
}

#[derive(Debug, Deserialize)]
struct UserInfoPayload {
    user: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: Option<String>,
    real_name: Option<String>,
    profile: Option<RawUserProfile>,
}

#[derive(Debug, Deserialize)]
struct RawUserProfile {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmptyPayload {}

fn sum_reactions(message: &RawMessage) -> u32 {
    message.reactions.iter().map(|reaction| reaction.count).sum()
}

fn profile_from_user(user: RawUser) -> UserProfile {
    let display_name = user
        .real_name
        .filter(|name| !name.trim().is_empty())
        .or(user.name)
        .unwrap_or_else(|| "there".to_owned());
    let email = user
        .profile
        .and_then(|profile| profile.email)
        .filter(|email| !email.trim().is_empty());

    UserProfile { email, display_name }
}

#[async_trait]
impl ChatGateway for HttpChatGateway {
    async fn message_author(
        &self,
        channel_id: &str,
        message_ts: &str,
    ) -> Result<Option<String>, GatewayError> {
        let envelope: Envelope<HistoryPayload> = self
            .client
            .get(self.url("conversations.history"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[
                ("channel", channel_id),
                ("latest", message_ts),
                ("limit", "1"),
                ("inclusive", "true"),
            ])
            .send()
            .await?
            .json()
            .await?;

        let payload = unwrap_envelope("conversations.history", envelope)?;
        Ok(payload.messages.into_iter().next().and_then(|message| message.user))
    }

    async fn channel_name(&self, channel_id: &str) -> Result<String, GatewayError> {
        let envelope: Envelope<ChannelInfoPayload> = self
            .client
            .get(self.url("conversations.info"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("channel", channel_id)])
            .send()
            .await?
            .json()
            .await?;

        let payload = unwrap_envelope("conversations.info", envelope)?;
        Ok(payload
            .channel
            .and_then(|channel| channel.name)
            .unwrap_or_else(|| channel_id.to_owned()))
    }

    async fn total_reactions(
        &self,
        channel_id: &str,
        message_ts: &str,
    ) -> Result<u32, GatewayError> {
        let envelope: Envelope<ReactionsPayload> = self
            .client
            .get(self.url("reactions.get"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("channel", channel_id), ("timestamp", message_ts)])
            .send()
            .await?
            .json()
            .await?;

        let payload = unwrap_envelope("reactions.get", envelope)?;
        Ok(payload.message.as_ref().map(sum_reactions).unwrap_or(0))
    }

    async fn user_profile(&self, user_id: &str) -> Result<UserProfile, GatewayError> {
        let envelope: Envelope<UserInfoPayload> = self
            .client
            .get(self.url("users.info"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("user", user_id)])
            .send()
            .await?
            .json()
            .await?;

        let payload = unwrap_envelope("users.info", envelope)?;
        let user = payload.user.ok_or(GatewayError::Api {
            method: "users.info",
            error: "user_not_found".to_owned(),
        })?;

        Ok(profile_from_user(user))
    }

    async fn post_dm(&self, user_id: &str, text: &str) -> Result<(), GatewayError> {
        // chat.postMessage opens the DM conversation implicitly when
        // given a user id as the channel.
        let envelope: Envelope<EmptyPayload> = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&serde_json::json!({ "channel": user_id, "text": text }))
            .send()
            .await?
            .json()
            .await?;

        unwrap_envelope("chat.postMessage", envelope)?;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, GatewayError> {
        let envelope: Envelope<ChannelListPayload> = self
            .client
            .get(self.url("conversations.list"))
            .bearer_auth(self.bot_token.expose_secret())
            .query(&[("types", "public_channel,private_channel"), ("limit", "200")])
            .send()
            .await?
            .json()
            .await?;

        let payload = unwrap_envelope("conversations.list", envelope)?;
        Ok(payload
            .channels
            .into_iter()
            .filter(|channel| !channel.is_archived)
            .filter_map(|channel| {
                Some(ChannelSummary {
                    id: channel.id?,
                    name: channel.name?,
                    is_private: channel.is_private,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        profile_from_user, sum_reactions, unwrap_envelope, Envelope, GatewayError, HistoryPayload,
        RawMessage, RawReaction, RawUser, RawUserProfile,
    };

    #[test]
    fn total_reactions_sums_across_emoji_types() {
        let message = RawMessage {
            user: None,
            reactions: vec![
                RawReaction { name: Some("thumbsup".to_owned()), count: 2 },
                RawReaction { name: Some("tada".to_owned()), count: 1 },
                RawReaction { name: Some("rocket".to_owned()), count: 4 },
            ],
        };

        assert_eq!(sum_reactions(&message), 7);
    }

    #[test]
    fn message_without_reactions_sums_to_zero() {
        let message = RawMessage { user: None, reactions: vec![] };
        assert_eq!(sum_reactions(&message), 0);
    }

    #[test]
    fn profile_prefers_real_name_and_filters_blank_email() {
        let profile = profile_from_user(RawUser {
            name: Some("jdoe".to_owned()),
            real_name: Some("Jane Doe".to_owned()),
            profile: Some(RawUserProfile { email: Some("  ".to_owned()) }),
        });

        assert_eq!(profile.display_name, "Jane Doe");
        assert_eq!(profile.email, None);
    }

    #[test]
    fn profile_falls_back_to_handle() {
        let profile = profile_from_user(RawUser {
            name: Some("jdoe".to_owned()),
            real_name: Some("  ".to_owned()),
            profile: Some(RawUserProfile { email: Some("jdoe@example.com".to_owned()) }),
        });

        assert_eq!(profile.display_name, "jdoe");
        assert_eq!(profile.email.as_deref(), Some("jdoe@example.com"));
    }

    #[test]
    fn error_envelope_surfaces_the_api_error() {
        let envelope: Envelope<HistoryPayload> = serde_json::from_str(
            r#"{"ok": false, "error": "channel_not_found", "messages": []}"#,
        )
        .expect("parse");

        let err = unwrap_envelope("conversations.history", envelope).unwrap_err();
        let GatewayError::Api { method, error } = err else {
            panic!("expected api error");
        };
        assert_eq!(method, "conversations.history");
        assert_eq!(error, "channel_not_found");
    }

    #[test]
    fn ok_envelope_yields_the_payload() {
        let envelope: Envelope<HistoryPayload> = serde_json::from_str(
            r#"{"ok": true, "messages": [{"user": "U1"}]}"#,
        )
        .expect("parse");

        let payload = unwrap_envelope("conversations.history", envelope).expect("ok");
        assert_eq!(payload.messages.len(), 1);
        assert_eq!(payload.messages[0].user.as_deref(), Some("U1"));
    }
}
