use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use poapbot_core::config::PoapConfig;
use poapbot_core::domain::rule::PoapEventId;

/// Issues one-time claim links for a POAP drop. Infallible by contract:
/// implementations must always hand back a usable link string, degrading
/// to a placeholder when the provider is unreachable.
#[async_trait]
pub trait ClaimLinkIssuer: Send + Sync {
    async fn issue(&self, event_id: &PoapEventId, recipient_email: &str) -> String;
}

#[derive(Debug, Error)]
enum IssueError {
    #[error("provider transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("credential exchange rejected: {0}")]
    TokenExchange(String),
    #[error("issuance endpoint returned status {0}")]
    Endpoint(u16),
    #[error("issuance response carried neither claim_url nor qr_hash")]
    EmptyResponse,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    refresh_after: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_after
    }
}

/// Refresh at 23/24 of the token lifetime so concurrent issuance calls
/// never race the provider's exact expiry.
fn refresh_deadline(lifetime_secs: u64) -> Duration {
    Duration::from_secs(lifetime_secs.saturating_mul(23) / 24)
}

pub struct PoapClient {
    client: reqwest::Client,
    config: PoapConfig,
    /// Single shared slot. A cold cache can trigger concurrent
    /// exchanges; the exchange is idempotent so last-write-wins is fine.
    token_cache: RwLock<Option<CachedToken>>,
}

impl PoapClient {
    pub fn new(config: PoapConfig) -> Self {
        Self { client: reqwest::Client::new(), config, token_cache: RwLock::new(None) }
    }

    fn mock_claim_link(&self, event_id: &PoapEventId) -> String {
        format!(
            "{}/claim/mock-{}-{}",
            self.config.claim_base_url.trim_end_matches('/'),
            event_id.0,
            Utc::now().timestamp_millis()
        )
    }

    fn fallback_claim_link(&self, event_id: &PoapEventId) -> String {
        format!(
            "{}/claim/fallback-{}-{}",
            self.config.claim_base_url.trim_end_matches('/'),
            event_id.0,
            Utc::now().timestamp_millis()
        )
    }

    async fn bearer_token(&self) -> Result<String, IssueError> {
        let now = Instant::now();
        {
            let cache = self.token_cache.read().await;
            if let Some(token) = cache.as_ref().filter(|token| token.is_fresh(now)) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.exchange_credentials().await?;
        let mut cache = self.token_cache.write().await;
        *cache = Some(token.clone());
        Ok(token.access_token)
    }

    async fn exchange_credentials(&self) -> Result<CachedToken, IssueError> {
        let (client_id, client_secret) = match (&self.config.client_id, &self.config.client_secret)
        {
            (Some(id), Some(secret)) => (id.as_str(), secret),
            _ => {
                return Err(IssueError::TokenExchange(
                    "client credentials are not configured".to_owned(),
                ))
            }
        };

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: Option<u64>,
        }

        let response = self
            .client
            .post(&self.config.auth_url)
            .json(&serde_json::json!({
                "audience": self.config.audience,
                "grant_type": "client_credentials",
                "client_id": client_id,
                "client_secret": client_secret.expose_secret(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IssueError::TokenExchange(format!(
                "auth endpoint returned status {}",
                response.status().as_u16()
            )));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = token.expires_in.unwrap_or(self.config.token_lifetime_secs);

        debug!(
            event_name = "poap.token.refreshed",
            lifetime_secs = lifetime,
            "bearer credential refreshed"
        );

        Ok(CachedToken {
            access_token: token.access_token,
            refresh_after: Instant::now() + refresh_deadline(lifetime),
        })
    }

    async fn issue_via_provider(
        &self,
        api_key: &SecretString,
        event_id: &PoapEventId,
        recipient_email: &str,
    ) -> Result<String, IssueError> {
        let bearer = self.bearer_token().await?;

        #[derive(Deserialize)]
        struct ClaimResponse {
            claim_url: Option<String>,
            qr_hash: Option<String>,
        }

        let response = self
            .client
            .post(format!("{}/actions/claim-qr", self.config.api_url.trim_end_matches('/')))
            .header("X-API-Key", api_key.expose_secret())
            .bearer_auth(bearer)
            .json(&serde_json::json!({
                "event_id": event_id.0,
                "recipient": recipient_email,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IssueError::Endpoint(response.status().as_u16()));
        }

        let claim: ClaimResponse = response.json().await?;
        claim.claim_url.or(claim.qr_hash).ok_or(IssueError::EmptyResponse)
    }
}

#[async_trait]
impl ClaimLinkIssuer for PoapClient {
    async fn issue(&self, event_id: &PoapEventId, recipient_email: &str) -> String {
        let Some(api_key) = self.config.api_key.clone() else {
            debug!(
                event_name = "poap.issue.mock",
                event_id = %event_id.0,
                recipient = recipient_email,
                "no API key configured; synthesizing mock claim link"
            );
            return self.mock_claim_link(event_id);
        };

        match self.issue_via_provider(&api_key, event_id, recipient_email).await {
            Ok(link) => {
                info!(
                    event_name = "poap.issue.succeeded",
                    event_id = %event_id.0,
                    "claim link issued"
                );
                link
            }
            Err(error) => {
                // Degraded, not hidden: the recipient may get a link
                // that cannot be redeemed while the provider is down.
                warn!(
                    event_name = "poap.issue.fallback",
                    event_id = %event_id.0,
                    error = %error,
                    "claim link issuance failed; using fallback link"
                );
                self.fallback_claim_link(event_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use poapbot_core::config::{AppConfig, PoapConfig};
    use poapbot_core::domain::rule::PoapEventId;

    use super::{refresh_deadline, CachedToken, ClaimLinkIssuer, PoapClient};

    fn unconfigured() -> PoapConfig {
        AppConfig::default().poap
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_to_mock_link() {
        let client = PoapClient::new(unconfigured());
        let link = client.issue(&PoapEventId("event-123".to_owned()), "jdoe@example.com").await;

        assert!(link.starts_with("https://poap.xyz/claim/mock-event-123-"));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_placeholder_link() {
        // Credentials are present but point at an unroutable endpoint,
        // so the primary path fails and the fallback must kick in.
        let mut config = unconfigured();
        config.api_key = Some("poap-key".to_string().into());
        config.client_id = Some("client".to_owned());
        config.client_secret = Some("secret".to_string().into());
        config.auth_url = "http://127.0.0.1:1/oauth/token".to_owned();
        config.api_url = "http://127.0.0.1:1".to_owned();

        let client = PoapClient::new(config);
        let link = client.issue(&PoapEventId("event-9".to_owned()), "jdoe@example.com").await;

        assert!(link.starts_with("https://poap.xyz/claim/fallback-event-9-"));
    }

    #[test]
    fn refresh_deadline_is_twenty_three_twenty_fourths() {
        assert_eq!(refresh_deadline(24 * 60 * 60), Duration::from_secs(23 * 60 * 60));
        assert_eq!(refresh_deadline(60), Duration::from_secs(57));
    }

    #[test]
    fn cached_token_freshness_flips_at_the_deadline() {
        let now = Instant::now();
        let token = CachedToken {
            access_token: "tok".to_owned(),
            refresh_after: now + Duration::from_secs(10),
        };

        assert!(token.is_fresh(now));
        assert!(!token.is_fresh(now + Duration::from_secs(10)));
    }
}
