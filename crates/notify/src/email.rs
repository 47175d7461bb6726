use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{error, info};

use poapbot_core::config::EmailConfig;

const CLAIM_EMAIL_TEMPLATE: &str = include_str!("templates/claim_email.html");
const TEMPLATE_NAME: &str = "claim_email";

/// Result of an email attempt. `success == false` never comes with a
/// panic or an `Err` - callers branch on the flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailOutcome {
    pub success: bool,
    /// True when no transport is configured and the send was only
    /// logged.
    pub mock: bool,
    pub error: Option<String>,
}

impl EmailOutcome {
    fn sent() -> Self {
        Self { success: true, mock: false, error: None }
    }

    fn mocked() -> Self {
        Self { success: true, mock: true, error: None }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self { success: false, mock: false, error: Some(error.into()) }
    }
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("claim email template failed to compile: {0}")]
    Compile(#[from] tera::Error),
}

#[async_trait]
pub trait EmailNotifier: Send + Sync {
    /// Sends the claim email. Never returns `Err`; failures are folded
    /// into the outcome.
    async fn send_claim_email(
        &self,
        recipient: &str,
        recipient_name: &str,
        poap_name: &str,
        claim_link: Option<&str>,
    ) -> EmailOutcome;
}

enum Transport {
    Http { api_url: String, api_key: SecretString, from_address: String },
    Mock,
}

pub struct HttpEmailNotifier {
    client: reqwest::Client,
    transport: Transport,
    templates: Tera,
}

impl HttpEmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self, TemplateError> {
        let mut templates = Tera::default();
        templates.add_raw_template(TEMPLATE_NAME, CLAIM_EMAIL_TEMPLATE)?;

        let transport = match (config.api_url, config.api_key, config.from_address) {
            (Some(api_url), Some(api_key), Some(from_address)) => {
                Transport::Http { api_url, api_key, from_address }
            }
            _ => {
                info!(
                    event_name = "email.transport.mock",
                    "email transport not configured; sends will be logged only"
                );
                Transport::Mock
            }
        };

        Ok(Self { client: reqwest::Client::new(), transport, templates })
    }

    pub fn is_mock(&self) -> bool {
        matches!(self.transport, Transport::Mock)
    }

    fn render_body(
        &self,
        recipient_name: &str,
        poap_name: &str,
        claim_link: Option<&str>,
    ) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("recipient_name", recipient_name);
        context.insert("poap_name", poap_name);
        context.insert("claim_link", &claim_link);
        self.templates.render(TEMPLATE_NAME, &context)
    }
}

fn subject(poap_name: &str) -> String {
    format!("🎉 You've earned a POAP: {poap_name}!")
}

#[async_trait]
impl EmailNotifier for HttpEmailNotifier {
    async fn send_claim_email(
        &self,
        recipient: &str,
        recipient_name: &str,
        poap_name: &str,
        claim_link: Option<&str>,
    ) -> EmailOutcome {
        let (api_url, api_key, from_address) = match &self.transport {
            Transport::Http { api_url, api_key, from_address } => {
                (api_url, api_key, from_address)
            }
            Transport::Mock => {
                info!(
                    event_name = "email.send.mock",
                    recipient,
                    poap_name,
                    claim_link = claim_link.unwrap_or("to be generated"),
                    "would send POAP claim email"
                );
                return EmailOutcome::mocked();
            }
        };

        let html = match self.render_body(recipient_name, poap_name, claim_link) {
            Ok(html) => html,
            Err(render_error) => {
                error!(
                    event_name = "email.send.render_failed",
                    recipient,
                    error = %render_error,
                    "claim email body failed to render"
                );
                return EmailOutcome::failed(render_error.to_string());
            }
        };

        let request = self
            .client
            .post(api_url)
            .bearer_auth(api_key.expose_secret())
            .json(&serde_json::json!({
                "from": from_address,
                "to": recipient,
                "subject": subject(poap_name),
                "html": html,
            }))
            .send()
            .await;

        match request {
            Ok(response) if response.status().is_success() => {
                info!(event_name = "email.send.succeeded", recipient, "POAP claim email sent");
                EmailOutcome::sent()
            }
            Ok(response) => {
                let status = response.status().as_u16();
                error!(
                    event_name = "email.send.rejected",
                    recipient,
                    status,
                    "email API rejected the send"
                );
                EmailOutcome::failed(format!("email API returned status {status}"))
            }
            Err(transport_error) => {
                error!(
                    event_name = "email.send.transport_failed",
                    recipient,
                    error = %transport_error,
                    "email transport failure"
                );
                EmailOutcome::failed(transport_error.to_string())
            }
        }
    }
}
