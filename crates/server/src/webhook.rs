//! The single Slack-facing endpoint. Events API callbacks and slash
//! commands both arrive here; the raw body is kept around for the
//! signature check before any parsing happens.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use poapbot_slack::commands::{
    self, CommandResponse, PoapCommand, SlashCommandPayload,
};
use poapbot_slack::events::{parse_payload, InboundPayload, SlackEvent};
use poapbot_slack::signature;

use crate::bootstrap::AppState;

pub fn router(state: AppState) -> Router {
    Router::new().route("/slack/events", post(slack_events)).with_state(state)
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let verification = signature::verify(
        &state.signing_secret,
        header_str(&headers, "x-slack-request-timestamp"),
        header_str(&headers, "x-slack-signature"),
        &body,
        Utc::now().timestamp(),
    );
    if let Err(rejection) = verification {
        warn!(
            event_name = "webhook.signature.rejected",
            reason = %rejection,
            "rejecting unsigned or stale Slack request"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let is_form = header_str(&headers, CONTENT_TYPE.as_str())
        .is_some_and(|content_type| content_type.starts_with("application/x-www-form-urlencoded"));
    if is_form {
        return slash_command(&state, &body).await;
    }

    match parse_payload(&body) {
        Ok(InboundPayload::UrlVerification { challenge }) => challenge.into_response(),
        Ok(InboundPayload::EventCallback(SlackEvent::ReactionAdded(event))) => {
            debug!(
                event_name = "webhook.reaction_added",
                channel_id = %event.channel_id,
                message_ts = %event.message_ts,
                reaction = %event.reaction,
                "dispatching reaction for evaluation"
            );
            let evaluator = state.evaluator.clone();
            let reaction = event.to_reaction_event();
            // Slack expects an ack within three seconds; evaluation runs
            // detached and never reports back to the webhook.
            tokio::spawn(async move {
                evaluator.evaluate(reaction).await;
            });
            StatusCode::OK.into_response()
        }
        Ok(InboundPayload::EventCallback(SlackEvent::Unsupported { event_type })) => {
            debug!(
                event_name = "webhook.event.ignored",
                event_type = %event_type,
                "acknowledging unsubscribed event type"
            );
            StatusCode::OK.into_response()
        }
        Ok(InboundPayload::Unsupported { payload_type }) => {
            debug!(
                event_name = "webhook.payload.ignored",
                payload_type = %payload_type,
                "acknowledging unsupported payload type"
            );
            StatusCode::OK.into_response()
        }
        Err(parse_error) => {
            warn!(
                event_name = "webhook.payload.malformed",
                error = %parse_error,
                "could not parse Events API payload"
            );
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn slash_command(state: &AppState, body: &str) -> Response {
    let payload: SlashCommandPayload = match serde_urlencoded::from_str(body) {
        Ok(payload) => payload,
        Err(parse_error) => {
            warn!(
                event_name = "webhook.command.malformed",
                error = %parse_error,
                "could not parse slash command form body"
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    info!(
        event_name = "webhook.command.received",
        command = %payload.command,
        user_id = %payload.user_id,
        "slash command received"
    );

    let response = match commands::parse_command(&payload) {
        Ok(command) => dispatch_command(state, command).await,
        Err(parse_error) => commands::error_message(&parse_error),
    };

    Json(response).into_response()
}

async fn dispatch_command(state: &AppState, command: PoapCommand) -> CommandResponse {
    match command {
        PoapCommand::Stats => match state.deliveries.stats().await {
            Ok(stats) => commands::stats_message(&stats),
            Err(repo_error) => command_failure("stats", &repo_error),
        },
        PoapCommand::Rules => match state.rules.list_active().await {
            Ok(rules) => commands::rules_message(&rules),
            Err(repo_error) => command_failure("rules", &repo_error),
        },
        PoapCommand::Create(rule) => match state.rules.create(rule.clone()).await {
            Ok(_) => commands::create_success_message(&rule),
            Err(repo_error) => command_failure("create", &repo_error),
        },
        PoapCommand::Help => commands::help_message(),
    }
}

fn command_failure(command: &str, repo_error: &impl std::fmt::Display) -> CommandResponse {
    error!(
        event_name = "webhook.command.failed",
        command,
        error = %repo_error,
        "slash command handler failed"
    );
    CommandResponse::ephemeral("❌ Something went wrong. Please try again.")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use secrecy::SecretString;
    use tower::ServiceExt;

    use poapbot_core::config::{AppConfig, EmailConfig};
    use poapbot_db::repositories::{
        InMemoryDeliveryLog, InMemoryReactionLedger, InMemoryRuleRepository, RuleRepository,
    };
    use poapbot_engine::DeliveryEvaluator;
    use poapbot_notify::HttpEmailNotifier;
    use poapbot_poap::PoapClient;
    use poapbot_slack::gateway::HttpChatGateway;
    use poapbot_slack::signature;

    use crate::bootstrap::AppState;

    fn signing_secret() -> SecretString {
        String::from("test-signing-secret").into()
    }

    pub(crate) fn test_state() -> (AppState, Arc<InMemoryRuleRepository>) {
        let rules = Arc::new(InMemoryRuleRepository::default());
        let ledger = Arc::new(InMemoryReactionLedger::default());
        let deliveries = Arc::new(InMemoryDeliveryLog::default());
        // Unroutable gateway: the tested paths never reach Slack.
        let chat = Arc::new(HttpChatGateway::with_api_base(
            String::from("xoxb-test").into(),
            "http://127.0.0.1:1",
        ));
        let issuer = Arc::new(PoapClient::new(AppConfig::default().poap));
        let notifier = Arc::new(
            HttpEmailNotifier::new(EmailConfig { api_url: None, api_key: None, from_address: None })
                .expect("template compiles"),
        );

        let evaluator = Arc::new(DeliveryEvaluator::new(
            rules.clone(),
            ledger,
            deliveries.clone(),
            chat.clone(),
            issuer,
            notifier,
        ));

        (
            AppState {
                signing_secret: signing_secret(),
                rules: rules.clone(),
                deliveries,
                chat,
                evaluator,
            },
            rules,
        )
    }

    fn signed_request(body: &str, content_type: &str) -> Request<Body> {
        let timestamp = Utc::now().timestamp();
        let sig = signature::sign(&signing_secret(), timestamp, body);

        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", content_type)
            .header("x-slack-request-timestamp", timestamp.to_string())
            .header("x-slack-signature", sig)
            .body(Body::from(body.to_owned()))
            .expect("request")
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn rejects_request_without_signature() {
        let (state, _) = test_state();
        let router = super::router(state);

        let request = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"url_verification","challenge":"abc"}"#))
            .expect("request");

        let response = router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn rejects_stale_timestamp() {
        let (state, _) = test_state();
        let router = super::router(state);

        let body = r#"{"type":"url_verification","challenge":"abc"}"#;
        let stale = Utc::now().timestamp() - 10 * 60;
        let sig = signature::sign(&signing_secret(), stale, body);
        let request = Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .header("x-slack-request-timestamp", stale.to_string())
            .header("x-slack-signature", sig)
            .body(Body::from(body))
            .expect("request");

        let response = router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn echoes_url_verification_challenge() {
        let (state, _) = test_state();
        let router = super::router(state);

        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;
        let response =
            router.oneshot(signed_request(body, "application/json")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "abc123");
    }

    #[tokio::test]
    async fn acknowledges_unsupported_event_types() {
        let (state, _) = test_state();
        let router = super::router(state);

        let body = r#"{"type":"event_callback","event":{"type":"message","user":"U1"}}"#;
        let response =
            router.oneshot(signed_request(body, "application/json")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn slash_create_persists_a_rule() {
        let (state, rules) = test_state();
        let router = super::router(state);

        let body = "command=%2Fpoap-create&text=%23general%203%20event-123%20Community%20POAP\
                    &user_id=U1&channel_id=C1";
        let response = router
            .oneshot(signed_request(body, "application/x-www-form-urlencoded"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_string(response).await;
        assert!(payload.contains("in_channel"));
        assert!(payload.contains("rule created successfully"));

        let active = rules.list_active().await.expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].channel, "general");
        assert_eq!(active[0].reaction_threshold, 3);
    }

    #[tokio::test]
    async fn slash_stats_reports_empty_counters() {
        let (state, _) = test_state();
        let router = super::router(state);

        let body = "command=%2Fpoap-stats&text=&user_id=U1&channel_id=C1";
        let response = router
            .oneshot(signed_request(body, "application/x-www-form-urlencoded"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_string(response).await;
        assert!(payload.contains("ephemeral"));
        assert!(payload.contains("Total POAPs delivered: 0"));
    }
}
