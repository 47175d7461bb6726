//! JSON admin API mirroring the slash commands: rule management and the
//! channel listing the rule form needs.
//!
//! Endpoints:
//! - `GET    /poap-rules`        — list active rules
//! - `POST   /poap-rules`        — create a rule
//! - `DELETE /poap-rules/{id}`   — deactivate a rule (soft delete)
//! - `GET    /slack-channels`    — non-archived channels in the workspace

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use poapbot_core::domain::rule::{NewRule, RuleId};

use crate::bootstrap::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    pub channel: String,
    pub reaction_threshold: u32,
    pub event_id: String,
    pub poap_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedRuleResponse {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminError {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/poap-rules", get(list_rules).post(create_rule))
        .route("/poap-rules/{id}", delete(deactivate_rule))
        .route("/slack-channels", get(list_channels))
        .with_state(state)
}

fn internal_error(context: &'static str, error: &impl std::fmt::Display) -> Response {
    error!(event_name = "admin.request.failed", context, error = %error, "admin request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AdminError { error: "internal error".to_string() }),
    )
        .into_response()
}

async fn list_rules(State(state): State<AppState>) -> Response {
    match state.rules.list_active().await {
        Ok(rules) => Json(rules).into_response(),
        Err(repo_error) => internal_error("list_rules", &repo_error),
    }
}

async fn create_rule(
    State(state): State<AppState>,
    Json(request): Json<CreateRuleRequest>,
) -> Response {
    let rule = match NewRule::new(
        request.channel,
        request.reaction_threshold,
        request.event_id,
        request.poap_name,
    ) {
        Ok(rule) => rule,
        Err(domain_error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AdminError { error: domain_error.to_string() }),
            )
                .into_response();
        }
    };

    match state.rules.create(rule.clone()).await {
        Ok(id) => {
            info!(
                event_name = "admin.rule.created",
                rule_id = id.0,
                channel = %rule.channel,
                threshold = rule.reaction_threshold,
                "POAP rule created"
            );
            (StatusCode::CREATED, Json(CreatedRuleResponse { id: id.0 })).into_response()
        }
        Err(repo_error) => internal_error("create_rule", &repo_error),
    }
}

async fn deactivate_rule(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.rules.deactivate(RuleId(id)).await {
        Ok(true) => {
            info!(event_name = "admin.rule.deactivated", rule_id = id, "POAP rule deactivated");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(AdminError { error: format!("no active rule with id {id}") }),
        )
            .into_response(),
        Err(repo_error) => internal_error("deactivate_rule", &repo_error),
    }
}

async fn list_channels(State(state): State<AppState>) -> Response {
    match state.chat.list_channels().await {
        Ok(channels) => Json(channels).into_response(),
        Err(gateway_error) => internal_error("list_channels", &gateway_error),
    }
}
