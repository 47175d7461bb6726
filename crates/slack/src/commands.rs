use serde::{Deserialize, Serialize};
use thiserror::Error;

use poapbot_core::domain::delivery::DeliveryStats;
use poapbot_core::domain::rule::{NewRule, Rule};
use poapbot_core::errors::DomainError;

/// Form fields Slack posts for a slash command invocation. Only the
/// fields this bot reads are modeled.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    #[serde(default)]
    pub text: String,
    pub user_id: String,
    pub channel_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PoapCommand {
    Stats,
    Rules,
    Create(NewRule),
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("usage: /poap-create <channel> <threshold> <poap-event-id> <poap-name>")]
    CreateUsage,
    #[error("reaction threshold must be a positive number, got `{0}`")]
    InvalidThreshold(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub fn parse_command(payload: &SlashCommandPayload) -> Result<PoapCommand, CommandParseError> {
    match payload.command.as_str() {
        "/poap-stats" => Ok(PoapCommand::Stats),
        "/poap-rules" => Ok(PoapCommand::Rules),
        "/poap-admin" | "/poap-help" => Ok(PoapCommand::Help),
        "/poap-create" => parse_create(&payload.text),
        other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
    }
}

fn parse_create(text: &str) -> Result<PoapCommand, CommandParseError> {
    let args: Vec<&str> = text.split_whitespace().collect();
    if args.len() < 4 {
        return Err(CommandParseError::CreateUsage);
    }

    let threshold = args[1]
        .parse::<u32>()
        .map_err(|_| CommandParseError::InvalidThreshold(args[1].to_owned()))?;
    if threshold < 1 {
        return Err(CommandParseError::InvalidThreshold(args[1].to_owned()));
    }

    let poap_name = args[3..].join(" ").replace('"', "");
    let rule = NewRule::new(args[0], threshold, args[2], poap_name)?;
    Ok(PoapCommand::Create(rule))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

/// Body returned synchronously to Slack for a slash command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    pub text: String,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self { response_type: ResponseType::Ephemeral, text: text.into() }
    }

    pub fn in_channel(text: impl Into<String>) -> Self {
        Self { response_type: ResponseType::InChannel, text: text.into() }
    }
}

pub fn stats_message(stats: &DeliveryStats) -> CommandResponse {
    CommandResponse::ephemeral(format!(
        "📊 POAP Stats:\n\
         • Total POAPs delivered: {}\n\
         • Unique recipients: {}\n\
         • Different POAP events: {}",
        stats.total_deliveries, stats.unique_recipients, stats.unique_events
    ))
}

pub fn rules_message(rules: &[Rule]) -> CommandResponse {
    if rules.is_empty() {
        return CommandResponse::ephemeral(
            "No active POAP rules found.\n\nUse `/poap-create` to create a new rule.",
        );
    }

    let mut text = String::from("🏆 Active POAP Rules:\n\n");
    for rule in rules {
        text.push_str(&format!(
            "• Channel: #{}\n  Threshold: {} reactions\n  POAP: {}\n\n",
            rule.channel, rule.reaction_threshold, rule.poap_name
        ));
    }

    CommandResponse::ephemeral(text)
}

pub fn create_success_message(rule: &NewRule) -> CommandResponse {
    CommandResponse::in_channel(format!(
        "✅ POAP rule created successfully!\n\n\
         📍 Channel: #{channel}\n\
         ⚡ Threshold: {threshold} reactions\n\
         🎯 POAP: {name}\n\
         🆔 Event ID: {event}\n\n\
         Users will now receive this POAP when their messages in #{channel} get {threshold}+ reactions!",
        channel = rule.channel,
        threshold = rule.reaction_threshold,
        name = rule.poap_name,
        event = rule.event_id.0,
    ))
}

pub fn help_message() -> CommandResponse {
    CommandResponse::ephemeral(
        "🔧 POAP Bot\n\n\
         📋 Available Commands:\n\
         • `/poap-stats` - View delivery statistics\n\
         • `/poap-rules` - List active rules\n\
         • `/poap-create <channel> <threshold> <poap-event-id> <poap-name>` - Create new rule\n\
         • `/poap-admin` - Show this help\n\n\
         💡 Tip: the admin web page offers the same rule management.",
    )
}

pub fn error_message(error: &CommandParseError) -> CommandResponse {
    match error {
        CommandParseError::CreateUsage => CommandResponse::ephemeral(
            "❌ Usage: `/poap-create <channel> <threshold> <poap-event-id> <poap-name>`\n\n\
             Example: `/poap-create general 3 event-123 \"Community Engagement POAP\"`",
        ),
        other => CommandResponse::ephemeral(format!("❌ {other}")),
    }
}

#[cfg(test)]
mod tests {
    use poapbot_core::domain::delivery::DeliveryStats;

    use super::{
        parse_command, stats_message, CommandParseError, PoapCommand, ResponseType,
        SlashCommandPayload,
    };

    fn payload(command: &str, text: &str) -> SlashCommandPayload {
        SlashCommandPayload {
            command: command.to_owned(),
            text: text.to_owned(),
            user_id: "U1".to_owned(),
            channel_id: "C1".to_owned(),
        }
    }

    #[test]
    fn routes_known_commands() {
        assert_eq!(parse_command(&payload("/poap-stats", "")).expect("parse"), PoapCommand::Stats);
        assert_eq!(parse_command(&payload("/poap-rules", "")).expect("parse"), PoapCommand::Rules);
        assert_eq!(parse_command(&payload("/poap-admin", "")).expect("parse"), PoapCommand::Help);
    }

    #[test]
    fn rejects_unknown_commands() {
        let err = parse_command(&payload("/quote", "new")).unwrap_err();
        assert_eq!(err, CommandParseError::UnsupportedCommand("/quote".to_owned()));
    }

    #[test]
    fn parses_create_with_quoted_multi_word_name() {
        let command =
            parse_command(&payload("/poap-create", r#"#general 3 event-123 "Community POAP""#))
                .expect("parse");

        let PoapCommand::Create(rule) = command else { panic!("expected create") };
        assert_eq!(rule.channel, "general");
        assert_eq!(rule.reaction_threshold, 3);
        assert_eq!(rule.event_id.0, "event-123");
        assert_eq!(rule.poap_name, "Community POAP");
    }

    #[test]
    fn create_with_too_few_args_reports_usage() {
        let err = parse_command(&payload("/poap-create", "general 3")).unwrap_err();
        assert_eq!(err, CommandParseError::CreateUsage);
    }

    #[test]
    fn create_with_non_numeric_threshold_is_rejected() {
        let err = parse_command(&payload("/poap-create", "general lots event-123 POAP"))
            .unwrap_err();
        assert_eq!(err, CommandParseError::InvalidThreshold("lots".to_owned()));

        let err =
            parse_command(&payload("/poap-create", "general 0 event-123 POAP")).unwrap_err();
        assert!(matches!(
            err,
            CommandParseError::InvalidThreshold(_) | CommandParseError::Domain(_)
        ));
    }

    #[test]
    fn stats_response_is_ephemeral() {
        let response = stats_message(&DeliveryStats {
            total_deliveries: 12,
            unique_recipients: 7,
            unique_events: 3,
        });
        assert_eq!(response.response_type, ResponseType::Ephemeral);
        assert!(response.text.contains("12"));
        assert!(response.text.contains("7"));
        assert!(response.text.contains("3"));
    }
}
