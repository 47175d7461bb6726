//! Slack integration - the workspace-facing edge of poapbot.
//!
//! This crate provides:
//! - **Events** (`events`) - inbound Events API payload parsing
//!   (`url_verification` challenges, `reaction_added` callbacks)
//! - **Signature** (`signature`) - `v0=` request signing verification
//! - **Gateway** (`gateway`) - the Web API collaborator trait used by the
//!   delivery engine (message author lookup, reaction aggregates, user
//!   profiles, direct messages) plus its reqwest implementation
//! - **Commands** (`commands`) - `/poap-stats`, `/poap-rules`,
//!   `/poap-create`, `/poap-admin` parsing and response text
//!
//! # Getting started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Subscribe to the `reaction_added` bot event and point the request
//!    URL at `/slack/events`
//! 3. Add the slash commands listed above
//! 4. Set `POAPBOT_SLACK_BOT_TOKEN` and `POAPBOT_SLACK_SIGNING_SECRET`

pub mod commands;
pub mod events;
pub mod gateway;
pub mod signature;
