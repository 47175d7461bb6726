//! Core domain model and configuration for poapbot.
//!
//! Poapbot watches a Slack workspace for messages that accumulate enough
//! emoji reactions and rewards the message author with a claimable POAP
//! (a digital collectible) delivered over email. This crate holds the
//! pieces every other crate agrees on:
//!
//! - **Domain** (`domain`) - rules, reaction snapshots, delivery records
//! - **Configuration** (`config`) - TOML file + `POAPBOT_*` env overrides
//! - **Errors** (`errors`) - the shared domain error taxonomy
//!
//! Nothing in here performs I/O; persistence and integrations live in the
//! `poapbot-db`, `poapbot-slack`, `poapbot-poap` and `poapbot-notify`
//! crates, and the delivery state machine in `poapbot-engine`.

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::delivery::{DeliveryRecord, DeliveryStats, NewDeliveryRecord};
pub use domain::reaction::{ReactionEvent, ReactionSnapshot};
pub use domain::rule::{NewRule, PoapEventId, Rule, RuleId};
pub use errors::DomainError;
