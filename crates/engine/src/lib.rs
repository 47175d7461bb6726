//! The delivery engine: turns a single `reaction_added` notification
//! into at most one POAP delivery per (message, author) pair.
//!
//! The evaluator is deliberately infallible at its boundary - every
//! failure is logged and swallowed so the webhook handler can always
//! acknowledge Slack within its deadline.

mod evaluator;

pub use evaluator::{DeliveryEvaluator, Evaluation};
