//! Outbound notifications: the claim email and the in-chat direct
//! messages that bracket a delivery.
//!
//! The email side never raises past its boundary - a missing transport
//! configuration turns it into a mock that logs what it would have sent,
//! so the rest of the pipeline (dedup marking, audit recording) can
//! exercise its logic in environments without real credentials.

pub mod dm;
mod email;

pub use email::{EmailNotifier, EmailOutcome, HttpEmailNotifier, TemplateError};
