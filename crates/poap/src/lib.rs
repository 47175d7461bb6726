//! Claim-link issuance against the POAP provider.
//!
//! The issuer owns the provider credential lifecycle: a bearer token
//! obtained through an OAuth client-credentials exchange, cached in a
//! single process-wide slot and refreshed well before its nominal
//! expiry. Issuance itself never fails from the caller's point of view -
//! any provider problem degrades to a synthesized placeholder link so
//! the delivery pipeline keeps moving while the outage is logged.

mod client;

pub use client::{ClaimLinkIssuer, PoapClient};
