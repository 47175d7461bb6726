//! Slack request signing (the `v0=` scheme).
//!
//! Every Events API and slash-command request carries
//! `X-Slack-Request-Timestamp` and `X-Slack-Signature` headers; the
//! signature is an HMAC-SHA256 of `v0:{timestamp}:{body}` keyed with the
//! app's signing secret. Requests older than five minutes are rejected
//! to blunt replay.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_VERSION: &str = "v0";
const MAX_TIMESTAMP_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("missing request timestamp header")]
    MissingTimestamp,
    #[error("request timestamp is not a unix epoch integer")]
    MalformedTimestamp,
    #[error("request timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("signature does not match request body")]
    Mismatch,
}

/// Computes the expected `v0=...` signature for a request body.
pub fn sign(signing_secret: &SecretString, timestamp: i64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.expose_secret().as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(format!("{SIGNATURE_VERSION}:{timestamp}:{body}").as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut out = String::with_capacity(3 + digest.len() * 2);
    out.push_str(SIGNATURE_VERSION);
    out.push('=');
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Verifies an inbound request against the signing secret.
///
/// `now_epoch_secs` is passed in rather than read from the clock so the
/// staleness window is testable.
pub fn verify(
    signing_secret: &SecretString,
    timestamp_header: Option<&str>,
    signature_header: Option<&str>,
    body: &str,
    now_epoch_secs: i64,
) -> Result<(), SignatureError> {
    let provided = signature_header.ok_or(SignatureError::MissingSignature)?;
    let timestamp_raw = timestamp_header.ok_or(SignatureError::MissingTimestamp)?;
    let timestamp =
        timestamp_raw.trim().parse::<i64>().map_err(|_| SignatureError::MalformedTimestamp)?;

    if (now_epoch_secs - timestamp).abs() > MAX_TIMESTAMP_SKEW_SECS {
        return Err(SignatureError::StaleTimestamp);
    }

    let expected = sign(signing_secret, timestamp, body);
    if constant_time_eq(expected.as_bytes(), provided.trim().as_bytes()) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
