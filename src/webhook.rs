//! Webhook URL minting and signed-request verification.
//!
//! Integrations register request URLs of the form
//! `<base>/api/v1/integrations/<installationId>/{events,interactions}`.
//! Inbound bodies are verified per integration; the verifier here covers
//! the Slack-shaped scheme: HMAC-SHA256 over `v0:<timestamp>:<body>`,
//! hex-encoded with a `v0=` prefix, accepted only inside a five-minute
//! timestamp window.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use miette::Diagnostic;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and future skew) accepted for a signed timestamp.
pub const TIMESTAMP_WINDOW_SECS: i64 = 300;

/// Errors raised during signature verification.
#[derive(Debug, Error, Diagnostic)]
pub enum WebhookError {
    #[error("stale timestamp: {timestamp} is outside the {window}s window")]
    #[diagnostic(code(loomwork::webhook::stale_timestamp))]
    StaleTimestamp { timestamp: i64, window: i64 },

    #[error("signature mismatch")]
    #[diagnostic(code(loomwork::webhook::signature_mismatch))]
    SignatureMismatch,

    #[error("malformed signature: {0}")]
    #[diagnostic(code(loomwork::webhook::malformed))]
    Malformed(String),
}

/// Mint the events URL for an installation.
#[must_use]
pub fn events_url(base_url: &str, installation_id: &str) -> String {
    format!(
        "{}/api/v1/integrations/{installation_id}/events",
        base_url.trim_end_matches('/')
    )
}

/// Mint the interactions URL for an installation.
#[must_use]
pub fn interactions_url(base_url: &str, installation_id: &str) -> String {
    format!(
        "{}/api/v1/integrations/{installation_id}/interactions",
        base_url.trim_end_matches('/')
    )
}

/// Compute the `v0=`-prefixed signature for a request body.
#[must_use]
pub fn sign(signing_secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signed request.
///
/// Rejects timestamps outside the window before touching the MAC, then
/// compares in constant time via the MAC's own verifier.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: i64,
    body: &[u8],
    signature: &str,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let age = (now.timestamp() - timestamp).abs();
    if age > TIMESTAMP_WINDOW_SECS {
        return Err(WebhookError::StaleTimestamp {
            timestamp,
            window: TIMESTAMP_WINDOW_SECS,
        });
    }

    let hex_part = signature
        .strip_prefix("v0=")
        .ok_or_else(|| WebhookError::Malformed("missing v0= prefix".into()))?;
    let expected = hex::decode(hex_part).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_minting() {
        assert_eq!(
            events_url("https://hooks.example.com/", "inst-1"),
            "https://hooks.example.com/api/v1/integrations/inst-1/events"
        );
        assert_eq!(
            interactions_url("https://hooks.example.com", "inst-1"),
            "https://hooks.example.com/api/v1/integrations/inst-1/interactions"
        );
    }

    #[test]
    fn sign_then_verify_accepts() {
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = sign("secret", ts, b"{\"ok\":true}");
        verify_signature("secret", ts, b"{\"ok\":true}", &sig, now).unwrap();
    }

    #[test]
    fn tampered_body_is_rejected() {
        let now = Utc::now();
        let ts = now.timestamp();
        let sig = sign("secret", ts, b"original");
        let err = verify_signature("secret", ts, b"tampered", &sig, now).unwrap_err();
        assert!(matches!(err, WebhookError::SignatureMismatch));
    }

    #[test]
    fn stale_timestamp_is_rejected_before_mac_check() {
        let now = Utc::now();
        let ts = now.timestamp() - TIMESTAMP_WINDOW_SECS - 1;
        let sig = sign("secret", ts, b"body");
        let err = verify_signature("secret", ts, b"body", &sig, now).unwrap_err();
        assert!(matches!(err, WebhookError::StaleTimestamp { .. }));
    }
}
