//! Inbound lead event signature verification.
//!
//! The provider signs each event body with HMAC-SHA256 keyed by the app
//! secret and sends `sha256=<hex digest>` in the `X-Hub-Signature-256`
//! header. The digest is computed over the raw body bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the event signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Verify an event body against its signature header.
///
/// Returns `true` without checking when no secret is configured or no header
/// was sent; callers that must fail closed check for the header themselves.
/// Otherwise the header must equal `"sha256=" + hex(hmac(secret, body))`.
pub fn verify_signature(raw_body: &[u8], signature_header: Option<&str>, secret: Option<&str>) -> bool {
    let (signature, secret) = match (signature_header, secret) {
        (Some(sig), Some(secret)) if is_signature_verification_enabled(Some(secret)) => {
            (sig, secret)
        }
        _ => return true,
    };

    let expected = match sign(raw_body, secret) {
        Some(expected) => expected,
        None => {
            warn!("webhook_signature_invalid_key");
            return false;
        }
    };

    // Constant-time comparison to prevent timing attacks
    let valid: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "webhook_signature_mismatch"
        );
    }

    valid
}

/// Compute the `sha256=<hex>` header value for `body`.
pub fn sign(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check if signature verification is enabled.
pub fn is_signature_verification_enabled(secret: Option<&str>) -> bool {
    secret.map(|k| !k.trim().is_empty()).unwrap_or(false)
}
