//! HMAC-SHA256 signature verification for provider notifications.
//!
//! Two canonical messages exist and must not be mixed up:
//! - direct verification signs `"<provider_order_id>|<provider_payment_id>"`
//!   with the order-verification secret;
//! - webhooks sign the exact raw request body with the webhook secret.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Secret used to verify client-relayed checkout signatures
#[derive(Clone)]
pub struct OrderSecret(SecretString);

/// Secret used to verify provider webhook deliveries
#[derive(Clone)]
pub struct WebhookSecret(SecretString);

impl OrderSecret {
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }

    pub(crate) fn key(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl WebhookSecret {
    pub fn new(secret: SecretString) -> Self {
        Self(secret)
    }

    pub(crate) fn key(&self) -> &[u8] {
        self.0.expose_secret().as_bytes()
    }
}

impl fmt::Debug for OrderSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OrderSecret([REDACTED])")
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret([REDACTED])")
    }
}

/// Canonical message for the direct verification path
pub fn direct_canonical_message(provider_order_id: &str, provider_payment_id: &str) -> Vec<u8> {
    format!("{}|{}", provider_order_id, provider_payment_id).into_bytes()
}

/// Compute the hex-encoded HMAC-SHA256 of `message` under `secret`
pub fn sign(message: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `provided_signature` (hex, either case) against the HMAC-SHA256 of
/// `message` under `secret`. The digest comparison is constant-time.
pub fn verify(message: &[u8], secret: &[u8], provided_signature: &str) -> bool {
    let provided = match hex::decode(provided_signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}
