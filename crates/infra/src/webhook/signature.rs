//! Webhook payload signing
//!
//! Receivers verify `X-Webhook-Signature` by recomputing
//! `HMAC-SHA256(secret, "{timestamp}.{body}")` with the value of
//! `X-Webhook-Timestamp`.

use hmac::{Hmac, Mac};
use myinvois_domain::{MyInvoisError, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";
pub const EVENT_HEADER: &str = "X-Webhook-Event";
pub const DELIVERY_HEADER: &str = "X-Webhook-Delivery";

const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str, timestamp: i64, body: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| MyInvoisError::internal(format!("Invalid webhook signing key: {err}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(mac)
}

/// `sha256=<hex>` signature of `body` sent at `timestamp` (unix seconds)
pub fn sign(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    let digest = mac_for(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

/// Constant-time check of a received signature header
pub fn verify(secret: &str, timestamp: i64, body: &str, signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    mac_for(secret, timestamp, body).is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}
