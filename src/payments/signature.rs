//! Webhook signature scheme: `t=<unix>,v1=<hex hmac-sha256("{t}.{body}")>`.

use crate::error::{DropError, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DropError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Produces a header value in the provider's format. Used by tests and local tooling.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mac = mac_for(secret, timestamp, body)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks `header` against `body`. Any `v1` entry may match; the timestamp
/// must be within `tolerance_secs` of `now`.
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| DropError::InvalidSignature("missing timestamp".to_string()))?;
    if candidates.is_empty() {
        return Err(DropError::InvalidSignature("missing v1 signature".to_string()));
    }
    if now.abs_diff(timestamp) > tolerance_secs.max(0).unsigned_abs() {
        return Err(DropError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        // verify_slice compares in constant time
        if mac_for(secret, timestamp, body)?
            .verify_slice(&expected)
            .is_ok()
        {
            return Ok(());
        }
    }
    Err(DropError::InvalidSignature("no matching signature".to_string()))
}
