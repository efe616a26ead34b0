use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or newer) than this are treated as replays.
pub const MAX_CLOCK_SKEW_SECS: u64 = 300;

const VERSION_PREFIX: &str = "v0";

/// Check a webhook signature against the current wall clock.
pub fn verify(secret: &str, signature: &str, timestamp: &str, body: &[u8]) -> bool {
    verify_at(Utc::now().timestamp(), secret, signature, timestamp, body)
}

/// Check `signature` (`v0=<hex hmac>`) over `v0:<timestamp>:<body>`.
///
/// Never errors: a missing, malformed, stale or mismatched signature is
/// simply `false`. The digest comparison is constant-time.
pub fn verify_at(now: i64, secret: &str, signature: &str, timestamp: &str, body: &[u8]) -> bool {
    let Ok(ts) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    if now.abs_diff(ts) > MAX_CLOCK_SKEW_SECS {
        return false;
    }

    let Some(sig_hex) = signature
        .strip_prefix(VERSION_PREFIX)
        .and_then(|rest| rest.strip_prefix('='))
    else {
        return false;
    };
    let Ok(provided) = hex::decode(sig_hex) else {
        return false;
    };

    let Some(mac) = signed_mac(secret, timestamp.trim(), body) else {
        return false;
    };
    mac.verify_slice(&provided).is_ok()
}

/// Produce the signature header value for `body` sent at `timestamp`.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mac = signed_mac(secret, timestamp, body)?;
    Some(format!(
        "{}={}",
        VERSION_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn signed_mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(VERSION_PREFIX.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}
