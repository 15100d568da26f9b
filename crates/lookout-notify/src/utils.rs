//! The two helpers adapters are allowed to share.

use base64::Engine;
use chrono::{DateTime, Local, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use lookout_common::types::AlertLevel;

type HmacSha256 = Hmac<Sha256>;

/// Mention policy: only alerts people should get out of bed for ping users.
pub fn should_mention(level: AlertLevel) -> bool {
    matches!(level, AlertLevel::Critical | AlertLevel::High)
}

/// Signature for signed webhooks: `base64(HMAC-SHA256(secret, ts + "\n" + secret))`.
/// The adapter decides the timestamp unit and how the result lands in the URL.
pub fn webhook_signature(secret: &str, timestamp: &str) -> String {
    let string_to_sign = format!("{timestamp}\n{secret}");
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

pub fn level_emoji(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Critical => "🚨",
        AlertLevel::High => "🚩",
        AlertLevel::Medium => "🔔",
        AlertLevel::Low | AlertLevel::Info => "ℹ️",
    }
}

/// Alert timestamps are shown to humans in local time.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
