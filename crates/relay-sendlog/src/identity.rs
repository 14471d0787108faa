//! Dedup identity for log entries.
//!
//! A messaging-system message id is the strongest identity and is used verbatim.
//! Without one, the id is a SHA-256 over the fields that describe the logical
//! event, so re-logging the same event yields the same id.

use chrono::NaiveDate;
use relay_core::phone::digits_only;
use sha2::{Digest, Sha256};

use crate::entry::LogType;

/// Characters of message and error text that enter the content hash.
pub const IDENTITY_PREFIX_CHARS: usize = 200;

/// Fields that describe one logical log event.
#[derive(Debug, Clone, Copy)]
pub struct IdentityInput<'a> {
    pub kind: LogType,
    pub date: NaiveDate,
    pub to: Option<&'a str>,
    /// Source or endpoint tag.
    pub tag: Option<&'a str>,
    /// Original (untruncated) message text.
    pub message: &'a str,
    pub error: Option<&'a str>,
    pub message_id: Option<&'a str>,
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Stable id for an entry.
///
/// The message length is hashed alongside the 200-char prefix so two long
/// bodies sharing a prefix only collide when they also share a length.
pub fn entry_id(input: &IdentityInput<'_>) -> String {
    if let Some(id) = input.message_id.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    let date = input.date.format("%Y-%m-%d").to_string();
    let phone = digits_only(input.to.unwrap_or(""));
    let message = prefix(input.message, IDENTITY_PREFIX_CHARS);
    let length = input.message.chars().count().to_string();
    let error = prefix(input.error.unwrap_or(""), IDENTITY_PREFIX_CHARS);

    sha256_hex(&[
        input.kind.as_str(),
        &date,
        &phone,
        input.tag.unwrap_or(""),
        &message,
        &length,
        &error,
    ])
}

/// Identity of a message reconstructed from WhatsApp history.
pub fn backfill_id(phone: &str, iso_timestamp: &str, body: &str) -> String {
    sha256_hex(&["backfill", &digits_only(phone), iso_timestamp, body])
}
