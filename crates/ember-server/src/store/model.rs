use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Stored in redb as bincode-encoded bytes, keyed by token.
/// Payload is kept in clear; `ZeroizeOnDrop` wipes it from memory once
/// the record is dropped.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SecretRecord {
    /// Text payload. May be empty when a file is attached.
    pub text: String,
    /// Original file name, present iff `file_bytes` is present.
    pub file_name: Option<String>,
    /// Raw file payload, present iff `file_name` is present.
    pub file_bytes: Option<Vec<u8>>,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    /// Unix timestamp (seconds) after which the record is expired.
    pub expires_at: i64,
    /// One-time view flag. False → true is the only legal transition.
    pub viewed: bool,
    /// Unix timestamp (seconds) of the view transition, if any.
    pub viewed_at: Option<i64>,
}

impl SecretRecord {
    /// Returns true once the TTL has elapsed.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}
