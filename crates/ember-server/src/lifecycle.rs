use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{MarkResult, PutResult, RecordStore, SecretRecord};

/// Collision retries before `create` gives up. With 128-bit tokens a
/// single duplicate already means a broken RNG, not bad luck.
const TOKEN_ATTEMPTS: usize = 4;

/// Externally configurable policy knobs. Defaults match the documented
/// contract: 24 h TTL, 1 MiB payload cap, 30 s post-view grace window,
/// 128-bit tokens.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Time-to-live for unconsumed secrets.
    pub ttl: Duration,
    /// Upper bound on text and file payload size, in bytes.
    pub max_payload_bytes: usize,
    /// Delay between a successful consume and physical deletion.
    pub grace: Duration,
    /// Random bytes per token (hex-encoded, so twice this many chars).
    pub token_bytes: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_payload_bytes: 1_048_576,
            grace: Duration::from_secs(30),
            token_bytes: 16,
        }
    }
}

/// Creation failures. `DuplicateToken` from the store is recovered
/// internally by regenerating; only sustained exhaustion surfaces.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("a text or file payload is required")]
    EmptyPayload,
    #[error("payload exceeds the {limit}-byte limit")]
    PayloadTooLarge { limit: usize },
    #[error("could not allocate a unique token")]
    TokenExhausted,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Payload returned by a successful preview. Never includes the token.
#[derive(Debug, PartialEq, Eq)]
pub struct SecretPayload {
    pub text: String,
    pub file_name: Option<String>,
    pub file_bytes: Option<Vec<u8>>,
    pub expires_at: i64,
}

/// Outcome of a non-destructive fetch.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchResult {
    Payload(SecretPayload),
    NotFound,
    Expired,
    AlreadyViewed,
}

/// Outcome of the one-time consume transition.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsumeResult {
    Consumed,
    NotFound,
    Expired,
    AlreadyViewed,
}

/// Owns the domain rules: token generation, expiry enforcement,
/// one-time-view semantics and deferred deletion. The store is the sole
/// source of truth — no record state is cached across calls, so any
/// number of `Lifecycle` instances can share one store.
#[derive(Clone)]
pub struct Lifecycle<S: RecordStore> {
    store: S,
    policy: Policy,
}

impl<S: RecordStore> Lifecycle<S> {
    pub fn new(store: S, policy: Policy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }

    /// Validate and persist a new secret, returning its token.
    /// At least one of text / file must carry content; the payload must
    /// fit the policy limit.
    pub fn create(
        &self,
        text: &str,
        file: Option<(String, Vec<u8>)>,
    ) -> Result<String, CreateError> {
        if text.trim().is_empty() && file.is_none() {
            return Err(CreateError::EmptyPayload);
        }
        let limit = self.policy.max_payload_bytes;
        if text.len() > limit {
            return Err(CreateError::PayloadTooLarge { limit });
        }
        if let Some((_, ref bytes)) = file {
            if bytes.len() > limit {
                return Err(CreateError::PayloadTooLarge { limit });
            }
        }

        let now = Self::now();
        let (file_name, file_bytes) = match file {
            Some((name, bytes)) => (Some(name), Some(bytes)),
            None => (None, None),
        };
        let record = SecretRecord {
            text: text.to_owned(),
            file_name,
            file_bytes,
            created_at: now,
            expires_at: now + self.policy.ttl.as_secs() as i64,
            viewed: false,
            viewed_at: None,
        };

        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_token(self.policy.token_bytes);
            match self.store.put(&token, &record)? {
                PutResult::Inserted => {
                    // The token is the credential — keep it out of logs.
                    info!(expires_at = record.expires_at, "secret created");
                    return Ok(token);
                }
                PutResult::DuplicateToken => {
                    warn!("token collision, regenerating");
                }
            }
        }
        Err(CreateError::TokenExhausted)
    }

    /// Non-destructive preview. Does not mark the record viewed — that
    /// is a separate, explicit `consume` step so a client can warn the
    /// user before committing to the one-time read.
    pub fn fetch(&self, token: &str) -> Result<FetchResult> {
        let record = match self.store.get(token)? {
            None => return Ok(FetchResult::NotFound),
            Some(r) => r,
        };

        if record.is_expired(Self::now()) {
            self.delete_expired(token);
            return Ok(FetchResult::Expired);
        }
        if record.viewed {
            return Ok(FetchResult::AlreadyViewed);
        }

        Ok(FetchResult::Payload(SecretPayload {
            text: record.text.clone(),
            file_name: record.file_name.clone(),
            file_bytes: record.file_bytes.clone(),
            expires_at: record.expires_at,
        }))
    }

    /// One-time destructive transition. Exactly one of any set of
    /// concurrent callers observes `Consumed`; the store's
    /// compare-and-set on the viewed flag guarantees it. On success the
    /// record is deleted after the grace window by a detached task.
    pub fn consume(&self, token: &str) -> Result<ConsumeResult> {
        let now = Self::now();

        match self.store.get(token)? {
            None => return Ok(ConsumeResult::NotFound),
            Some(record) if record.is_expired(now) => {
                self.delete_expired(token);
                return Ok(ConsumeResult::Expired);
            }
            Some(_) => {}
        }

        match self.store.mark_viewed(token, now)? {
            MarkResult::Marked => {
                info!("secret consumed");
                self.schedule_delete(token);
                Ok(ConsumeResult::Consumed)
            }
            MarkResult::AlreadyViewed => Ok(ConsumeResult::AlreadyViewed),
            // Deleted between the expiry check and the CAS.
            MarkResult::NotFound => Ok(ConsumeResult::NotFound),
        }
    }

    /// Lazy eviction on access. Best effort: a failure only delays
    /// removal, it never re-exposes content.
    fn delete_expired(&self, token: &str) {
        match self.store.delete(token) {
            Ok(_) => debug!("lazy-evicted expired secret"),
            Err(e) => warn!(error = %e, "lazy eviction failed"),
        }
    }

    /// Fire-and-forget deletion after the grace window. Not cancelable:
    /// once viewed, the record is removed unconditionally.
    fn schedule_delete(&self, token: &str) {
        let store = self.store.clone();
        let token = token.to_owned();
        let grace = self.policy.grace;
        let sleep = tokio::time::sleep(grace);
        tokio::spawn(async move {
            sleep.await;
            match store.delete(&token) {
                Ok(_) => debug!("deleted consumed secret"),
                Err(e) => warn!(error = %e, "deferred deletion failed"),
            }
        });
    }

    /// Spawn a background task that prunes stale records every
    /// `interval`. Liveness only — lazy eviction already guarantees
    /// expired content is never served.
    pub fn spawn_sweep(self, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip first immediate tick
            loop {
                ticker.tick().await;
                let now = Self::now();
                let cutoff = now - self.policy.grace.as_secs() as i64;
                match self.store.prune(now, cutoff) {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "pruned stale secrets");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "background sweep error"),
                }
            }
        });
    }
}

/// Generate an unguessable token: `n` random bytes, hex-encoded.
fn generate_token(n: usize) -> String {
    use rand::Rng;
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
