pub mod db;
pub mod memory;
pub mod model;

pub use db::Store;
pub use memory::MemoryStore;
pub use model::SecretRecord;

use anyhow::Result;

/// Outcome of [`RecordStore::put`].
#[derive(Debug, PartialEq, Eq)]
pub enum PutResult {
    /// Record inserted under a fresh token.
    Inserted,
    /// The token is already taken. The caller regenerates and retries.
    DuplicateToken,
}

/// Outcome of [`RecordStore::mark_viewed`].
#[derive(Debug, PartialEq, Eq)]
pub enum MarkResult {
    /// This call won the false → true transition.
    Marked,
    /// The record was already viewed when this call arrived.
    AlreadyViewed,
    /// No record under that token.
    NotFound,
}

/// Narrow persistence contract for secret records. No domain logic —
/// expiry policy, token generation and deletion scheduling all live in
/// the lifecycle layer. The one exception is `mark_viewed`, which must
/// be a compare-and-set on the `viewed` flag: under concurrent callers
/// exactly one observes `Marked`, the rest `AlreadyViewed`.
pub trait RecordStore: Clone + Send + Sync + 'static {
    /// Insert a new record. Never overwrites an existing token.
    fn put(&self, token: &str, record: &SecretRecord) -> Result<PutResult>;

    /// Pure read, no side effects.
    fn get(&self, token: &str) -> Result<Option<SecretRecord>>;

    /// Atomically set `viewed = true` and stamp `viewed_at` if the
    /// record exists and was not yet viewed.
    fn mark_viewed(&self, token: &str, viewed_at: i64) -> Result<MarkResult>;

    /// Remove a record. Deleting an absent token is not an error;
    /// returns whether it existed.
    fn delete(&self, token: &str) -> Result<bool>;

    /// Remove expired unviewed records, plus viewed records whose view
    /// happened at or before `viewed_cutoff` (missed deletion timers).
    /// Returns the number of records removed.
    fn prune(&self, now: i64, viewed_cutoff: i64) -> Result<usize>;
}
