use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use super::model::SecretRecord;
use super::{MarkResult, PutResult, RecordStore};

/// In-memory store. Same contract as the redb store, nothing survives
/// the process. Used by the lifecycle tests and suitable for throwaway
/// deployments where durability is explicitly unwanted.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<String, SecretRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, token: &str, record: &SecretRecord) -> Result<PutResult> {
        let mut records = self.records.lock().unwrap();
        if records.contains_key(token) {
            return Ok(PutResult::DuplicateToken);
        }
        records.insert(token.to_owned(), record.clone());
        Ok(PutResult::Inserted)
    }

    fn get(&self, token: &str) -> Result<Option<SecretRecord>> {
        Ok(self.records.lock().unwrap().get(token).cloned())
    }

    fn mark_viewed(&self, token: &str, viewed_at: i64) -> Result<MarkResult> {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(token) {
            None => Ok(MarkResult::NotFound),
            Some(record) if record.viewed => Ok(MarkResult::AlreadyViewed),
            Some(record) => {
                record.viewed = true;
                record.viewed_at = Some(viewed_at);
                Ok(MarkResult::Marked)
            }
        }
    }

    fn delete(&self, token: &str) -> Result<bool> {
        Ok(self.records.lock().unwrap().remove(token).is_some())
    }

    fn prune(&self, now: i64, viewed_cutoff: i64) -> Result<usize> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|_, r| {
            let missed_timer = r.viewed && r.viewed_at.unwrap_or(0) <= viewed_cutoff;
            !(!r.viewed && r.is_expired(now)) && !missed_timer
        });
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(expires_at: i64) -> SecretRecord {
        SecretRecord {
            text: "v".into(),
            file_name: None,
            file_bytes: None,
            created_at: 0,
            expires_at,
            viewed: false,
            viewed_at: None,
        }
    }

    #[test]
    fn contract_matches_redb_store() {
        let s = MemoryStore::new();
        assert_eq!(s.put("t", &record(100)).unwrap(), PutResult::Inserted);
        assert_eq!(s.put("t", &record(100)).unwrap(), PutResult::DuplicateToken);
        assert_eq!(s.mark_viewed("t", 50).unwrap(), MarkResult::Marked);
        assert_eq!(s.mark_viewed("t", 51).unwrap(), MarkResult::AlreadyViewed);
        assert_eq!(s.mark_viewed("x", 50).unwrap(), MarkResult::NotFound);
        assert!(s.delete("t").unwrap());
        assert!(!s.delete("t").unwrap());
    }

    #[test]
    fn prune_semantics() {
        let s = MemoryStore::new();
        s.put("live", &record(200)).unwrap();
        s.put("dead", &record(50)).unwrap();
        s.put("seen", &record(200)).unwrap();
        s.mark_viewed("seen", 10).unwrap();
        assert_eq!(s.prune(100, 20).unwrap(), 2);
        assert!(s.get("live").unwrap().is_some());
    }
}
