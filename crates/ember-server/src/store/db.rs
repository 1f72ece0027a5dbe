use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::model::SecretRecord;
use super::{MarkResult, PutResult, RecordStore};

const SECRETS: TableDefinition<&str, &[u8]> = TableDefinition::new("secrets");

/// Thread-safe handle to the redb store.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure the table exists.
        let write_txn = db.begin_write()?;
        write_txn.open_table(SECRETS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl RecordStore for Store {
    fn put(&self, token: &str, record: &SecretRecord) -> Result<PutResult> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(SECRETS)?;
            if table.get(token)?.is_some() {
                PutResult::DuplicateToken
            } else {
                table.insert(token, bytes.as_slice())?;
                PutResult::Inserted
            }
        };
        write_txn.commit()?;

        if result == PutResult::Inserted {
            debug!("stored secret");
        }
        Ok(result)
    }

    fn get(&self, token: &str) -> Result<Option<SecretRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SECRETS)?;
        let raw_bytes: Option<Vec<u8>> = table.get(token)?.map(|guard| guard.value().to_vec());
        raw_bytes.map(|bytes| decode(&bytes)).transpose()
    }

    fn mark_viewed(&self, token: &str, viewed_at: i64) -> Result<MarkResult> {
        // The single redb write transaction makes the check-then-set
        // atomic: concurrent callers serialize here, and only the first
        // sees viewed == false.
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut table = write_txn.open_table(SECRETS)?;

            // Clone the raw bytes so the AccessGuard (which borrows
            // `table`) is dropped before any mutation.
            let raw_bytes: Option<Vec<u8>> = table.get(token)?.map(|guard| guard.value().to_vec());

            match raw_bytes {
                None => MarkResult::NotFound,
                Some(bytes) => {
                    let mut record = decode(&bytes)?;
                    if record.viewed {
                        MarkResult::AlreadyViewed
                    } else {
                        record.viewed = true;
                        record.viewed_at = Some(viewed_at);
                        let updated = encode(&record)?;
                        table.insert(token, updated.as_slice())?;
                        debug!("marked secret viewed");
                        MarkResult::Marked
                    }
                }
            }
        };
        write_txn.commit()?;
        Ok(result)
    }

    fn delete(&self, token: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(SECRETS)?;
            let removed = table.remove(token)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn prune(&self, now: i64, viewed_cutoff: i64) -> Result<usize> {
        // Collect stale tokens in a read pass first.
        let stale: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SECRETS)?;
            let mut tokens = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                let record = decode(v.value())?;
                let missed_timer = record.viewed && record.viewed_at.unwrap_or(0) <= viewed_cutoff;
                if (!record.viewed && record.is_expired(now)) || missed_timer {
                    tokens.push(k.value().to_owned());
                }
            }
            tokens
        };

        if stale.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SECRETS)?;
            for token in &stale {
                table.remove(token.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(stale.len())
    }
}

fn encode(record: &SecretRecord) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode::config::standard()).context("bincode encode")
}

fn decode(bytes: &[u8]) -> Result<SecretRecord> {
    let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open(&path).unwrap();
        (store, dir)
    }

    fn record(text: &str, expires_at: i64) -> SecretRecord {
        SecretRecord {
            text: text.into(),
            file_name: None,
            file_bytes: None,
            created_at: 100,
            expires_at,
            viewed: false,
            viewed_at: None,
        }
    }

    #[test]
    fn put_get_delete() {
        let (s, _dir) = make_store();
        assert_eq!(
            s.put("tok", &record("hello", 1000)).unwrap(),
            PutResult::Inserted
        );
        let got = s.get("tok").unwrap().unwrap();
        assert_eq!(got.text, "hello");
        assert!(!got.viewed);
        assert!(s.delete("tok").unwrap());
        assert!(s.get("tok").unwrap().is_none());
    }

    #[test]
    fn put_rejects_duplicate_token() {
        let (s, _dir) = make_store();
        s.put("tok", &record("first", 1000)).unwrap();
        assert_eq!(
            s.put("tok", &record("second", 1000)).unwrap(),
            PutResult::DuplicateToken
        );
        // Original record untouched.
        assert_eq!(s.get("tok").unwrap().unwrap().text, "first");
    }

    #[test]
    fn get_is_pure() {
        let (s, _dir) = make_store();
        s.put("tok", &record("v", 1000)).unwrap();
        s.get("tok").unwrap();
        s.get("tok").unwrap();
        let got = s.get("tok").unwrap().unwrap();
        assert!(!got.viewed);
        assert!(got.viewed_at.is_none());
    }

    #[test]
    fn mark_viewed_transitions_once() {
        let (s, _dir) = make_store();
        s.put("tok", &record("v", 1000)).unwrap();
        assert_eq!(s.mark_viewed("tok", 500).unwrap(), MarkResult::Marked);
        assert_eq!(
            s.mark_viewed("tok", 501).unwrap(),
            MarkResult::AlreadyViewed
        );
        let got = s.get("tok").unwrap().unwrap();
        assert!(got.viewed);
        // viewed_at records the winning call only.
        assert_eq!(got.viewed_at, Some(500));
    }

    #[test]
    fn mark_viewed_not_found() {
        let (s, _dir) = make_store();
        assert_eq!(s.mark_viewed("nope", 1).unwrap(), MarkResult::NotFound);
    }

    #[test]
    fn delete_is_idempotent() {
        let (s, _dir) = make_store();
        s.put("tok", &record("v", 1000)).unwrap();
        assert!(s.delete("tok").unwrap());
        assert!(!s.delete("tok").unwrap());
    }

    #[test]
    fn prune_removes_expired_and_stale_viewed() {
        let (s, _dir) = make_store();
        s.put("live", &record("v", 2000)).unwrap();
        s.put("dead", &record("v", 500)).unwrap();
        s.put("seen", &record("v", 2000)).unwrap();
        s.mark_viewed("seen", 100).unwrap();

        // now=1000: "dead" is expired, "seen" was viewed before the cutoff.
        let removed = s.prune(1000, 900).unwrap();
        assert_eq!(removed, 2);
        assert!(s.get("live").unwrap().is_some());
        assert!(s.get("dead").unwrap().is_none());
        assert!(s.get("seen").unwrap().is_none());
    }

    #[test]
    fn prune_keeps_recently_viewed() {
        let (s, _dir) = make_store();
        s.put("seen", &record("v", 2000)).unwrap();
        s.mark_viewed("seen", 950).unwrap();

        // Viewed after the cutoff — its deletion timer is still pending.
        assert_eq!(s.prune(1000, 900).unwrap(), 0);
        assert!(s.get("seen").unwrap().is_some());
    }

    #[test]
    fn file_payload_round_trips() {
        let (s, _dir) = make_store();
        let mut rec = record("", 1000);
        rec.file_name = Some("notes.txt".into());
        rec.file_bytes = Some(vec![0u8, 1, 2, 255]);
        s.put("tok", &rec).unwrap();

        let got = s.get("tok").unwrap().unwrap();
        assert_eq!(got.file_name.as_deref(), Some("notes.txt"));
        assert_eq!(got.file_bytes.as_deref(), Some(&[0u8, 1, 2, 255][..]));
    }
}
