//! Durable receipt storage using redb.
//!
//! # Table design
//!
//! A single `RECEIPTS` table keyed by the 16 raw bytes of the action id,
//! holding the JSON-encoded `Receipt`. Writes go through
//! `insert_if_absent`, which checks and inserts inside one write
//! transaction, so an existing receipt is never overwritten.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::error::{CanvasError, Result};

use super::{Receipt, ReceiptStore};

// ---------------------------------------------------------------------------
// Table definition
// ---------------------------------------------------------------------------

/// Key: action id bytes. Value: JSON-encoded Receipt.
const RECEIPTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("receipts");

fn store_err(e: impl std::fmt::Display) -> CanvasError {
    CanvasError::ReceiptStore(e.to_string())
}

// ---------------------------------------------------------------------------
// ReceiptDb
// ---------------------------------------------------------------------------

pub struct ReceiptDb {
    db: Database,
}

impl ReceiptDb {
    /// Open or create the database at `path`, creating the table if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(RECEIPTS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }
}

impl ReceiptStore for ReceiptDb {
    fn get(&self, action_id: Uuid) -> Result<Option<Receipt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RECEIPTS).map_err(store_err)?;
        let Some(entry) = table.get(action_id.as_bytes().as_slice()).map_err(store_err)? else {
            return Ok(None);
        };
        let receipt: Receipt = serde_json::from_slice(entry.value())?;
        Ok(Some(receipt))
    }

    fn insert_if_absent(&self, receipt: &Receipt) -> Result<bool> {
        let value = serde_json::to_vec(receipt)?;
        let key = receipt.action_id.as_bytes();
        let wt = self.db.begin_write().map_err(store_err)?;
        let inserted = {
            let mut table = wt.open_table(RECEIPTS).map_err(store_err)?;
            let exists = table.get(key.as_slice()).map_err(store_err)?.is_some();
            if !exists {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(store_err)?;
            }
            !exists
        };
        wt.commit().map_err(store_err)?;
        Ok(inserted)
    }

    fn list(&self) -> Result<Vec<Receipt>> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(RECEIPTS).map_err(store_err)?;

        let mut result = Vec::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let receipt: Receipt = serde_json::from_slice(v.value())?;
            result.push(receipt);
        }
        result.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunwayState;
    use chrono::{Duration as CDur, Utc};
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, ReceiptDb) {
        let dir = TempDir::new().unwrap();
        let db = ReceiptDb::open(&dir.path().join("receipts.redb")).unwrap();
        (dir, db)
    }

    fn receipt(status: RunwayState, ago_secs: i64) -> Receipt {
        Receipt {
            action_id: Uuid::new_v4(),
            action_type: "invoice.create".to_string(),
            final_status: status,
            payload_summary: "{}".to_string(),
            detail: None,
            completed_at: Utc::now() - CDur::seconds(ago_secs),
        }
    }

    #[test]
    fn insert_then_get() {
        let (_dir, db) = open_tmp();
        let r = receipt(RunwayState::ReceiptReady, 0);
        assert!(db.insert_if_absent(&r).unwrap());
        assert_eq!(db.get(r.action_id).unwrap(), Some(r));
    }

    #[test]
    fn second_insert_keeps_first_receipt() {
        let (_dir, db) = open_tmp();
        let first = receipt(RunwayState::Cancelled, 0);
        let mut second = first.clone();
        second.final_status = RunwayState::ReceiptReady;

        assert!(db.insert_if_absent(&first).unwrap());
        assert!(!db.insert_if_absent(&second).unwrap());
        assert_eq!(
            db.get(first.action_id).unwrap().unwrap().final_status,
            RunwayState::Cancelled
        );
    }

    #[test]
    fn list_is_oldest_first() {
        let (_dir, db) = open_tmp();
        let newer = receipt(RunwayState::Timeout, 1);
        let older = receipt(RunwayState::Error, 60);
        db.insert_if_absent(&newer).unwrap();
        db.insert_if_absent(&older).unwrap();

        let all = db.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].action_id, older.action_id);
        assert_eq!(all[1].action_id, newer.action_id);
    }

    #[test]
    fn receipts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("receipts.redb");
        let r = receipt(RunwayState::ReceiptReady, 0);
        {
            let db = ReceiptDb::open(&path).unwrap();
            db.insert_if_absent(&r).unwrap();
        }
        let db = ReceiptDb::open(&path).unwrap();
        assert_eq!(db.get(r.action_id).unwrap(), Some(r));
    }

    #[test]
    fn get_missing_is_none() {
        let (_dir, db) = open_tmp();
        assert!(db.get(Uuid::new_v4()).unwrap().is_none());
    }
}
