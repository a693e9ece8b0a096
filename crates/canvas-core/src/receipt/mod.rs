//! Append-only receipts for actions that reached a terminal runway state.
//!
//! Provides `Receipt`, the `ReceiptStore` seam with an in-memory and a redb
//! implementation, and `ReceiptRecorder`, which enforces one receipt per
//! action.

pub mod db;
pub mod recorder;

pub use db::ReceiptDb;
pub use recorder::ReceiptRecorder;

use crate::error::Result;
use crate::types::RunwayState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

/// Immutable outcome record. Never edited or deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub action_id: Uuid,
    pub action_type: String,
    pub final_status: RunwayState,
    /// Redacted, truncated rendering of the submitted payload.
    pub payload_summary: String,
    /// Failure or denial reason, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.final_status.is_success()
    }
}

// ---------------------------------------------------------------------------
// ReceiptStore
// ---------------------------------------------------------------------------

/// Durable home for receipts. Implementations must be insert-only.
pub trait ReceiptStore: Send + Sync {
    fn get(&self, action_id: Uuid) -> Result<Option<Receipt>>;

    /// Insert `receipt` unless one already exists for its action.
    ///
    /// Returns `false`, leaving the stored receipt untouched, when the
    /// action already has one. The check and the insert are atomic.
    fn insert_if_absent(&self, receipt: &Receipt) -> Result<bool>;

    /// All receipts, oldest first.
    fn list(&self) -> Result<Vec<Receipt>>;
}

/// Process-local store; receipts vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryReceiptStore {
    receipts: Mutex<Vec<Receipt>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Receipt>> {
        self.receipts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ReceiptStore for MemoryReceiptStore {
    fn get(&self, action_id: Uuid) -> Result<Option<Receipt>> {
        Ok(self.lock().iter().find(|r| r.action_id == action_id).cloned())
    }

    fn insert_if_absent(&self, receipt: &Receipt) -> Result<bool> {
        let mut receipts = self.lock();
        if receipts.iter().any(|r| r.action_id == receipt.action_id) {
            return Ok(false);
        }
        receipts.push(receipt.clone());
        Ok(true)
    }

    fn list(&self) -> Result<Vec<Receipt>> {
        let mut all = self.lock().clone();
        all.sort_by(|a, b| a.completed_at.cmp(&b.completed_at));
        Ok(all)
    }
}
