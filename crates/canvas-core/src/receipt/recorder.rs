use super::{MemoryReceiptStore, Receipt, ReceiptStore};
use crate::action::Action;
use crate::error::{CanvasError, Result};
use crate::redact::Redactor;
use crate::types::RunwayState;
use chrono::Utc;
use uuid::Uuid;

const SUMMARY_MAX_CHARS: usize = 240;

/// Writes exactly one receipt per terminal action.
///
/// Recording the same outcome twice returns the existing receipt. Recording
/// a different outcome for an action that already has a receipt is an
/// internal-consistency fault and fails with `ReceiptConflict`.
pub struct ReceiptRecorder {
    store: Box<dyn ReceiptStore>,
    redactor: Redactor,
}

impl ReceiptRecorder {
    pub fn new(store: Box<dyn ReceiptStore>, redactor: Redactor) -> Self {
        Self { store, redactor }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryReceiptStore::new()), Redactor::default())
    }

    pub fn record(
        &self,
        action: &Action,
        final_status: RunwayState,
        detail: Option<String>,
    ) -> Result<Receipt> {
        if !final_status.is_terminal() {
            return Err(CanvasError::NotTerminal(final_status));
        }

        let receipt = Receipt {
            action_id: action.id,
            action_type: action.action_type.clone(),
            final_status,
            payload_summary: self.redactor.summarize(&action.payload, SUMMARY_MAX_CHARS),
            detail,
            completed_at: Utc::now(),
        };

        if self.store.insert_if_absent(&receipt)? {
            return Ok(receipt);
        }

        let existing = self.store.get(action.id)?.ok_or_else(|| {
            CanvasError::Internal(format!("receipt for {} vanished after insert", action.id))
        })?;
        if existing.final_status == final_status {
            Ok(existing)
        } else {
            Err(CanvasError::ReceiptConflict {
                action_id: action.id,
                recorded: existing.final_status,
                attempted: final_status,
            })
        }
    }

    pub fn get(&self, action_id: Uuid) -> Result<Option<Receipt>> {
        self.store.get(action_id)
    }

    pub fn list(&self) -> Result<Vec<Receipt>> {
        self.store.list()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDraft;
    use crate::types::RiskTier;

    fn action() -> Action {
        Action::from_draft(
            ActionDraft::new("invoice.create", RiskTier::Yellow)
                .payload("customer", "acme")
                .payload("api_token", "sk-123"),
        )
    }

    #[test]
    fn first_record_writes_redacted_summary() {
        let rec = ReceiptRecorder::in_memory();
        let a = action();
        let r = rec.record(&a, RunwayState::ReceiptReady, None).unwrap();
        assert_eq!(r.action_id, a.id);
        assert!(r.payload_summary.contains("acme"));
        assert!(!r.payload_summary.contains("sk-123"));
        assert!(r.payload_summary.contains("[REDACTED]"));
    }

    #[test]
    fn same_outcome_twice_is_noop() {
        let rec = ReceiptRecorder::in_memory();
        let a = action();
        let first = rec.record(&a, RunwayState::Cancelled, None).unwrap();
        let second = rec
            .record(&a, RunwayState::Cancelled, Some("again".to_string()))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(rec.list().unwrap().len(), 1);
    }

    #[test]
    fn conflicting_outcome_is_rejected() {
        let rec = ReceiptRecorder::in_memory();
        let a = action();
        rec.record(&a, RunwayState::Timeout, None).unwrap();
        let err = rec.record(&a, RunwayState::ReceiptReady, None).unwrap_err();
        assert!(matches!(
            err,
            CanvasError::ReceiptConflict {
                recorded: RunwayState::Timeout,
                attempted: RunwayState::ReceiptReady,
                ..
            }
        ));
        assert!(err.is_internal());
        assert_eq!(
            rec.get(a.id).unwrap().unwrap().final_status,
            RunwayState::Timeout
        );
    }

    #[test]
    fn non_terminal_status_is_rejected() {
        let rec = ReceiptRecorder::in_memory();
        let err = rec.record(&action(), RunwayState::Pending, None).unwrap_err();
        assert!(matches!(err, CanvasError::NotTerminal(RunwayState::Pending)));
        assert!(rec.list().unwrap().is_empty());
    }
}
