use crate::action::Action;
use crate::redact::Redactor;
use crate::types::RiskTier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ConfirmationRequest
// ---------------------------------------------------------------------------

/// What the display layer shows for a pending YELLOW/RED action.
///
/// The payload is already redacted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub action_id: Uuid,
    pub action_type: String,
    pub risk_tier: RiskTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    /// Set when the request becomes visible; queued requests do not expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConfirmationRequest {
    /// RED prompts should demand a typed confirmation rather than a click.
    pub fn needs_typed_confirmation(&self) -> bool {
        self.risk_tier == RiskTier::Red
    }
}

/// Where a new request landed.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Nothing else was waiting; show it now.
    Visible(ConfirmationRequest),
    /// Behind `position` other requests (1 = next in line).
    Queued { position: usize },
}

// ---------------------------------------------------------------------------
// ConfirmationGate
// ---------------------------------------------------------------------------

/// FIFO router between pending actions and the single visible prompt.
///
/// The front of the queue is the visible request. The gate stores nothing
/// else: decisions flow back through the action bus, which tells the gate
/// to drop the resolved request.
#[derive(Debug)]
pub struct ConfirmationGate {
    redactor: Redactor,
    timeout: Duration,
    queue: VecDeque<ConfirmationRequest>,
}

impl ConfirmationGate {
    pub fn new(redactor: Redactor, timeout: Duration) -> Self {
        Self {
            redactor,
            timeout,
            queue: VecDeque::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request_confirmation(&mut self, action: &Action, label: Option<&str>) -> Admission {
        let request = ConfirmationRequest {
            action_id: action.id,
            action_type: action.action_type.clone(),
            risk_tier: action.risk_tier,
            label: label.map(str::to_string),
            payload: self.redactor.redact_map(&action.payload),
            widget_id: action.widget_id.clone(),
            actor_id: action.actor_id.clone(),
            requested_at: Utc::now(),
            expires_at: None,
        };

        if self.queue.is_empty() {
            let mut request = request;
            request.expires_at = self.deadline();
            self.queue.push_back(request.clone());
            Admission::Visible(request)
        } else {
            self.queue.push_back(request);
            Admission::Queued {
                position: self.queue.len() - 1,
            }
        }
    }

    /// Drop the request for `action_id`.
    ///
    /// Returns the request that became visible as a result, if the resolved
    /// one was at the front and another was waiting.
    pub fn resolve(&mut self, action_id: Uuid) -> Option<ConfirmationRequest> {
        let index = self.queue.iter().position(|r| r.action_id == action_id)?;
        self.queue.remove(index);
        if index != 0 {
            return None;
        }
        let deadline = self.deadline();
        self.queue.front_mut().map(|front| {
            front.expires_at = deadline;
            front.clone()
        })
    }

    pub fn visible(&self) -> Option<&ConfirmationRequest> {
        self.queue.front()
    }

    pub fn is_visible(&self, action_id: Uuid) -> bool {
        self.visible().is_some_and(|r| r.action_id == action_id)
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len().saturating_sub(1)
    }

    pub fn contains(&self, action_id: Uuid) -> bool {
        self.queue.iter().any(|r| r.action_id == action_id)
    }

    fn deadline(&self) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDraft;

    fn gate() -> ConfirmationGate {
        ConfirmationGate::new(Redactor::default(), Duration::from_secs(300))
    }

    fn yellow(kind: &str) -> Action {
        Action::from_draft(
            ActionDraft::new(kind, RiskTier::Yellow)
                .payload("amount", 120)
                .payload("password", "hunter2"),
        )
    }

    #[test]
    fn first_request_is_visible_and_redacted() {
        let mut g = gate();
        let a = yellow("invoice.create");
        let Admission::Visible(req) = g.request_confirmation(&a, Some("Create invoice")) else {
            panic!("first request should be visible");
        };
        assert_eq!(req.action_id, a.id);
        assert_eq!(req.payload["amount"], 120);
        assert_eq!(req.payload["password"], "[REDACTED]");
        assert_eq!(req.label.as_deref(), Some("Create invoice"));
        assert!(req.expires_at.is_some());
    }

    #[test]
    fn second_request_queues_fifo() {
        let mut g = gate();
        let a = yellow("invoice.create");
        let b = yellow("email.delete");
        let c = yellow("invoice.void");
        g.request_confirmation(&a, None);
        assert_eq!(g.request_confirmation(&b, None), Admission::Queued { position: 1 });
        assert_eq!(g.request_confirmation(&c, None), Admission::Queued { position: 2 });
        assert!(g.is_visible(a.id));
        assert_eq!(g.queued_len(), 2);

        let next = g.resolve(a.id).unwrap();
        assert_eq!(next.action_id, b.id);
        assert!(next.expires_at.is_some());
        let next = g.resolve(b.id).unwrap();
        assert_eq!(next.action_id, c.id);
        assert!(g.resolve(c.id).is_none());
        assert!(g.visible().is_none());
    }

    #[test]
    fn queued_requests_have_no_deadline() {
        let mut g = gate();
        g.request_confirmation(&yellow("invoice.create"), None);
        g.request_confirmation(&yellow("invoice.create"), None);
        assert!(g.queue[1].expires_at.is_none());
    }

    #[test]
    fn resolving_a_queued_request_keeps_visible_one() {
        let mut g = gate();
        let a = yellow("invoice.create");
        let b = yellow("email.delete");
        g.request_confirmation(&a, None);
        g.request_confirmation(&b, None);
        assert!(g.resolve(b.id).is_none());
        assert!(g.is_visible(a.id));
        assert!(!g.contains(b.id));
    }

    #[test]
    fn resolving_unknown_is_noop() {
        let mut g = gate();
        let a = yellow("invoice.create");
        g.request_confirmation(&a, None);
        assert!(g.resolve(Uuid::new_v4()).is_none());
        assert!(g.is_visible(a.id));
    }

    #[test]
    fn red_needs_typed_confirmation() {
        let mut g = gate();
        let a = Action::from_draft(ActionDraft::new("invoice.void", RiskTier::Red));
        let Admission::Visible(req) = g.request_confirmation(&a, None) else {
            panic!("expected visible");
        };
        assert!(req.needs_typed_confirmation());
    }
}
