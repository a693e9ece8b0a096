//! Action bus: the registry of governed actions and the driver of their
//! runways.
//!
//! ```text
//! submit(draft) ── validate ──▶ IDLE ─▶ PREFLIGHT ─┐  (sync, caller's thread)
//!                                                   ▼
//!                                   runway task (tokio::spawn)
//!        preflight ─▶ DRAFTING ─▶ DRAFT_READY ─▶ SUBMITTING
//!                          GREEN │            │ YELLOW / RED
//!                                │            ▼
//!                                │        PENDING ◀── approve / deny / timeout
//!                                ▼            │
//!                             APPROVED ◀──────┘
//!                                ▼
//!                            EXECUTING ─▶ RECEIPT_READY | ERROR
//! ```
//!
//! Whichever call moves an action into a terminal state records its receipt
//! before returning, so a terminal action always has exactly one receipt.
//!
//! All bookkeeping happens under one short-lived lock that is never held
//! across an `.await`. Events go out after the lock is released.

use crate::action::{Action, ActionDraft};
use crate::confirmation::{Admission, ConfirmationGate, ConfirmationRequest};
use crate::config::Config;
use crate::error::{CanvasError, Result};
use crate::executor::{AcceptAll, Executor, NoPreflight, Preflight};
use crate::manifest::TileManifest;
use crate::receipt::{MemoryReceiptStore, Receipt, ReceiptRecorder};
use crate::redact::Redactor;
use crate::runway::{self, RunwayEvent};
use crate::telemetry::{self, NullSink, TelemetrySink};
use crate::types::{RiskTier, RunwayState};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    Transition {
        action_id: Uuid,
        from: RunwayState,
        to: RunwayState,
    },
    /// A confirmation is now the visible one and should be displayed.
    ConfirmationRequested { request: ConfirmationRequest },
    /// A confirmation is waiting behind `position` others.
    ConfirmationQueued { action_id: Uuid, position: usize },
    /// A confirmation was resolved and should be taken down.
    ConfirmationCleared { action_id: Uuid },
    ReceiptRecorded { receipt: Receipt },
}

/// A live feed of bus events. Dropping it, or calling `unsubscribe`, stops
/// delivery.
pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the bus is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Handle returned by [`ActionBus::submit`].
///
/// Awaiting it yields the receipt once the action is terminal. The runway
/// runs on its own task, so dropping the handle does not stop it.
#[must_use = "await the submission to learn the outcome"]
pub struct Submission {
    action_id: Uuid,
    handle: JoinHandle<Result<Receipt>>,
}

impl Submission {
    pub fn action_id(&self) -> Uuid {
        self.action_id
    }
}

impl Future for Submission {
    type Output = Result<Receipt>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(CanvasError::Internal(format!(
                "runway task for {} failed: {e}",
                self.action_id
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Entry {
    action: Action,
    /// Wakes the runway task parked in `PENDING` with the decided state.
    resolver: Option<oneshot::Sender<RunwayState>>,
    detail: Option<String>,
    /// Set once the terminal receipt is stored. Until then the entry is
    /// never pruned.
    receipt: Option<Receipt>,
}

struct Registry {
    actions: HashMap<Uuid, Entry>,
    order: Vec<Uuid>,
    gate: ConfirmationGate,
}

struct Inner {
    registry: Mutex<Registry>,
    manifest: Arc<TileManifest>,
    executor: Arc<dyn Executor>,
    preflight: Arc<dyn Preflight>,
    recorder: ReceiptRecorder,
    telemetry: Arc<dyn TelemetrySink>,
    events: broadcast::Sender<BusEvent>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct ActionBusBuilder {
    manifest: Arc<TileManifest>,
    executor: Arc<dyn Executor>,
    preflight: Arc<dyn Preflight>,
    recorder: Option<ReceiptRecorder>,
    telemetry: Arc<dyn TelemetrySink>,
    redactor: Redactor,
    timeout: Duration,
    capacity: usize,
}

impl ActionBusBuilder {
    /// Take timeout, event capacity and redaction rules from `config`.
    pub fn config(mut self, config: &Config) -> Result<Self> {
        self.redactor = config.redaction.redactor()?;
        self.timeout = config.confirmation.timeout();
        self.capacity = config.events.capacity;
        Ok(self)
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn recorder(mut self, recorder: ReceiptRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build(self) -> ActionBus {
        let (events, _) = broadcast::channel(self.capacity.max(1));
        let recorder = self
            .recorder
            .unwrap_or_else(|| {
                ReceiptRecorder::new(Box::new(MemoryReceiptStore::new()), self.redactor.clone())
            });
        ActionBus {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    actions: HashMap::new(),
                    order: Vec::new(),
                    gate: ConfirmationGate::new(self.redactor, self.timeout),
                }),
                manifest: self.manifest,
                executor: self.executor,
                preflight: self.preflight,
                recorder,
                telemetry: self.telemetry,
                events,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionBus
// ---------------------------------------------------------------------------

/// Cheap to clone; every clone drives the same registry.
#[derive(Clone)]
pub struct ActionBus {
    inner: Arc<Inner>,
}

impl ActionBus {
    pub fn builder(manifest: impl Into<Arc<TileManifest>>) -> ActionBusBuilder {
        ActionBusBuilder {
            manifest: manifest.into(),
            executor: Arc::new(AcceptAll),
            preflight: Arc::new(NoPreflight),
            recorder: None,
            telemetry: Arc::new(NullSink),
            redactor: Redactor::default(),
            timeout: Duration::from_secs(300),
            capacity: 64,
        }
    }

    pub fn manifest(&self) -> &TileManifest {
        &self.inner.manifest
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.inner.events.subscribe(),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate `draft`, register it and start its runway.
    ///
    /// Malformed or unknown drafts fail here and are never registered. Every
    /// other outcome, including denial, timeout and failure, arrives as the
    /// receipt the returned [`Submission`] resolves to.
    pub fn submit(&self, draft: ActionDraft) -> Result<Submission> {
        draft.validate(&self.inner.manifest)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CanvasError::NoRuntime)?;

        let action = Action::from_draft(draft);
        let id = action.id;
        tracing::info!(
            action_id = %id,
            action_type = %action.action_type,
            tier = %action.risk_tier,
            "action submitted"
        );
        {
            let mut reg = self.inner.lock();
            reg.order.push(id);
            reg.actions.insert(
                id,
                Entry {
                    action,
                    resolver: None,
                    detail: None,
                    receipt: None,
                },
            );
        }
        self.transition(id, RunwayEvent::Start)?;

        let bus = self.clone();
        let handle = runtime.spawn(async move { bus.drive(id).await });
        Ok(Submission {
            action_id: id,
            handle,
        })
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Approve a `PENDING` action. Anything else is a logged no-op.
    ///
    /// `tier` must match the action's tier, so a prompt rendered for one
    /// tier cannot approve an action of another.
    pub fn approve(&self, action_id: Uuid, tier: RiskTier) -> bool {
        self.decide(action_id, Some(tier), RunwayEvent::Approve, None)
    }

    /// Deny a `PENDING` action, cancelling it. Anything else is a logged no-op.
    pub fn deny(&self, action_id: Uuid, tier: RiskTier) -> bool {
        self.decide(
            action_id,
            Some(tier),
            RunwayEvent::Deny,
            Some("denied by reviewer".to_string()),
        )
    }

    fn expire(&self, action_id: Uuid, after: Duration) -> bool {
        self.decide(
            action_id,
            None,
            RunwayEvent::Expire,
            Some(format!("no decision within {}s", after.as_secs())),
        )
    }

    fn decide(
        &self,
        action_id: Uuid,
        tier: Option<RiskTier>,
        event: RunwayEvent,
        detail: Option<String>,
    ) -> bool {
        let (to, resolver, promoted) = {
            let mut reg = self.inner.lock();
            let Some(entry) = reg.actions.get_mut(&action_id) else {
                tracing::warn!(%action_id, %event, "decision for unknown action ignored");
                return false;
            };
            if entry.action.status != RunwayState::Pending {
                tracing::warn!(
                    %action_id,
                    %event,
                    status = %entry.action.status,
                    "decision outside PENDING ignored"
                );
                return false;
            }
            if let Some(tier) = tier {
                if tier != entry.action.risk_tier {
                    tracing::warn!(
                        %action_id,
                        %event,
                        expected = %entry.action.risk_tier,
                        got = %tier,
                        "decision with mismatched tier ignored"
                    );
                    return false;
                }
            }
            let Some(to) = runway::next(RunwayState::Pending, event, entry.action.risk_tier)
            else {
                return false;
            };
            let Some(resolver) = entry.resolver.take() else {
                return false;
            };
            entry.action.status = to;
            entry.detail = detail;
            let promoted = reg.gate.resolve(action_id);
            (to, resolver, promoted)
        };

        self.announce_transition(action_id, RunwayState::Pending, to);
        if to.is_terminal() {
            // Failure is already logged and reported by `record_terminal`.
            let _ = self.record_terminal(action_id);
        }
        self.publish(BusEvent::ConfirmationCleared { action_id });
        if let Some(next) = promoted {
            self.show_confirmation(next);
        }
        if resolver.send(to).is_err() {
            tracing::error!(%action_id, "runway task vanished while pending");
        }
        true
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn action(&self, action_id: Uuid) -> Option<Action> {
        self.inner
            .lock()
            .actions
            .get(&action_id)
            .map(|e| e.action.clone())
    }

    /// Every registered action, in submission order.
    pub fn actions(&self) -> Vec<Action> {
        let reg = self.inner.lock();
        reg.order
            .iter()
            .filter_map(|id| reg.actions.get(id))
            .map(|e| e.action.clone())
            .collect()
    }

    pub fn pending(&self) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|a| a.status == RunwayState::Pending)
            .collect()
    }

    pub fn visible_confirmation(&self) -> Option<ConfirmationRequest> {
        self.inner.lock().gate.visible().cloned()
    }

    pub fn receipt(&self, action_id: Uuid) -> Result<Option<Receipt>> {
        self.inner.recorder.get(action_id)
    }

    pub fn receipts(&self) -> Result<Vec<Receipt>> {
        self.inner.recorder.list()
    }

    /// Drop terminal actions from the registry. Their receipts stay.
    /// Actions whose receipt is not stored yet are kept.
    pub fn forget_terminal(&self) -> usize {
        let mut reg = self.inner.lock();
        let before = reg.actions.len();
        reg.actions
            .retain(|_, e| !e.action.status.is_terminal() || e.receipt.is_none());
        let Registry { actions, order, .. } = &mut *reg;
        order.retain(|id| actions.contains_key(id));
        before - actions.len()
    }

    // -----------------------------------------------------------------------
    // Runway driver
    // -----------------------------------------------------------------------

    async fn drive(self, action_id: Uuid) -> Result<Receipt> {
        if let Err(fault) = self.run_runway(action_id).await {
            self.fault(action_id, &fault);
        }
        self.settled(action_id)
    }

    async fn run_runway(&self, action_id: Uuid) -> Result<()> {
        let action = self.snapshot(action_id)?;
        if let Err(rejection) = self.inner.preflight.check(&action).await {
            self.set_detail(action_id, rejection.reason);
            self.transition(action_id, RunwayEvent::PreflightFailed)?;
            return Ok(());
        }
        self.transition(action_id, RunwayEvent::PreflightPassed)?;
        self.transition(action_id, RunwayEvent::Drafted)?;
        self.transition(action_id, RunwayEvent::Submit)?;

        if action.risk_tier.requires_confirmation() {
            let woken = self.enter_pending(action_id)?;
            let decided = woken.await.map_err(|_| {
                CanvasError::Internal("pending resolver dropped without a decision".to_string())
            })?;
            if decided.is_terminal() {
                return Ok(());
            }
        } else {
            self.transition(action_id, RunwayEvent::Route)?;
        }

        self.transition(action_id, RunwayEvent::Execute)?;
        let action = self.snapshot(action_id)?;
        let executor = Arc::clone(&self.inner.executor);
        let outcome = AssertUnwindSafe(async move { executor.execute(&action).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(_)) => {
                self.transition(action_id, RunwayEvent::Succeeded)?;
            }
            Ok(Err(rejection)) => {
                self.set_detail(action_id, rejection.reason);
                self.transition(action_id, RunwayEvent::Failed)?;
            }
            Err(_) => {
                return Err(CanvasError::Internal("executor panicked".to_string()));
            }
        }
        Ok(())
    }

    /// `SUBMITTING -> PENDING`, parking a resolver and asking the gate for a
    /// confirmation in the same critical section.
    fn enter_pending(&self, action_id: Uuid) -> Result<oneshot::Receiver<RunwayState>> {
        let (tx, rx) = oneshot::channel();
        let (from, admission) = {
            let mut reg = self.inner.lock();
            let entry = reg
                .actions
                .get_mut(&action_id)
                .ok_or(CanvasError::ActionNotFound(action_id))?;
            let from = entry.action.status;
            let to = runway::step(from, RunwayEvent::Route, entry.action.risk_tier)?;
            entry.action.status = to;
            entry.resolver = Some(tx);
            let action = entry.action.clone();
            let label = self
                .inner
                .manifest
                .find_verb(&action.action_type)
                .map(|hit| hit.verb.label.clone());
            let admission = reg.gate.request_confirmation(&action, label.as_deref());
            (from, admission)
        };

        self.announce_transition(action_id, from, RunwayState::Pending);
        match admission {
            Admission::Visible(request) => self.show_confirmation(request),
            Admission::Queued { position } => {
                tracing::info!(%action_id, position, "confirmation queued");
                self.publish(BusEvent::ConfirmationQueued {
                    action_id,
                    position,
                });
            }
        }
        Ok(rx)
    }

    fn show_confirmation(&self, request: ConfirmationRequest) {
        let action_id = request.action_id;
        tracing::info!(%action_id, tier = %request.risk_tier, "confirmation requested");
        self.publish(BusEvent::ConfirmationRequested { request });
        self.arm_timeout(action_id);
    }

    fn arm_timeout(&self, action_id: Uuid) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(%action_id, "no runtime; confirmation timeout not armed");
            return;
        };
        let timeout = self.inner.lock().gate.timeout();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                let bus = ActionBus { inner };
                if bus.expire(action_id, timeout) {
                    tracing::info!(%action_id, "confirmation timed out");
                }
            }
        });
    }

    /// Force a non-terminal action into `ERROR` after an internal fault.
    fn fault(&self, action_id: Uuid, fault: &CanvasError) {
        tracing::error!(%action_id, error = %fault, "internal fault on runway");
        telemetry::emit(
            self.inner.telemetry.as_ref(),
            "engine.fault",
            json!({ "action_id": action_id, "error": fault.to_string() }),
        );
        let still_running = self
            .snapshot(action_id)
            .map(|a| !a.status.is_terminal())
            .unwrap_or(false);
        if still_running {
            self.set_detail(action_id, fault.to_string());
            if let Err(e) = self.transition(action_id, RunwayEvent::Fault) {
                tracing::error!(%action_id, error = %e, "could not force action into ERROR");
            }
        }
    }

    /// The receipt the runway ended with. Falls back to the store when the
    /// entry has already been forgotten, which only happens once it is
    /// recorded.
    fn settled(&self, action_id: Uuid) -> Result<Receipt> {
        let missing =
            || CanvasError::Internal(format!("action {action_id} ended without a receipt"));
        let stored = {
            let mut reg = self.inner.lock();
            reg.actions.get_mut(&action_id).map(|entry| {
                entry.resolver = None;
                entry.receipt.clone()
            })
        };
        match stored {
            Some(Some(receipt)) => Ok(receipt),
            Some(None) => Err(missing()),
            None => self.inner.recorder.get(action_id)?.ok_or_else(missing),
        }
    }

    /// Record the receipt for an action that just became terminal and
    /// announce it. Called by whoever made the terminal transition.
    fn record_terminal(&self, action_id: Uuid) -> Result<Receipt> {
        let (action, detail) = {
            let reg = self.inner.lock();
            let entry = reg
                .actions
                .get(&action_id)
                .ok_or(CanvasError::ActionNotFound(action_id))?;
            (entry.action.clone(), entry.detail.clone())
        };

        let receipt = match self.inner.recorder.record(&action, action.status, detail) {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(%action_id, error = %e, "receipt recording failed");
                telemetry::emit(
                    self.inner.telemetry.as_ref(),
                    "receipt.fault",
                    json!({ "action_id": action_id, "error": e.to_string() }),
                );
                return Err(e);
            }
        };

        if let Some(entry) = self.inner.lock().actions.get_mut(&action_id) {
            entry.receipt = Some(receipt.clone());
        }
        tracing::info!(%action_id, status = %receipt.final_status, "receipt recorded");
        telemetry::emit(
            self.inner.telemetry.as_ref(),
            "receipt.recorded",
            json!({
                "action_id": action_id,
                "action_type": receipt.action_type,
                "final_status": receipt.final_status,
            }),
        );
        self.publish(BusEvent::ReceiptRecorded {
            receipt: receipt.clone(),
        });
        Ok(receipt)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transition(&self, action_id: Uuid, event: RunwayEvent) -> Result<RunwayState> {
        let (from, to) = {
            let mut reg = self.inner.lock();
            let entry = reg
                .actions
                .get_mut(&action_id)
                .ok_or(CanvasError::ActionNotFound(action_id))?;
            let from = entry.action.status;
            let to = runway::step(from, event, entry.action.risk_tier)?;
            entry.action.status = to;
            (from, to)
        };
        self.announce_transition(action_id, from, to);
        if to.is_terminal() {
            self.record_terminal(action_id)?;
        }
        Ok(to)
    }

    fn announce_transition(&self, action_id: Uuid, from: RunwayState, to: RunwayState) {
        tracing::debug!(%action_id, %from, %to, "runway transition");
        telemetry::emit(
            self.inner.telemetry.as_ref(),
            "runway.transition",
            json!({ "action_id": action_id, "from": from, "to": to }),
        );
        self.publish(BusEvent::Transition {
            action_id,
            from,
            to,
        });
    }

    fn publish(&self, event: BusEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn snapshot(&self, action_id: Uuid) -> Result<Action> {
        self.action(action_id)
            .ok_or(CanvasError::ActionNotFound(action_id))
    }

    fn set_detail(&self, action_id: Uuid, detail: String) {
        if let Some(entry) = self.inner.lock().actions.get_mut(&action_id) {
            entry.detail = Some(detail);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{FnExecutor, FnPreflight, Rejection};
    use crate::telemetry::MemorySink;
    use serde_json::Value;

    fn bus() -> ActionBus {
        ActionBus::builder(TileManifest::starter()).build()
    }

    fn bus_with_timeout(timeout: Duration) -> ActionBus {
        ActionBus::builder(TileManifest::starter())
            .confirmation_timeout(timeout)
            .build()
    }

    /// Everything delivered so far.
    fn drain(sub: &mut Subscription) -> Vec<BusEvent> {
        let mut out = Vec::new();
        while let Some(e) = sub.try_recv() {
            out.push(e);
        }
        out
    }

    fn path_of(events: &[BusEvent], id: Uuid) -> Vec<RunwayState> {
        let mut path = vec![RunwayState::Idle];
        for e in events {
            if let BusEvent::Transition { action_id, to, .. } = e {
                if *action_id == id {
                    path.push(*to);
                }
            }
        }
        path
    }

    async fn next_confirmation(sub: &mut Subscription) -> ConfirmationRequest {
        loop {
            match sub.recv().await {
                Some(BusEvent::ConfirmationRequested { request }) => return request,
                Some(_) => continue,
                None => panic!("bus closed"),
            }
        }
    }

    #[tokio::test]
    async fn green_runs_straight_to_receipt() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("email.send", RiskTier::Green).payload("to", "ops@example.com"))
            .unwrap();
        let id = submission.action_id();
        let receipt = submission.await.unwrap();

        assert_eq!(receipt.final_status, RunwayState::ReceiptReady);
        let events = drain(&mut sub);
        assert!(!events
            .iter()
            .any(|e| matches!(e, BusEvent::ConfirmationRequested { .. })));
        assert_eq!(path_of(&events, id), runway::happy_path(RiskTier::Green));
        assert_eq!(bus.receipts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn yellow_deny_cancels_with_one_receipt() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow).payload("amount", 40))
            .unwrap();
        let id = submission.action_id();

        let request = next_confirmation(&mut sub).await;
        assert_eq!(request.action_id, id);
        assert_eq!(request.label.as_deref(), Some("Create invoice"));
        assert!(bus.deny(id, RiskTier::Yellow));

        let receipt = submission.await.unwrap();
        assert_eq!(receipt.final_status, RunwayState::Cancelled);
        assert_eq!(receipt.detail.as_deref(), Some("denied by reviewer"));
        let receipts = bus.receipts().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].final_status, RunwayState::Cancelled);
    }

    #[tokio::test]
    async fn yellow_approve_visits_pending_then_executes() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let id = submission.action_id();
        next_confirmation(&mut sub).await;
        assert!(bus.approve(id, RiskTier::Yellow));
        let receipt = submission.await.unwrap();

        assert_eq!(receipt.final_status, RunwayState::ReceiptReady);
        assert_eq!(path_of(&drain(&mut sub), id), runway::happy_path(RiskTier::Yellow));
    }

    #[tokio::test]
    async fn red_times_out_without_decision() {
        let bus = bus_with_timeout(Duration::from_millis(30));
        let submission = bus
            .submit(ActionDraft::new("invoice.void", RiskTier::Red).payload("invoice_id", "inv-9"))
            .unwrap();
        let id = submission.action_id();
        let receipt = submission.await.unwrap();

        assert_eq!(receipt.final_status, RunwayState::Timeout);
        let receipts = bus.receipts().unwrap();
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].action_id, id);
        // A late decision changes nothing.
        assert!(!bus.approve(id, RiskTier::Red));
        assert_eq!(bus.action(id).unwrap().status, RunwayState::Timeout);
    }

    #[tokio::test]
    async fn confirmations_are_shown_one_at_a_time() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let first = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let second = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let ids = [first.action_id(), second.action_id()];

        let shown = next_confirmation(&mut sub).await;
        // Wait until the other one has queued behind it.
        loop {
            if bus.pending().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(bus.visible_confirmation().unwrap().action_id, shown.action_id);
        let other = *ids.iter().find(|id| **id != shown.action_id).unwrap();

        assert!(bus.deny(shown.action_id, RiskTier::Yellow));
        let promoted = next_confirmation(&mut sub).await;
        assert_eq!(promoted.action_id, other);
        assert!(bus.approve(other, RiskTier::Yellow));

        let (a, b) = (first.await.unwrap(), second.await.unwrap());
        let statuses: Vec<RunwayState> = [a, b]
            .iter()
            .map(|r| r.final_status)
            .collect();
        assert!(statuses.contains(&RunwayState::Cancelled));
        assert!(statuses.contains(&RunwayState::ReceiptReady));
        assert!(bus.visible_confirmation().is_none());
    }

    #[tokio::test]
    async fn duplicate_and_mismatched_decisions_are_noops() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.void", RiskTier::Red))
            .unwrap();
        let id = submission.action_id();
        next_confirmation(&mut sub).await;

        assert!(!bus.approve(id, RiskTier::Yellow));
        assert!(!bus.approve(Uuid::new_v4(), RiskTier::Red));
        assert!(bus.approve(id, RiskTier::Red));
        assert!(!bus.approve(id, RiskTier::Red));
        assert!(!bus.deny(id, RiskTier::Red));

        let receipt = submission.await.unwrap();
        assert_eq!(receipt.final_status, RunwayState::ReceiptReady);
        assert_eq!(bus.receipts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approve_on_green_action_is_noop() {
        let bus = bus();
        let submission = bus
            .submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap();
        let id = submission.action_id();
        assert!(!bus.approve(id, RiskTier::Green));
        assert_eq!(submission.await.unwrap().final_status, RunwayState::ReceiptReady);
    }

    #[tokio::test]
    async fn validation_fault_never_registers() {
        let bus = bus();
        let err = bus
            .submit(ActionDraft::new("calendar.book", RiskTier::Green))
            .err()
            .unwrap();
        assert!(matches!(err, CanvasError::UnknownActionType(_)));
        let err = bus
            .submit(ActionDraft::new("not a type", RiskTier::Green))
            .err()
            .unwrap();
        assert!(matches!(err, CanvasError::InvalidActionType(_)));
        assert!(bus.actions().is_empty());
        assert!(bus.receipts().unwrap().is_empty());
    }

    #[test]
    fn submit_outside_runtime_fails() {
        let err = bus()
            .submit(ActionDraft::new("email.send", RiskTier::Green))
            .err()
            .unwrap();
        assert!(matches!(err, CanvasError::NoRuntime));
    }

    #[tokio::test]
    async fn preflight_failure_lands_in_error() {
        let bus = ActionBus::builder(TileManifest::starter())
            .preflight(Arc::new(FnPreflight(|a: &Action| {
                if a.payload.contains_key("to") {
                    Ok(())
                } else {
                    Err(Rejection::new("missing recipient"))
                }
            })))
            .build();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap();
        let id = submission.action_id();
        let receipt = submission.await.unwrap();

        assert_eq!(receipt.final_status, RunwayState::Error);
        assert_eq!(receipt.detail.as_deref(), Some("missing recipient"));
        assert_eq!(
            path_of(&drain(&mut sub), id),
            vec![RunwayState::Idle, RunwayState::Preflight, RunwayState::Error]
        );
    }

    #[tokio::test]
    async fn execution_failure_lands_in_error() {
        let bus = ActionBus::builder(TileManifest::starter())
            .executor(Arc::new(FnExecutor(|_: &Action| {
                Err(Rejection::new("smtp unavailable"))
            })))
            .build();
        let receipt = bus
            .submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(receipt.final_status, RunwayState::Error);
        assert_eq!(receipt.detail.as_deref(), Some("smtp unavailable"));
    }

    #[tokio::test]
    async fn panicking_executor_is_contained() {
        let sink = MemorySink::new();
        let bus = ActionBus::builder(TileManifest::starter())
            .executor(Arc::new(FnExecutor(|_: &Action| -> crate::executor::ExecutionResult {
                panic!("backend exploded")
            })))
            .telemetry(Arc::new(sink.clone()))
            .build();
        let receipt = bus
            .submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(receipt.final_status, RunwayState::Error);
        assert_eq!(sink.count("engine.fault"), 1);
    }

    #[tokio::test]
    async fn telemetry_sees_every_transition() {
        let sink = MemorySink::new();
        let bus = ActionBus::builder(TileManifest::starter())
            .telemetry(Arc::new(sink.clone()))
            .build();
        bus.submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap()
            .await
            .unwrap();
        // happy path has one fewer transition than states
        let expected = runway::happy_path(RiskTier::Green).len() - 1;
        assert_eq!(sink.count("runway.transition"), expected);
        assert_eq!(sink.count("receipt.recorded"), 1);
    }

    #[tokio::test]
    async fn confirmation_payload_is_redacted() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(
                ActionDraft::new("invoice.create", RiskTier::Yellow)
                    .payload("customer", "acme")
                    .payload("api_key", "sk-live-1"),
            )
            .unwrap();
        let request = next_confirmation(&mut sub).await;
        assert_eq!(request.payload["customer"], "acme");
        assert_eq!(request.payload["api_key"], Value::from("[REDACTED]"));
        // The action itself keeps the real value for execution.
        let action = bus.action(submission.action_id()).unwrap();
        assert_eq!(action.payload["api_key"], "sk-live-1");
        bus.deny(submission.action_id(), RiskTier::Yellow);
        submission.await.unwrap();
    }

    #[tokio::test]
    async fn denial_records_receipt_before_returning() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let id = submission.action_id();
        next_confirmation(&mut sub).await;

        assert!(bus.deny(id, RiskTier::Yellow));
        assert_eq!(bus.action(id).unwrap().status, RunwayState::Cancelled);
        let receipt = bus.receipt(id).unwrap().expect("receipt stored with the denial");
        assert_eq!(receipt.final_status, RunwayState::Cancelled);
        assert_eq!(submission.await.unwrap(), receipt);
        assert_eq!(bus.receipts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn forgetting_right_after_denial_keeps_the_outcome() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let id = submission.action_id();
        next_confirmation(&mut sub).await;

        assert!(bus.deny(id, RiskTier::Yellow));
        assert_eq!(bus.forget_terminal(), 1);
        let receipt = submission.await.unwrap();
        assert_eq!(receipt.action_id, id);
        assert_eq!(receipt.final_status, RunwayState::Cancelled);
        assert_eq!(bus.receipts().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn forget_terminal_skips_live_actions() {
        let bus = bus();
        let mut sub = bus.subscribe();
        let submission = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let id = submission.action_id();
        next_confirmation(&mut sub).await;

        assert_eq!(bus.forget_terminal(), 0);
        assert!(bus.approve(id, RiskTier::Yellow));
        assert_eq!(submission.await.unwrap().final_status, RunwayState::ReceiptReady);
        assert_eq!(bus.forget_terminal(), 1);
    }

    #[tokio::test]
    async fn each_visible_confirmation_gets_its_own_window() {
        let timeout = Duration::from_millis(80);
        let bus = bus_with_timeout(timeout);
        let mut sub = bus.subscribe();
        let started = tokio::time::Instant::now();
        let first = bus
            .submit(ActionDraft::new("invoice.void", RiskTier::Red))
            .unwrap();
        let shown = next_confirmation(&mut sub).await;
        assert_eq!(shown.action_id, first.action_id());
        let second = bus
            .submit(ActionDraft::new("invoice.create", RiskTier::Yellow))
            .unwrap();
        let second_id = second.action_id();

        assert_eq!(first.await.unwrap().final_status, RunwayState::Timeout);
        // The queued one did not expire with it; it is now the visible one.
        let promoted = next_confirmation(&mut sub).await;
        assert_eq!(promoted.action_id, second_id);
        assert_eq!(bus.action(second_id).unwrap().status, RunwayState::Pending);

        tokio::time::sleep(timeout / 4).await;
        assert_eq!(bus.action(second_id).unwrap().status, RunwayState::Pending);

        let receipt = second.await.unwrap();
        assert_eq!(receipt.final_status, RunwayState::Timeout);
        assert!(started.elapsed() >= timeout * 2);
        assert!(bus.visible_confirmation().is_none());
        assert_eq!(bus.receipts().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn forget_terminal_keeps_receipts() {
        let bus = bus();
        bus.submit(ActionDraft::new("email.send", RiskTier::Green))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(bus.forget_terminal(), 1);
        assert!(bus.actions().is_empty());
        assert_eq!(bus.receipts().unwrap().len(), 1);
    }
}
