//! Seams to the outside world that the runway awaits on.
//!
//! Both traits return boxed futures so they stay object safe; the bus holds
//! them as `Arc<dyn ..>` and drives them from its own task.

use crate::action::Action;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an external call said no. Carried into the receipt's `detail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for Rejection {}

pub type ExecutionResult = std::result::Result<Value, Rejection>;

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Domain-specific precondition check run in `PREFLIGHT`.
pub trait Preflight: Send + Sync {
    fn check<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<(), Rejection>>;
}

/// Passes everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreflight;

impl Preflight for NoPreflight {
    fn check<'a>(&'a self, _action: &'a Action) -> BoxFuture<'a, Result<(), Rejection>> {
        Box::pin(async { Ok(()) })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Performs an approved action. Runs in `EXECUTING`; not cancellable.
pub trait Executor: Send + Sync {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, ExecutionResult>;
}

/// Accepts every action without doing anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Executor for AcceptAll {
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(async move {
            tracing::debug!(action_id = %action.id, action_type = %action.action_type, "accepted");
            Ok(Value::Null)
        })
    }
}

/// Adapts a closure into an [`Executor`].
pub struct FnExecutor<F>(pub F);

impl<F> Executor for FnExecutor<F>
where
    F: Fn(&Action) -> ExecutionResult + Send + Sync,
{
    fn execute<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, ExecutionResult> {
        let result = (self.0)(action);
        Box::pin(async move { result })
    }
}

/// Adapts a closure into a [`Preflight`].
pub struct FnPreflight<F>(pub F);

impl<F> Preflight for FnPreflight<F>
where
    F: Fn(&Action) -> Result<(), Rejection> + Send + Sync,
{
    fn check<'a>(&'a self, action: &'a Action) -> BoxFuture<'a, Result<(), Rejection>> {
        let result = (self.0)(action);
        Box::pin(async move { result })
    }
}
