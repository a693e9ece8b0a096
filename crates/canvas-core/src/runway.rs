//! Pure runway transition table.
//!
//! `next` only answers "where does this event lead from here"; recording the
//! move, emitting events and writing receipts is the action bus's job.

use crate::error::{CanvasError, Result};
use crate::types::{RiskTier, RunwayState};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RunwayEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunwayEvent {
    Start,
    PreflightPassed,
    PreflightFailed,
    Drafted,
    Submit,
    /// Leave `Submitting`; the risk tier picks the destination.
    Route,
    Approve,
    Deny,
    Expire,
    Execute,
    Succeeded,
    Failed,
    /// Unexpected internal fault. Valid from every non-terminal state.
    Fault,
}

impl RunwayEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            RunwayEvent::Start => "start",
            RunwayEvent::PreflightPassed => "preflight_passed",
            RunwayEvent::PreflightFailed => "preflight_failed",
            RunwayEvent::Drafted => "drafted",
            RunwayEvent::Submit => "submit",
            RunwayEvent::Route => "route",
            RunwayEvent::Approve => "approve",
            RunwayEvent::Deny => "deny",
            RunwayEvent::Expire => "expire",
            RunwayEvent::Execute => "execute",
            RunwayEvent::Succeeded => "succeeded",
            RunwayEvent::Failed => "failed",
            RunwayEvent::Fault => "fault",
        }
    }
}

impl fmt::Display for RunwayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Look up the state reached from `from` on `event` for an action of `tier`.
///
/// Returns `None` when the table has no such edge. Terminal states have no
/// outgoing edges at all, including `Fault`.
pub fn next(from: RunwayState, event: RunwayEvent, tier: RiskTier) -> Option<RunwayState> {
    use RunwayEvent as E;
    use RunwayState as S;

    if from.is_terminal() {
        return None;
    }

    match (from, event) {
        (_, E::Fault) => Some(S::Error),
        (S::Idle, E::Start) => Some(S::Preflight),
        (S::Preflight, E::PreflightPassed) => Some(S::Drafting),
        (S::Preflight, E::PreflightFailed) => Some(S::Error),
        (S::Drafting, E::Drafted) => Some(S::DraftReady),
        (S::DraftReady, E::Submit) => Some(S::Submitting),
        (S::Submitting, E::Route) if tier.requires_confirmation() => Some(S::Pending),
        (S::Submitting, E::Route) => Some(S::Approved),
        (S::Pending, E::Approve) => Some(S::Approved),
        (S::Pending, E::Deny) => Some(S::Cancelled),
        (S::Pending, E::Expire) => Some(S::Timeout),
        (S::Approved, E::Execute) => Some(S::Executing),
        (S::Executing, E::Succeeded) => Some(S::ReceiptReady),
        (S::Executing, E::Failed) => Some(S::Error),
        _ => None,
    }
}

/// Like [`next`], but an absent edge is an error.
pub fn step(from: RunwayState, event: RunwayEvent, tier: RiskTier) -> Result<RunwayState> {
    next(from, event, tier).ok_or_else(|| CanvasError::InvalidTransition {
        from,
        event: event.to_string(),
    })
}

/// Walk the happy path for `tier` from `Idle` to `ReceiptReady`, approving at
/// `Pending` when the tier needs it. Used for progress displays.
pub fn happy_path(tier: RiskTier) -> Vec<RunwayState> {
    use RunwayEvent as E;

    let mut events = vec![E::Start, E::PreflightPassed, E::Drafted, E::Submit, E::Route];
    if tier.requires_confirmation() {
        events.push(E::Approve);
    }
    events.extend([E::Execute, E::Succeeded]);

    let mut state = RunwayState::Idle;
    let mut path = vec![state];
    for event in events {
        match next(state, event, tier) {
            Some(s) => {
                state = s;
                path.push(s);
            }
            None => break,
        }
    }
    path
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use RunwayEvent as E;
    use RunwayState as S;

    #[test]
    fn green_route_skips_pending() {
        assert_eq!(next(S::Submitting, E::Route, RiskTier::Green), Some(S::Approved));
        assert!(!happy_path(RiskTier::Green).contains(&S::Pending));
    }

    #[test]
    fn yellow_and_red_route_through_pending() {
        for tier in [RiskTier::Yellow, RiskTier::Red] {
            assert_eq!(next(S::Submitting, E::Route, tier), Some(S::Pending));
            let path = happy_path(tier);
            let pending = path.iter().position(|s| *s == S::Pending).unwrap();
            let approved = path.iter().position(|s| *s == S::Approved).unwrap();
            assert!(pending < approved);
        }
    }

    #[test]
    fn happy_path_ends_in_receipt_ready() {
        for tier in RiskTier::all() {
            assert_eq!(happy_path(*tier).last(), Some(&S::ReceiptReady));
        }
    }

    #[test]
    fn pending_resolutions() {
        let t = RiskTier::Yellow;
        assert_eq!(next(S::Pending, E::Approve, t), Some(S::Approved));
        assert_eq!(next(S::Pending, E::Deny, t), Some(S::Cancelled));
        assert_eq!(next(S::Pending, E::Expire, t), Some(S::Timeout));
    }

    #[test]
    fn approve_outside_pending_has_no_edge() {
        for state in RunwayState::all() {
            if *state != S::Pending {
                assert_eq!(next(*state, E::Approve, RiskTier::Red), None, "{state}");
                assert_eq!(next(*state, E::Deny, RiskTier::Red), None, "{state}");
            }
        }
    }

    #[test]
    fn fault_reaches_error_from_any_non_terminal_state() {
        for state in RunwayState::all() {
            let result = next(*state, E::Fault, RiskTier::Green);
            if state.is_terminal() {
                assert_eq!(result, None);
            } else {
                assert_eq!(result, Some(S::Error));
            }
        }
    }

    #[test]
    fn terminal_states_never_move() {
        let events = [
            E::Start,
            E::Approve,
            E::Deny,
            E::Expire,
            E::Execute,
            E::Succeeded,
            E::Failed,
        ];
        for state in [S::ReceiptReady, S::Error, S::Cancelled, S::Timeout] {
            for event in events {
                assert_eq!(next(state, event, RiskTier::Yellow), None);
            }
        }
    }

    #[test]
    fn step_reports_invalid_transition() {
        let err = step(S::Idle, E::Execute, RiskTier::Green).unwrap_err();
        assert!(err.to_string().contains("IDLE"));
        assert!(err.is_internal());
    }

    #[test]
    fn preflight_and_execution_failures_land_in_error() {
        let t = RiskTier::Green;
        assert_eq!(next(S::Preflight, E::PreflightFailed, t), Some(S::Error));
        assert_eq!(next(S::Executing, E::Failed, t), Some(S::Error));
    }
}
