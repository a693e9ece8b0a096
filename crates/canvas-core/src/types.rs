use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// How much human involvement an action needs before it may execute.
///
/// Ordered from least to most risky so that `declared <= submitted` checks
/// read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Green,
    Yellow,
    Red,
}

impl RiskTier {
    pub fn all() -> &'static [RiskTier] {
        &[RiskTier::Green, RiskTier::Yellow, RiskTier::Red]
    }

    /// GREEN is auto-approved; everything else goes through the gate.
    pub fn requires_confirmation(self) -> bool {
        !matches!(self, RiskTier::Green)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Green => "GREEN",
            RiskTier::Yellow => "YELLOW",
            RiskTier::Red => "RED",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = crate::error::CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GREEN" => Ok(RiskTier::Green),
            "YELLOW" => Ok(RiskTier::Yellow),
            "RED" => Ok(RiskTier::Red),
            _ => Err(crate::error::CanvasError::InvalidRiskTier(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// RunwayState
// ---------------------------------------------------------------------------

/// Lifecycle position of one governed action.
///
/// The first eight variants are the progress steps, in order. The last four
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunwayState {
    Idle,
    Preflight,
    Drafting,
    DraftReady,
    Submitting,
    Pending,
    Approved,
    Executing,
    ReceiptReady,
    Error,
    Cancelled,
    Timeout,
}

impl RunwayState {
    pub fn all() -> &'static [RunwayState] {
        &[
            RunwayState::Idle,
            RunwayState::Preflight,
            RunwayState::Drafting,
            RunwayState::DraftReady,
            RunwayState::Submitting,
            RunwayState::Pending,
            RunwayState::Approved,
            RunwayState::Executing,
            RunwayState::ReceiptReady,
            RunwayState::Error,
            RunwayState::Cancelled,
            RunwayState::Timeout,
        ]
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunwayState::ReceiptReady
                | RunwayState::Error
                | RunwayState::Cancelled
                | RunwayState::Timeout
        )
    }

    /// Only `ReceiptReady` counts as success.
    pub fn is_success(self) -> bool {
        self == RunwayState::ReceiptReady
    }

    /// Progress step `0..=7` for non-terminal states, `None` once terminal.
    pub fn step(self) -> Option<u8> {
        if self.is_terminal() {
            None
        } else {
            Some(self as u8)
        }
    }

    /// Progress step as a signed index, `-1` for terminal states.
    pub fn step_index(self) -> i8 {
        self.step().map_or(-1, |s| s as i8)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunwayState::Idle => "IDLE",
            RunwayState::Preflight => "PREFLIGHT",
            RunwayState::Drafting => "DRAFTING",
            RunwayState::DraftReady => "DRAFT_READY",
            RunwayState::Submitting => "SUBMITTING",
            RunwayState::Pending => "PENDING",
            RunwayState::Approved => "APPROVED",
            RunwayState::Executing => "EXECUTING",
            RunwayState::ReceiptReady => "RECEIPT_READY",
            RunwayState::Error => "ERROR",
            RunwayState::Cancelled => "CANCELLED",
            RunwayState::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for RunwayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunwayState {
    type Err = crate::error::CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunwayState::all()
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::CanvasError::InvalidRunwayState(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
