use crate::types::{RiskTier, RunwayState};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("not initialized: run 'canvas init'")]
    NotInitialized,

    #[error("invalid action type '{0}': expected '<domain>.<verb>'")]
    InvalidActionType(String),

    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("invalid risk tier: {0}")]
    InvalidRiskTier(String),

    #[error("invalid runway state: {0}")]
    InvalidRunwayState(String),

    #[error("action '{action_type}' is declared {declared} but was submitted as {submitted}")]
    TierDowngrade {
        action_type: String,
        declared: RiskTier,
        submitted: RiskTier,
    },

    #[error("action not found: {0}")]
    ActionNotFound(Uuid),

    #[error("invalid transition from {from} on {event}")]
    InvalidTransition { from: RunwayState, event: String },

    #[error("receipt conflict for action {action_id}: recorded {recorded}, attempted {attempted}")]
    ReceiptConflict {
        action_id: Uuid,
        recorded: RunwayState,
        attempted: RunwayState,
    },

    #[error("cannot record a receipt for non-terminal state {0}")]
    NotTerminal(RunwayState),

    #[error("receipt store error: {0}")]
    ReceiptStore(String),

    #[error("widget not found: {0}")]
    WidgetNotFound(String),

    #[error("widget already exists: {0}")]
    WidgetExists(String),

    #[error("widget '{0}' would overlap another widget")]
    Collision(String),

    #[error("invalid widget size {width}x{height}: both sides must be positive")]
    InvalidSize { width: u32, height: u32 },

    #[error("grid unit must be greater than zero")]
    InvalidGridUnit,

    #[error("invalid key '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidKey(String),

    #[error("no async runtime available to drive the runway")]
    NoRuntime,

    #[error("internal fault: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CanvasError {
    /// True for faults that indicate an engine bug rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            CanvasError::ReceiptConflict { .. }
                | CanvasError::NotTerminal(_)
                | CanvasError::InvalidTransition { .. }
                | CanvasError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CanvasError>;
