//! Governed action data model.
//!
//! An `ActionDraft` is what callers build; the bus validates it, stamps an id
//! and timestamp, and from then on only `status` ever changes.

use crate::error::{CanvasError, Result};
use crate::manifest::TileManifest;
use crate::types::{RiskTier, RunwayState};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Action type validation
// ---------------------------------------------------------------------------

static ACTION_TYPE_RE: OnceLock<Regex> = OnceLock::new();

fn action_type_re() -> &'static Regex {
    ACTION_TYPE_RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_]*\.[a-z][a-z0-9_]*$").expect("static regex is valid")
    })
}

/// Check that `action_type` has the `<domain>.<verb>` shape.
pub fn validate_action_type(action_type: &str) -> Result<()> {
    if action_type.len() > 128 || !action_type_re().is_match(action_type) {
        return Err(CanvasError::InvalidActionType(action_type.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ActionDraft
// ---------------------------------------------------------------------------

/// An intent that has not been submitted yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDraft {
    pub action_type: String,
    pub risk_tier: RiskTier,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl ActionDraft {
    pub fn new(action_type: impl Into<String>, risk_tier: RiskTier) -> Self {
        Self {
            action_type: action_type.into(),
            risk_tier,
            payload: Map::new(),
            widget_id: None,
            actor_id: None,
            tenant_id: None,
            workspace_id: None,
        }
    }

    pub fn payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn widget(mut self, widget_id: impl Into<String>) -> Self {
        self.widget_id = Some(widget_id.into());
        self
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Reject malformed or unknown drafts before they reach the runway.
    ///
    /// The type must be well formed and offered by some verb in `manifest`,
    /// and the submitted tier may not be lower than the verb's declared tier.
    pub fn validate(&self, manifest: &TileManifest) -> Result<()> {
        validate_action_type(&self.action_type)?;
        let hit = manifest
            .find_verb(&self.action_type)
            .ok_or_else(|| CanvasError::UnknownActionType(self.action_type.clone()))?;
        if self.risk_tier < hit.verb.risk_tier {
            return Err(CanvasError::TierDowngrade {
                action_type: self.action_type.clone(),
                declared: hit.verb.risk_tier,
                submitted: self.risk_tier,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A submitted, governed intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub action_type: String,
    pub risk_tier: RiskTier,
    pub payload: Map<String, Value>,
    pub widget_id: Option<String>,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub workspace_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: RunwayState,
}

impl Action {
    /// Stamp a draft with a fresh id and timestamp, in `Idle`.
    pub fn from_draft(draft: ActionDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: draft.action_type,
            risk_tier: draft.risk_tier,
            payload: draft.payload,
            widget_id: draft.widget_id,
            actor_id: draft.actor_id,
            tenant_id: draft.tenant_id,
            workspace_id: draft.workspace_id,
            timestamp: Utc::now(),
            status: RunwayState::Idle,
        }
    }

    /// The `<domain>` half of the action type.
    pub fn domain(&self) -> &str {
        self.action_type
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.action_type)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
