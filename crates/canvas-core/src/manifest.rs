//! Read-only tile/verb registry.
//!
//! Every lookup returns an `Option` or an empty slice on a miss. An unknown
//! tile offers no verbs; an unknown action type is never executable.

use crate::error::Result;
use crate::paths;
use crate::types::RiskTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Verb / TileEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verb {
    /// Namespaced action type this verb submits, e.g. `invoice.create`.
    pub action: String,
    pub label: String,
    pub risk_tier: RiskTier,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileEntry {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub verbs: Vec<Verb>,
}

/// One hit from [`TileManifest::search_verbs`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerbMatch<'a> {
    pub tile: &'a TileEntry,
    pub verb: &'a Verb,
}

// ---------------------------------------------------------------------------
// TileManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileManifest {
    #[serde(default)]
    pub tiles: Vec<TileEntry>,
}

impl TileManifest {
    pub fn new(tiles: Vec<TileEntry>) -> Self {
        Self { tiles }
    }

    /// Load `.canvas/manifest.yaml`, or an empty manifest when absent.
    pub fn load(root: &Path) -> Result<Self> {
        Ok(crate::io::read_yaml(&paths::manifest_path(root))?.unwrap_or_default())
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_yaml(&paths::manifest_path(root), self)
    }

    pub fn get_tile(&self, tile_id: &str) -> Option<&TileEntry> {
        self.tiles.iter().find(|t| t.id == tile_id)
    }

    pub fn verbs_for(&self, tile_id: &str) -> &[Verb] {
        self.get_tile(tile_id)
            .map(|t| t.verbs.as_slice())
            .unwrap_or(&[])
    }

    /// Find the verb that submits `action_type`, along with its tile.
    pub fn find_verb(&self, action_type: &str) -> Option<VerbMatch<'_>> {
        self.tiles.iter().find_map(|tile| {
            tile.verbs
                .iter()
                .find(|v| v.action == action_type)
                .map(|verb| VerbMatch { tile, verb })
        })
    }

    pub fn knows(&self, action_type: &str) -> bool {
        self.find_verb(action_type).is_some()
    }

    /// Case-insensitive substring search over verb labels.
    ///
    /// Results keep manifest order, so hits from the same tile are adjacent
    /// and can be grouped for display. A blank query matches nothing.
    pub fn search_verbs(&self, query: &str) -> Vec<VerbMatch<'_>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.tiles
            .iter()
            .flat_map(|tile| {
                tile.verbs
                    .iter()
                    .filter(|v| v.label.to_lowercase().contains(&needle))
                    .map(move |verb| VerbMatch { tile, verb })
            })
            .collect()
    }

    /// Group search hits by owning tile, preserving order.
    pub fn group_by_tile<'a>(
        matches: &[VerbMatch<'a>],
    ) -> Vec<(&'a TileEntry, Vec<&'a Verb>)> {
        let mut groups: Vec<(&'a TileEntry, Vec<&'a Verb>)> = Vec::new();
        for m in matches {
            if let Some((tile, verbs)) = groups.last_mut() {
                if tile.id == m.tile.id {
                    verbs.push(m.verb);
                    continue;
                }
            }
            groups.push((m.tile, vec![m.verb]));
        }
        groups
    }

    /// The manifest `canvas init` writes: a couple of business tiles plus
    /// the workspace's own widget verbs.
    pub fn starter() -> Self {
        let verb = |action: &str, label: &str, risk_tier: RiskTier, fields: &[&str]| Verb {
            action: action.to_string(),
            label: label.to_string(),
            risk_tier,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        };
        Self::new(vec![
            TileEntry {
                id: "mailbox".to_string(),
                label: "Mailbox".to_string(),
                verbs: vec![
                    verb("email.send", "Send email", RiskTier::Green, &["to", "subject"]),
                    verb("email.delete", "Delete email", RiskTier::Yellow, &["message_id"]),
                ],
            },
            TileEntry {
                id: "billing".to_string(),
                label: "Billing".to_string(),
                verbs: vec![
                    verb("invoice.create", "Create invoice", RiskTier::Yellow, &["customer", "amount"]),
                    verb("invoice.void", "Void invoice", RiskTier::Red, &["invoice_id"]),
                    verb("payment.refund", "Refund payment", RiskTier::Red, &["payment_id", "amount"]),
                ],
            },
            TileEntry {
                id: "workspace".to_string(),
                label: "Workspace".to_string(),
                verbs: vec![verb("widget.remove", "Close widget", RiskTier::Yellow, &["widget_id"])],
            },
        ])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn get_tile_miss_is_none() {
        let m = TileManifest::starter();
        assert!(m.get_tile("billing").is_some());
        assert!(m.get_tile("payroll").is_none());
        assert!(m.verbs_for("payroll").is_empty());
    }

    #[test]
    fn find_verb_by_action_type() {
        let m = TileManifest::starter();
        let hit = m.find_verb("invoice.void").unwrap();
        assert_eq!(hit.tile.id, "billing");
        assert_eq!(hit.verb.risk_tier, RiskTier::Red);
        assert!(!m.knows("invoice.print"));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let m = TileManifest::starter();
        let hits = m.search_verbs("INVOICE");
        let actions: Vec<&str> = hits.iter().map(|h| h.verb.action.as_str()).collect();
        assert_eq!(actions, vec!["invoice.create", "invoice.void"]);
    }

    #[test]
    fn blank_query_matches_nothing() {
        let m = TileManifest::starter();
        assert!(m.search_verbs("   ").is_empty());
    }

    #[test]
    fn search_results_group_by_tile() {
        let m = TileManifest::starter();
        let hits = m.search_verbs("e");
        let groups = TileManifest::group_by_tile(&hits);
        let ids: Vec<&str> = groups.iter().map(|(t, _)| t.id.as_str()).collect();
        assert_eq!(ids, vec!["mailbox", "billing", "workspace"]);
        assert_eq!(groups[0].1.len(), 2);
    }

    #[test]
    fn load_missing_file_is_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let m = TileManifest::load(dir.path()).unwrap();
        assert!(m.tiles.is_empty());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let m = TileManifest::starter();
        m.save(dir.path()).unwrap();
        let yaml = std::fs::read_to_string(paths::manifest_path(dir.path())).unwrap();
        assert!(yaml.contains("risk_tier: RED"));
        assert_eq!(TileManifest::load(dir.path()).unwrap(), m);
    }
}
