use crate::error::{CanvasError, Result};
use regex::Regex;
use serde_json::{Map, Value};

pub const DEFAULT_MARKER: &str = "[REDACTED]";

pub fn default_patterns() -> Vec<String> {
    ["password", "token", "secret", "key", "credential"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Replaces values under sensitive-looking keys before a payload is shown to
/// a human or written into a receipt summary.
///
/// A key is sensitive when it contains any configured fragment,
/// case-insensitively. Nested objects and arrays are walked; the value under
/// a sensitive key is replaced wholesale, whatever its shape.
#[derive(Debug, Clone)]
pub struct Redactor {
    matcher: Option<Regex>,
    marker: String,
}

impl Redactor {
    pub fn new(patterns: &[String], marker: impl Into<String>) -> Result<Self> {
        let fragments: Vec<String> = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(regex::escape)
            .collect();

        let matcher = if fragments.is_empty() {
            None
        } else {
            let source = format!("(?i)(?:{})", fragments.join("|"));
            Some(Regex::new(&source).map_err(|e| CanvasError::Internal(e.to_string()))?)
        };

        Ok(Self {
            matcher,
            marker: marker.into(),
        })
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(key))
    }

    pub fn redact_map(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        payload
            .iter()
            .map(|(k, v)| {
                let value = if self.is_sensitive(k) {
                    Value::String(self.marker.clone())
                } else {
                    self.redact_value(v)
                };
                (k.clone(), value)
            })
            .collect()
    }

    pub fn redact_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.redact_map(map)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_value(v)).collect()),
            other => other.clone(),
        }
    }

    /// Compact single-line summary of a redacted payload, capped at `max_chars`.
    pub fn summarize(&self, payload: &Map<String, Value>, max_chars: usize) -> String {
        let redacted = Value::Object(self.redact_map(payload));
        let text = serde_json::to_string(&redacted).unwrap_or_default();
        if text.chars().count() <= max_chars {
            return text;
        }
        let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
        cut.push('\u{2026}');
        cut
    }
}

impl Default for Redactor {
    fn default() -> Self {
        // The default fragments are plain words, so construction cannot fail.
        Self::new(&default_patterns(), DEFAULT_MARKER).unwrap_or(Self {
            matcher: None,
            marker: DEFAULT_MARKER.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
