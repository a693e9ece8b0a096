//! Terminal confirmation prompts and `key=value` payload parsing.

use anyhow::bail;
use canvas_core::confirmation::ConfirmationRequest;
use canvas_core::types::RiskTier;
use serde_json::{Map, Value};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Approve,
    Deny,
}

/// Interpret what the reviewer typed.
///
/// YELLOW takes `y`/`yes`. RED only accepts the exact action type, so a
/// reflexive "y" never approves anything destructive.
pub fn interpret(request: &ConfirmationRequest, input: &str) -> Answer {
    let input = input.trim();
    let approved = if request.needs_typed_confirmation() {
        input == request.action_type
    } else {
        input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes")
    };
    if approved {
        Answer::Approve
    } else {
        Answer::Deny
    }
}

pub fn render(request: &ConfirmationRequest) -> String {
    let mut out = String::new();
    let title = request.label.as_deref().unwrap_or(&request.action_type);
    out.push_str(&format!("[{}] {title} ({})\n", request.risk_tier, request.action_type));
    for (key, value) in &request.payload {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        out.push_str(&format!("  {key}: {value}\n"));
    }
    if let Some(widget) = &request.widget_id {
        out.push_str(&format!("  widget: {widget}\n"));
    }
    if let Some(expires) = request.expires_at {
        out.push_str(&format!("  expires: {}\n", expires.format("%H:%M:%S UTC")));
    }
    if request.needs_typed_confirmation() {
        out.push_str(&format!("Type '{}' to approve: ", request.action_type));
    } else {
        out.push_str("Approve? [y/N] ");
    }
    out
}

/// Show `request` on `output` and read one answer from `input`.
///
/// `assume_yes` approves YELLOW without reading. RED always asks.
pub fn ask<R: BufRead, W: Write>(
    request: &ConfirmationRequest,
    assume_yes: bool,
    input: &mut R,
    output: &mut W,
) -> io::Result<Answer> {
    if assume_yes && request.risk_tier == RiskTier::Yellow {
        writeln!(output, "[{}] {} approved (--yes)", request.risk_tier, request.action_type)?;
        return Ok(Answer::Approve);
    }
    write!(output, "{}", render(request))?;
    output.flush()?;
    let mut line = String::new();
    // EOF reads as an empty answer, which denies.
    input.read_line(&mut line)?;
    Ok(interpret(request, &line))
}

/// Parse repeated `key=value` arguments. Values that parse as JSON (numbers,
/// booleans, quoted strings, objects) keep their type; anything else is a
/// plain string.
pub fn parse_payload(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut payload = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("invalid payload entry '{pair}': expected key=value");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid payload entry '{pair}': empty key");
        }
        let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
        payload.insert(key.to_string(), value);
    }
    Ok(payload)
}
