//! Tolerant parsing of proposal generator output.
//!
//! Models wrap JSON in prose or markdown fences often enough that a strict
//! `serde_json::from_str` on the whole reply would burn retries for nothing.
//! The JSON object is taken from a ```json fence when present, otherwise
//! the first balanced `{...}` in the text.

use serde::Deserialize;

use tabula_types::error::AttemptError;
use tabula_types::proposal::Proposal;

#[derive(Debug, Deserialize)]
struct RawProposal {
    #[serde(alias = "action")]
    kind: String,
    #[serde(default)]
    content: serde_json::Value,
}

/// Parse raw generator output into a [`Proposal`].
pub fn parse_proposal(raw: &str) -> Result<Proposal, AttemptError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| AttemptError::ProposalParse(format!("no JSON object in response: {}", preview(raw))))?;

    let parsed: RawProposal = serde_json::from_str(json)
        .map_err(|e| AttemptError::ProposalParse(format!("{e}: {}", preview(json))))?;

    let content = match parsed.content {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };

    match parsed.kind.trim().to_ascii_lowercase().as_str() {
        "answer" => Ok(Proposal::Answer(content)),
        "clarify" => Ok(Proposal::Clarify(content)),
        "code" => {
            let code = strip_code_fence(&content);
            if code.trim().is_empty() {
                return Err(AttemptError::ProposalParse(
                    "code proposal has empty content".to_string(),
                ));
            }
            Ok(Proposal::Code(code.to_string()))
        }
        other => Err(AttemptError::ProposalParse(format!(
            "unknown proposal kind '{other}'"
        ))),
    }
}

/// Locate the JSON object inside a model reply.
fn extract_json_object(raw: &str) -> Option<&str> {
    if let Some(start) = raw.find("```json") {
        let body = &raw[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            if let Some(obj) = first_balanced_object(&body[..end]) {
                return Some(obj);
            }
        }
    }
    first_balanced_object(raw)
}

/// First `{...}` whose braces balance, ignoring braces inside JSON strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove a surrounding ```lang ... ``` fence from generated code.
fn strip_code_fence(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the language tag line, if any.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
