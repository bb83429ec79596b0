//! Recovery of tool calls that an upstream emitted as plain text.
//!
//! Some Together-routed models put tool invocations in `content` instead of
//! the structured `tool_calls` field. Two recognizers run over the text and
//! their results are concatenated, tagged blocks first:
//!
//! 1. Kimi-style marker blocks:
//!    `<|tool_call_begin|> functions.NAME:IDX <|tool_call_argument_begin|> {json} <|tool_call_end|>`
//! 2. Bare JSON objects shaped `{"tool": ..., "args": ...}` embedded anywhere in prose.
//!
//! Neither pass fails: unparseable arguments become `{"raw": ...}` and
//! unparseable embedded objects are skipped.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

use super::types::{raw_arguments, ToolCallRequest};

/// Marker tokens are accepted with or without the `|` delimiters.
static TAGGED_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)<\|?tool_call_begin\|?>\s*(\S+?)\s*<\|?tool_call_argument_begin\|?>\s*(\{.*?\})\s*<\|?tool_call_end\|?>",
    )
    .expect("TAGGED_CALL is a compile-time constant")
});

/// Model-side tool names that differ from ours.
fn canonical_tool_name(raw: &str) -> String {
    let name = raw.strip_prefix("functions.").unwrap_or(raw);
    match name {
        "execute_command" => "exec".to_string(),
        other => other.to_string(),
    }
}

/// Run both recognizers over `content`. Returns an empty vec when nothing matches.
pub fn extract_tool_calls(content: &str) -> Vec<ToolCallRequest> {
    let mut calls = tagged_calls(content);
    let tagged = calls.len();

    for object in json_objects(content) {
        let Value::Object(mut object) = object else {
            continue;
        };
        if !object.contains_key("tool") || !object.contains_key("args") {
            continue;
        }
        let name = match object.remove("tool") {
            Some(Value::String(name)) => name,
            Some(other) => other.to_string(),
            None => continue,
        };
        let arguments = match object.remove("args") {
            Some(Value::Object(args)) => args,
            Some(other) => raw_arguments(other),
            None => continue,
        };
        let id = format!("synthetic_json_{}", calls.len() + 1);
        calls.push(ToolCallRequest::new(id, canonical_tool_name(&name), arguments));
    }

    if !calls.is_empty() {
        debug!(
            tagged,
            embedded = calls.len() - tagged,
            "Recovered tool calls from response text"
        );
    }
    calls
}

fn tagged_calls(content: &str) -> Vec<ToolCallRequest> {
    TAGGED_CALL
        .captures_iter(content)
        .enumerate()
        .map(|(idx, caps)| {
            // `functions.exec:2` -> `functions.exec`
            let raw_name = caps[1].split(':').next().unwrap_or_default();
            let raw_args = &caps[2];
            let arguments = serde_json::from_str::<Map<String, Value>>(raw_args)
                .unwrap_or_else(|_| raw_arguments(raw_args));
            ToolCallRequest::new(format!("synthetic_{}", idx + 1), canonical_tool_name(raw_name), arguments)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Plain,
    InString,
    Escaped,
}

/// Top-level JSON objects found anywhere in `text`, in order.
///
/// Single left-to-right pass. Braces only count outside double-quoted
/// strings; a backslash inside a string escapes the next byte. Each time
/// the depth returns to zero the enclosed span is offered to `serde_json`
/// and kept if it parses.
pub(crate) fn json_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut objects = Vec::new();
    let mut state = ScanState::Plain;
    let mut depth = 0usize;
    let mut start = None;

    for (i, &b) in bytes.iter().enumerate() {
        state = match (state, b) {
            (ScanState::Escaped, _) => ScanState::InString,
            (ScanState::InString, b'\\') => ScanState::Escaped,
            (ScanState::InString, b'"') => ScanState::Plain,
            (ScanState::InString, _) => ScanState::InString,
            (ScanState::Plain, b'"') => ScanState::InString,
            (ScanState::Plain, b'{') => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
                ScanState::Plain
            }
            (ScanState::Plain, b'}') => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            // Braces are ASCII, so both ends are char boundaries.
                            if let Ok(value) = serde_json::from_str(&text[s..=i]) {
                                objects.push(value);
                            }
                        }
                    }
                }
                ScanState::Plain
            }
            (ScanState::Plain, _) => ScanState::Plain,
        };
    }
    objects
}
