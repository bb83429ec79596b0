//! Completion response parsing.
//!
//! Turns the raw `choices[0].message` / `usage` body of an OpenAI-compatible
//! completion into an [`LlmResponse`]. Structured tool calls are used when
//! present; otherwise the text content goes through the fallback extractor
//! before it is treated as prose.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::extract::extract_tool_calls;
use super::types::{raw_arguments, LlmResponse, ToolCallRequest, Usage};
use crate::error::{LlmError, Result};

// ── OpenAI API response types ───────────────────────────────────────

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageResponse>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Deserialize)]
struct ToolCallResponse {
    #[serde(default)]
    id: Option<String>,
    function: FunctionCallResponse,
}

#[derive(Deserialize)]
struct FunctionCallResponse {
    name: String,
    /// Normally a JSON string; some servers send the decoded object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Deserialize)]
struct UsageResponse {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

/// Parse a completion body.
///
/// Fails only when the body is not a completion at all (not JSON, or no
/// choices). Malformed tool arguments never fail the response.
pub fn parse_completion(body: &str) -> Result<LlmResponse> {
    let completion: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("failed to parse completion: {e}")))?;

    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("LLM API returned no choices".into()))?;

    let content = choice.message.content;
    let tool_calls = match choice.message.tool_calls {
        Some(calls) if !calls.is_empty() => calls
            .into_iter()
            .enumerate()
            .map(|(idx, tc)| structured_call(idx, tc))
            .collect(),
        _ => content
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(extract_tool_calls)
            .unwrap_or_default(),
    };

    let usage = completion.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens.unwrap_or(0),
        completion_tokens: u.completion_tokens.unwrap_or(0),
        total_tokens: u.total_tokens.unwrap_or(0),
    });

    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        tool_calls = tool_calls.len(),
        tokens = usage.map(|u| u.total_tokens),
        "Received LLM response"
    );

    Ok(LlmResponse {
        content: if tool_calls.is_empty() { content } else { None },
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".into()),
        usage,
    })
}

fn structured_call(idx: usize, tc: ToolCallResponse) -> ToolCallRequest {
    let name = tc.function.name;
    let arguments = match tc.function.arguments {
        Value::Object(args) => args,
        Value::String(raw) => decode_arguments(&name, raw),
        Value::Null => Map::new(),
        other => raw_arguments(other),
    };
    let id = tc
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("synthetic_{}", idx + 1));
    ToolCallRequest::new(id, name, arguments)
}

fn decode_arguments(tool: &str, raw: String) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(args)) => args,
        Ok(_) => raw_arguments(raw),
        Err(e) => {
            warn!(tool, error = %e, raw = %raw, "Failed to parse tool arguments, keeping raw text");
            raw_arguments(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(message: Value, finish_reason: Value, usage: Option<Value>) -> String {
        let mut body = json!({
            "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}]
        });
        if let Some(usage) = usage {
            body["usage"] = usage;
        }
        body.to_string()
    }

    #[test]
    fn test_plain_text_response() {
        let raw = body(
            json!({"role": "assistant", "content": "Hello there"}),
            json!("stop"),
            Some(json!({"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13})),
        );
        let resp = parse_completion(&raw).unwrap();
        assert_eq!(resp.content.as_deref(), Some("Hello there"));
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(
            resp.usage,
            Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 3,
                total_tokens: 13
            })
        );
    }

    #[test]
    fn test_finish_reason_defaults_and_usage_omitted() {
        let raw = body(json!({"content": "hi"}), Value::Null, None);
        let resp = parse_completion(&raw).unwrap();
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage, None);
    }

    #[test]
    fn test_structured_tool_calls() {
        let raw = body(
            json!({
                "content": "ignored prose",
                "tool_calls": [
                    {"id": "call_a", "type": "function",
                     "function": {"name": "read_file", "arguments": "{\"path\": \"/tmp/x\", \"lines\": [1, 2]}"}},
                    {"id": "call_b", "type": "function",
                     "function": {"name": "exec", "arguments": "{bad json"}}
                ]
            }),
            json!("tool_calls"),
            None,
        );
        let resp = parse_completion(&raw).unwrap();
        assert_eq!(resp.content, None);
        assert_eq!(resp.finish_reason, "tool_calls");
        assert_eq!(resp.tool_calls.len(), 2);

        let first = &resp.tool_calls[0];
        assert_eq!(first.id, "call_a");
        // Re-serializing the parsed arguments yields the same mapping.
        let reparsed: Value = serde_json::from_str(&Value::Object(first.arguments.clone()).to_string()).unwrap();
        assert_eq!(reparsed, json!({"path": "/tmp/x", "lines": [1, 2]}));

        let second = &resp.tool_calls[1];
        assert_eq!(second.name, "exec");
        assert_eq!(Value::Object(second.arguments.clone()), json!({"raw": "{bad json"}));
    }

    #[test]
    fn test_object_arguments_and_missing_ids() {
        let raw = body(
            json!({"tool_calls": [
                {"function": {"name": "list_dir", "arguments": {"path": "."}}},
                {"id": "", "function": {"name": "exec", "arguments": "[1, 2]"}},
                {"id": "c3", "function": {"name": "noop", "arguments": ""}}
            ]}),
            json!("tool_calls"),
            None,
        );
        let resp = parse_completion(&raw).unwrap();
        let ids: Vec<_> = resp.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["synthetic_1", "synthetic_2", "c3"]);
        assert_eq!(resp.tool_calls[0].arguments["path"], json!("."));
        assert_eq!(resp.tool_calls[1].arguments["raw"], json!("[1, 2]"));
        assert!(resp.tool_calls[2].arguments.is_empty());
    }

    #[test]
    fn test_text_fallback_extraction() {
        let raw = body(
            json!({"content": "Sure. {\"tool\": \"execute_command\", \"args\": {\"command\": \"pwd\"}}"}),
            json!("stop"),
            None,
        );
        let resp = parse_completion(&raw).unwrap();
        assert_eq!(resp.content, None);
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "exec");
        assert_eq!(resp.tool_calls[0].id, "synthetic_json_1");
    }

    #[test]
    fn test_empty_structured_list_still_tries_text() {
        let raw = body(
            json!({"content": "{\"tool\": \"web_search\", \"args\": {\"query\": \"rust\"}}", "tool_calls": []}),
            json!("stop"),
            None,
        );
        let resp = parse_completion(&raw).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
    }

    #[test]
    fn test_prose_without_calls_is_preserved() {
        let text = "The answer is {probably} 42.";
        let raw = body(json!({"content": text}), json!("stop"), None);
        let resp = parse_completion(&raw).unwrap();
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.content.as_deref(), Some(text));
    }

    #[test]
    fn test_no_choices_is_invalid() {
        let err = parse_completion(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(parse_completion("<html>bad gateway</html>").is_err());
    }
}
