//! Bounding and allow-listing of log fields before persistence.
//!
//! Never fails: absent or oddly-typed fields degrade to `None`/empty.

use relay_core::config::MessageMode;
use serde_json::{Map, Value};

use crate::entry::{LogRequest, LogResponse};

/// Characters kept in preview mode.
pub const PREVIEW_CHARS: usize = 220;
/// Appended to a truncated preview.
pub const ELLIPSIS: char = '…';
/// Longest free-form string kept among the extra context fields.
const MAX_EXTRA_CHARS: usize = 500;

/// First 220 characters, plus `…` when the message was longer.
pub fn preview(message: &str) -> String {
    let mut chars = message.chars();
    let mut out: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        out.push(ELLIPSIS);
    }
    out
}

/// Fill the message fields of `request` according to `mode`.
pub fn apply_message_mode(request: &mut LogRequest, message: &str, mode: MessageMode) {
    request.message_length = message.chars().count();
    match mode {
        MessageMode::Full => {
            request.message = Some(message.to_string());
            request.message_preview = None;
        }
        MessageMode::Preview => {
            request.message = None;
            request.message_preview = Some(preview(message));
        }
        MessageMode::None => {
            request.message = None;
            request.message_preview = None;
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn count_of(value: &Value) -> Option<usize> {
    match value {
        Value::Array(items) => Some(items.len()),
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        _ => None,
    }
}

/// Sanitize a raw request mapping.
///
/// Returns the stored request and the original message text (used for identity).
pub fn sanitize_request(raw: &Map<String, Value>, mode: MessageMode) -> (LogRequest, String) {
    let mut request = LogRequest::default();
    let mut message = String::new();

    for (key, value) in raw {
        match key.as_str() {
            "to" => request.to = scalar_string(value),
            "phone" | "recipient" => {
                if request.to.is_none() {
                    request.to = scalar_string(value);
                }
            }
            "message" => message = scalar_string(value).unwrap_or_default(),
            // Derived from `message`; never trusted from the caller.
            "messagePreview" | "messageLength" => {}
            "source" => request.source = scalar_string(value),
            "endpoint" => request.endpoint = scalar_string(value),
            "taskId" => {
                request.task_id = match value {
                    Value::String(_) | Value::Number(_) => Some(value.clone()),
                    _ => None,
                }
            }
            "tasks" | "tasksCount" => request.tasks_count = count_of(value),
            "phones" | "phonesCount" => request.phones_count = count_of(value),
            _ => match value {
                Value::String(s) => {
                    let bounded: String = s.chars().take(MAX_EXTRA_CHARS).collect();
                    request.extra.insert(key.clone(), Value::String(bounded));
                }
                Value::Bool(_) | Value::Number(_) | Value::Null => {
                    request.extra.insert(key.clone(), value.clone());
                }
                // Nested collections are never persisted.
                Value::Array(_) | Value::Object(_) => {}
            },
        }
    }

    apply_message_mode(&mut request, &message, mode);
    (request, message)
}

/// Keep only `success`, `jid` and `messageId`.
pub fn sanitize_response(raw: Option<&Value>) -> LogResponse {
    let Some(Value::Object(map)) = raw else {
        return LogResponse::default();
    };
    LogResponse {
        success: map.get("success").and_then(Value::as_bool),
        jid: map.get("jid").and_then(scalar_string),
        message_id: map.get("messageId").and_then(scalar_string),
    }
}
