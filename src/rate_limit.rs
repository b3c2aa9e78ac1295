//! Fallback classifier for rate-limit errors hiding in arbitrary payloads.
//!
//! The primary path is [`crate::ProviderError::is_rate_limited`]; this module
//! exists for provider responses that arrive as opaque JSON bodies, where the
//! interesting status code or message can be nested under `response`, `error`,
//! `cause`, or `details` wrappers, sometimes as a JSON-encoded string inside
//! another error body.

use serde_json::Value;
use std::collections::{HashSet, VecDeque};

/// Substrings that mark a message as a rate-limit complaint (lowercase).
const RATE_LIMIT_PHRASES: &[&str] = &["too many requests", "resource exhausted", "rate limit"];

/// Wrapper fields that providers commonly nest their real error under.
const NESTED_KEYS: &[&str] = &["response", "error", "cause", "details"];

/// Decide whether an arbitrary error payload represents a transient
/// rate-limit condition.
///
/// Walks the payload breadth-first, collecting every numeric `status`/`code`
/// and every string message along the way. String payloads that themselves
/// parse as JSON are re-enqueued so doubly-encoded error bodies are seen; a
/// seen-set keeps the traversal cycle-safe. Returns true if any collected
/// code equals 429 or any message contains one of the known phrases,
/// case-insensitively. Pure, no I/O.
pub fn payload_is_rate_limited(payload: &Value) -> bool {
    let mut codes: Vec<i64> = Vec::new();
    let mut messages: Vec<String> = Vec::new();
    collect(payload, &mut codes, &mut messages);

    if codes.contains(&429) {
        return true;
    }
    messages.iter().any(|message| {
        let lower = message.to_lowercase();
        RATE_LIMIT_PHRASES.iter().any(|phrase| lower.contains(phrase))
    })
}

fn collect(root: &Value, codes: &mut Vec<i64>, messages: &mut Vec<String>) {
    let mut queue: VecDeque<Value> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();
    queue.push_back(root.clone());

    while let Some(value) = queue.pop_front() {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    match child {
                        Value::Number(number) if key == "status" || key == "code" => {
                            if let Some(code) = number.as_i64() {
                                codes.push(code);
                            }
                        }
                        Value::String(text) => {
                            enqueue_string(text, &mut queue, &mut seen, messages);
                        }
                        Value::Object(_) | Value::Array(_) if NESTED_KEYS.contains(&key.as_str()) => {
                            queue.push_back(child);
                        }
                        _ => {}
                    }
                }
            }
            Value::Array(items) => queue.extend(items),
            Value::String(text) => {
                enqueue_string(text, &mut queue, &mut seen, messages);
            }
            _ => {}
        }
    }
}

fn enqueue_string(
    text: String,
    queue: &mut VecDeque<Value>,
    seen: &mut HashSet<String>,
    messages: &mut Vec<String>,
) {
    messages.push(text.clone());
    // Only attempt to re-parse each distinct string payload once.
    if seen.insert(text.clone()) {
        if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
            if parsed.is_object() || parsed.is_array() {
                queue.push_back(parsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_status() {
        assert!(payload_is_rate_limited(&json!({"status": 429})));
    }

    #[test]
    fn test_nested_response_status() {
        assert!(payload_is_rate_limited(&json!({"response": {"status": 429}})));
    }

    #[test]
    fn test_json_encoded_string_body() {
        let payload = json!("{\"error\":{\"code\":429}}");
        assert!(payload_is_rate_limited(&payload));
    }

    #[test]
    fn test_message_under_cause() {
        let payload = json!({"cause": {"message": "Too Many Requests"}});
        assert!(payload_is_rate_limited(&payload));
    }

    #[test]
    fn test_resource_exhausted_message() {
        let payload = json!({"error": {"message": "RESOURCE EXHAUSTED: quota exceeded"}});
        assert!(payload_is_rate_limited(&payload));
    }

    #[test]
    fn test_server_error_is_not_rate_limit() {
        assert!(!payload_is_rate_limited(&json!({"status": 500})));
    }

    #[test]
    fn test_plain_failure_message() {
        assert!(!payload_is_rate_limited(&json!({"message": "Invalid argument"})));
    }

    #[test]
    fn test_details_array() {
        let payload = json!({
            "error": {
                "details": [{"reason": "rateLimitExceeded", "message": "Rate limit hit"}]
            }
        });
        assert!(payload_is_rate_limited(&payload));
    }

    #[test]
    fn test_doubly_encoded_body() {
        let inner = "{\"response\":\"{\\\"status\\\":429}\"}";
        assert!(payload_is_rate_limited(&json!(inner)));
    }

    #[test]
    fn test_repeated_string_payloads_terminate() {
        // The same JSON string nested twice must be parsed once and still
        // classified correctly.
        let body = "{\"error\":{\"code\":429}}";
        let payload = json!({"error": {"details": [body, body]}});
        assert!(payload_is_rate_limited(&payload));
    }

    #[test]
    fn test_unrelated_fields_ignored() {
        let payload = json!({"metadata": {"status": 429}});
        assert!(!payload_is_rate_limited(&payload));
    }
}
