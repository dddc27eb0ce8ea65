//! Pure event formatter (spec.md §4.10): turns a raw log-derived event into
//! the single-line display string the EventRingBuffer stores.

use crate::domain::{Event, SessionId};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct FormattedEvent {
    pub event_type: String,
    pub text: String,
    /// `None` only for `user_prompt`, whose events carry no success/failure verdict.
    pub success: Option<bool>,
}

/// `format_event(session_id, raw_event) → formatted_event` per spec.md §4.10.
#[must_use]
pub fn format_event(session_id: &SessionId, raw_event: &Event) -> FormattedEvent {
    let event_type = strip_known_prefix(&raw_event.name);
    let sess = session_id.short();

    match event_type.as_str() {
        "user_prompt" => format_user_prompt(sess, raw_event),
        "tool_result" => format_tool_result(sess, raw_event),
        "api_request" => format_api_request(sess, raw_event),
        "api_error" => format_api_error(sess, raw_event),
        "tool_decision" => format_tool_decision(sess, raw_event),
        other => FormattedEvent {
            event_type: other.to_string(),
            text: format!("[{sess}] {other}"),
            success: None,
        },
    }
}

/// Strips a configured telemetry namespace prefix (e.g. `claude_code.`) leaving
/// the short event type, e.g. `claude_code.tool_result` → `tool_result`.
fn strip_known_prefix(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_string()
}

fn format_user_prompt(sess: &str, event: &Event) -> FormattedEvent {
    let chars: usize = event
        .attributes
        .get("prompt_length")
        .and_then(|v| v.parse().ok())
        .or_else(|| event.attributes.get("prompt").map(|p| p.chars().count()))
        .unwrap_or(0);

    let preview = event.attributes.get("prompt").map(|p| {
        let truncated: String = p.chars().take(80).collect();
        format!(": {truncated}")
    });

    let text = match preview {
        Some(preview) => format!("[{sess}] Prompt ({chars} chars){preview}"),
        None => format!("[{sess}] Prompt ({chars} chars)"),
    };

    FormattedEvent { event_type: "user_prompt".to_string(), text, success: None }
}

fn format_tool_result(sess: &str, event: &Event) -> FormattedEvent {
    let tool_name = resolve_tool_name(event);
    let duration_s = event.attributes.get("duration_ms").and_then(|v| v.parse::<f64>().ok()).map(|ms| ms / 1000.0);
    let rejected = event.attributes.get("rejected").map(|v| v == "true").unwrap_or(false);
    let success = event.attributes.get("success").map(|v| v == "true").unwrap_or(!rejected);

    let text = if success {
        let duration = duration_s.map_or_else(String::new, |d| format!(" ({d:.1}s)"));
        format!("[{sess}] {tool_name} \u{2713}{duration}")
    } else if rejected {
        format!("[{sess}] {tool_name} \u{2717} rejected by user")
    } else {
        let error = event.attributes.get("error").map(String::as_str).unwrap_or("unknown error");
        let duration = duration_s.map_or_else(String::new, |d| format!(" ({d:.1}s)"));
        format!("[{sess}] {tool_name} \u{2717} {error}{duration}")
    };

    FormattedEvent { event_type: "tool_result".to_string(), text, success: Some(success) }
}

fn resolve_tool_name(event: &Event) -> String {
    if let Some(params_json) = event.attributes.get("tool_parameters") {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(params_json) {
            let server = map.get("mcp_server_name").and_then(Value::as_str);
            let tool = map.get("mcp_tool_name").and_then(Value::as_str);
            if let (Some(server), Some(tool)) = (server, tool) {
                return format!("{server}:{tool}");
            }
        }
    }
    event.attributes.get("tool_name").cloned().unwrap_or_else(|| "tool".to_string())
}

fn format_api_request(sess: &str, event: &Event) -> FormattedEvent {
    let model = event.attributes.get("model").map(String::as_str).unwrap_or("unknown-model");
    let input_tokens = event.attributes.get("input_tokens").and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
    let output_tokens = event.attributes.get("output_tokens").and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
    let cost = event.attributes.get("cost_usd").and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0);
    let duration_s = event.attributes.get("duration_ms").and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0) / 1000.0;

    let text = format!(
        "[{sess}] {model} \u{2192} {} in / {} out (${cost:.2}) {duration_s:.1}s",
        format_token_count(input_tokens),
        format_token_count(output_tokens),
    );
    FormattedEvent { event_type: "api_request".to_string(), text, success: Some(true) }
}

fn format_api_error(sess: &str, event: &Event) -> FormattedEvent {
    let status_code = event.attributes.get("status_code").map(String::as_str).unwrap_or("unknown");
    let attempt = event.attributes.get("attempt").map(String::as_str).unwrap_or("1");
    let text = format!("[{sess}] {status_code} error (attempt {attempt})");
    FormattedEvent { event_type: "api_error".to_string(), text, success: Some(false) }
}

fn format_tool_decision(sess: &str, event: &Event) -> FormattedEvent {
    let tool_name = resolve_tool_name(event);
    let accepted = event.attributes.get("decision").map(|v| v == "accept").unwrap_or(false);
    let source = event.attributes.get("source").map(String::as_str).unwrap_or("unknown");
    let verdict = if accepted { "accepted" } else { "rejected" };
    let text = format!("[{sess}] {tool_name} {verdict} ({source})");
    FormattedEvent { event_type: "tool_decision".to_string(), text, success: Some(accepted) }
}

/// tokens ≥ 1000 render as `N.Nk` (one decimal), per spec.md §4.10.
fn format_token_count(tokens: f64) -> String {
    if tokens >= 1000.0 {
        format!("{:.1}k", tokens / 1000.0)
    } else {
        format!("{tokens:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timestamp;
    use std::collections::HashMap;

    fn event(name: &str, attrs: &[(&str, &str)]) -> Event {
        Event {
            name: name.to_string(),
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            timestamp: Timestamp::now(),
        }
    }

    fn sid() -> SessionId {
        SessionId::from("abcdefghijklmnopqrst")
    }

    #[test]
    fn user_prompt_without_preview() {
        let e = event("user_prompt", &[("prompt_length", "42")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] Prompt (42 chars)");
        assert_eq!(f.success, None);
    }

    #[test]
    fn user_prompt_with_preview_truncates_to_80_chars() {
        let long = "x".repeat(100);
        let e = event("user_prompt", &[("prompt_length", "100"), ("prompt", &long)]);
        let f = format_event(&sid(), &e);
        assert!(f.text.starts_with("[abcdefghijkl] Prompt (100 chars): "));
        let preview = f.text.split(": ").nth(1).unwrap();
        assert_eq!(preview.chars().count(), 80);
    }

    #[test]
    fn tool_result_success_shows_checkmark_and_duration() {
        let e = event("tool_result", &[("tool_name", "bash"), ("success", "true"), ("duration_ms", "1500")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] bash \u{2713} (1.5s)");
        assert_eq!(f.success, Some(true));
    }

    #[test]
    fn tool_result_rejected_by_user() {
        let e = event("tool_result", &[("tool_name", "bash"), ("rejected", "true")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] bash \u{2717} rejected by user");
        assert_eq!(f.success, Some(false));
    }

    #[test]
    fn tool_result_other_failure_shows_error_and_duration() {
        let e = event(
            "tool_result",
            &[("tool_name", "bash"), ("success", "false"), ("error", "timeout"), ("duration_ms", "2000")],
        );
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] bash \u{2717} timeout (2.0s)");
    }

    #[test]
    fn tool_result_renders_mcp_server_tool_name() {
        let e = event(
            "tool_result",
            &[
                ("tool_parameters", r#"{"mcp_server_name":"github","mcp_tool_name":"search"}"#),
                ("success", "true"),
            ],
        );
        let f = format_event(&sid(), &e);
        assert!(f.text.contains("github:search"));
    }

    #[test]
    fn api_request_formats_tokens_cost_and_duration() {
        let e = event(
            "api_request",
            &[
                ("model", "claude-opus"),
                ("input_tokens", "1500"),
                ("output_tokens", "250"),
                ("cost_usd", "0.125"),
                ("duration_ms", "3200"),
            ],
        );
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] claude-opus \u{2192} 1.5k in / 250 out ($0.12) 3.2s");
    }

    #[test]
    fn api_error_includes_status_and_attempt() {
        let e = event("api_error", &[("status_code", "529"), ("attempt", "2")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] 529 error (attempt 2)");
        assert_eq!(f.success, Some(false));
    }

    #[test]
    fn tool_decision_accepted() {
        let e = event("tool_decision", &[("tool_name", "edit"), ("decision", "accept"), ("source", "user")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.text, "[abcdefghijkl] edit accepted (user)");
    }

    #[test]
    fn same_input_produces_same_output_purity() {
        let e = event("tool_result", &[("tool_name", "bash"), ("success", "true")]);
        let f1 = format_event(&sid(), &e);
        let f2 = format_event(&sid(), &e);
        assert_eq!(f1.text, f2.text);
    }

    #[test]
    fn strips_known_namespace_prefix() {
        let e = event("claude_code.api_error", &[("status_code", "500")]);
        let f = format_event(&sid(), &e);
        assert_eq!(f.event_type, "api_error");
    }
}
