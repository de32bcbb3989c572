//! Text rendering of traffic events

use chissl_common::{EventKind, TrafficEvent};
use chrono::{DateTime, Utc};
use std::fmt::Write;
use std::str::FromStr;

/// Placeholder for an empty history batch
pub const NO_TRAFFIC: &str = "No traffic data available";

/// Placeholder shown in an empty live view
pub const LIVE_PLACEHOLDER: &str = "Live traffic will appear here...";

/// How history bodies are presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// JSON bodies re-indented, everything else escaped
    #[default]
    Pretty,
    /// Request line, headers and body as literal text
    Raw,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(RenderMode::Pretty),
            "raw" => Ok(RenderMode::Raw),
            other => Err(format!("unknown render mode: {}", other)),
        }
    }
}

/// Escape control characters so bodies cannot corrupt the output
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' | '\t' => out.push(c),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "-".to_string(),
    }
}

fn title(event: &TrafficEvent, ts: Option<DateTime<Utc>>) -> String {
    let arrow = match event.kind {
        EventKind::Request => "->",
        EventKind::Response => "<-",
    };
    format!(
        "{} {}  {}",
        arrow,
        event.kind.as_str().to_uppercase(),
        format_timestamp(ts)
    )
}

fn push_headers(out: &mut String, event: &TrafficEvent) {
    if let Some(headers) = &event.headers {
        out.push_str("Headers:\n");
        for (key, value) in headers {
            let _ = writeln!(out, "  {}: {}", key, escape_text(value));
        }
    }
}

/// Pretty-print a body when it is JSON, otherwise escape it
pub fn pretty_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| escape_text(body)),
        Err(_) => escape_text(body),
    }
}

/// Render one history event in the given mode
pub fn render_event(event: &TrafficEvent, mode: RenderMode) -> String {
    let mut out = title(event, event.timestamp);
    out.push('\n');

    match mode {
        RenderMode::Pretty => {
            if let Some(line) = event.request_line() {
                out.push_str(&line);
                out.push('\n');
            }
            push_headers(&mut out, event);
            if let Some(body) = event.body.as_deref().filter(|b| !b.is_empty()) {
                out.push_str("Body:\n");
                out.push_str(&pretty_body(body));
                out.push('\n');
            }
        }
        RenderMode::Raw => {
            if let Some(line) = event.request_line() {
                out.push_str(&line);
                out.push('\n');
            }
            if let Some(headers) = &event.headers {
                for (key, value) in headers {
                    let _ = writeln!(out, "{}: {}", key, value);
                }
                out.push('\n');
            }
            if let Some(body) = &event.body {
                out.push_str(body);
                if !body.ends_with('\n') && !body.is_empty() {
                    out.push('\n');
                }
            }
        }
    }

    out
}

/// Render a history batch, or the empty placeholder
pub fn render_batch(events: &[TrafficEvent], mode: RenderMode) -> String {
    if events.is_empty() {
        return NO_TRAFFIC.to_string();
    }
    events
        .iter()
        .map(|event| render_event(event, mode))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a live event; falls back to the receive time when unstamped
pub fn render_live(event: &TrafficEvent, received_at: DateTime<Utc>) -> String {
    let mut out = title(event, Some(event.timestamp.unwrap_or(received_at)));
    out.push('\n');
    if let Some(line) = event.request_line() {
        out.push_str(&line);
        out.push('\n');
    }
    push_headers(&mut out, event);
    if let Some(body) = event.body.as_deref().filter(|b| !b.is_empty()) {
        out.push_str("Body:\n");
        out.push_str(&escape_text(body));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(body: &str) -> TrafficEvent {
        TrafficEvent {
            kind: EventKind::Request,
            timestamp: Utc.timestamp_millis_opt(1_714_564_800_000).single(),
            method: Some("POST".to_string()),
            url: Some("/v1/chat".to_string()),
            headers: Some(
                [("Content-Type".to_string(), "application/json".to_string())]
                    .into_iter()
                    .collect(),
            ),
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn test_pretty_reindents_json() {
        let rendered = render_event(&request(r#"{"model":"x","n":1}"#), RenderMode::Pretty);
        assert_eq!(
            rendered,
            "-> REQUEST  2024-05-01 12:00:00 UTC\n\
             POST /v1/chat\n\
             Headers:\n  Content-Type: application/json\n\
             Body:\n{\n  \"model\": \"x\",\n  \"n\": 1\n}\n"
        );
    }

    #[test]
    fn test_pretty_falls_back_to_escaped_text() {
        let rendered = render_event(&request("not json\u{7}"), RenderMode::Pretty);
        assert!(rendered.ends_with("Body:\nnot json\\u{7}\n"));
    }

    #[test]
    fn test_raw_is_literal() {
        let rendered = render_event(&request(r#"{"a":1}"#), RenderMode::Raw);
        assert_eq!(
            rendered,
            "-> REQUEST  2024-05-01 12:00:00 UTC\n\
             POST /v1/chat\n\
             Content-Type: application/json\n\n\
             {\"a\":1}\n"
        );
    }

    #[test]
    fn test_response_without_request_line() {
        let event = TrafficEvent {
            kind: EventKind::Response,
            timestamp: None,
            method: None,
            url: None,
            headers: None,
            body: Some("ok".to_string()),
        };
        assert_eq!(render_event(&event, RenderMode::Pretty), "<- RESPONSE  -\nBody:\nok\n");
        assert_eq!(render_event(&event, RenderMode::Raw), "<- RESPONSE  -\nok\n");
    }

    #[test]
    fn test_empty_batch_placeholder() {
        assert_eq!(render_batch(&[], RenderMode::Raw), NO_TRAFFIC);
    }

    #[test]
    fn test_live_uses_receive_time_when_unstamped() {
        let mut event = request("{}");
        event.timestamp = None;
        let received = Utc.timestamp_millis_opt(0).single().unwrap();
        let rendered = render_live(&event, received);
        assert!(rendered.starts_with("-> REQUEST  1970-01-01 00:00:00 UTC\n"));
        assert!(rendered.ends_with("Body:\n{}\n"));
    }

    #[test]
    fn test_render_mode_parse() {
        assert_eq!("RAW".parse::<RenderMode>().unwrap(), RenderMode::Raw);
        assert!("fancy".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_headers_render_in_wire_order() {
        let event = TrafficEvent::from_json(
            r#"{"type":"request","method":"GET","url":"/","headers":{"X-Zeta":"1","Accept":"2","Host":"h"}}"#,
        )
        .unwrap();

        for mode in [RenderMode::Raw, RenderMode::Pretty] {
            let rendered = render_event(&event, mode);
            let zeta = rendered.find("X-Zeta").unwrap();
            let accept = rendered.find("Accept").unwrap();
            let host = rendered.find("Host").unwrap();
            assert!(zeta < accept && accept < host, "{}", rendered);
        }
    }
}
