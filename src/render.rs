//! Plain-text rendering of activity log entries and session status.

use std::fmt::Write as _;

use wirebench_core::{CloseReason, EventPayload, Progress, StatusInfo};
use wirebench_engine::{ActivityLogEntry, Session};

/// One entry as display text. Multi-line payloads are indented under the
/// header line.
pub fn entry(entry: &ActivityLogEntry) -> String {
    let event = &entry.event;
    let mut out = format!(
        "{} {} #{:<3} ",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.session_id.short(),
        event.seq
    );
    match &event.payload {
        EventPayload::Started => out.push_str("started"),
        EventPayload::Progress(Progress::Body {
            bytes,
            content_type,
        }) => {
            let _ = write!(
                out,
                "body {} bytes{}",
                bytes.len(),
                content_type
                    .as_deref()
                    .map(|ct| format!(" ({ct})"))
                    .unwrap_or_default()
            );
            push_block(&mut out, &pretty_body(bytes, content_type.as_deref()));
        }
        EventPayload::Progress(Progress::Envelope(envelope)) => {
            out.push_str(if envelope.has_errors() {
                "graphql response with errors"
            } else {
                "graphql response"
            });
            let json = serde_json::to_string_pretty(envelope).unwrap_or_default();
            push_block(&mut out, &json);
        }
        EventPayload::Progress(Progress::Echo { text }) => {
            let _ = write!(out, "> {text}");
        }
        EventPayload::StatusChanged(status) => status_block(&mut out, status),
        EventPayload::MessageReceived { text } => {
            let _ = write!(out, "< {text}");
        }
        EventPayload::Error { kind, detail } => {
            let _ = write!(out, "error [{kind}] {detail}");
        }
        EventPayload::Closed(reason) => {
            let _ = write!(out, "closed: {}", close_reason(reason));
        }
    }
    out
}

/// One-line session summary.
pub fn session(session: &Session) -> String {
    let mut out = format!(
        "{} {:<7} {:<10} {}",
        session.id.short(),
        session.kind.label(),
        session.state.as_str(),
        session.descriptor.summary()
    );
    if let Some(code) = session.last_status {
        let _ = write!(out, " -> {code}");
    }
    if let Some((kind, detail)) = &session.last_error {
        let _ = write!(out, " [{kind}: {detail}]");
    }
    out
}

fn close_reason(reason: &CloseReason) -> String {
    match reason {
        CloseReason::Completed => "completed".into(),
        CloseReason::Cancelled => "cancelled".into(),
        CloseReason::LocalClose => "disconnected".into(),
        CloseReason::PeerClosed { code: Some(code), text } if !text.is_empty() => {
            format!("peer closed ({code} {text})")
        }
        CloseReason::PeerClosed { code: Some(code), .. } => format!("peer closed ({code})"),
        CloseReason::PeerClosed { code: None, .. } => "connection ended".into(),
    }
}

fn status_block(out: &mut String, status: &StatusInfo) {
    let _ = write!(
        out,
        "status {}{} in {} ms",
        status.code,
        status
            .reason
            .as_deref()
            .map(|r| format!(" {r}"))
            .unwrap_or_default(),
        status.elapsed_ms
    );
    let headers: Vec<String> = status
        .headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect();
    push_block(out, &headers.join("\n"));
}

fn pretty_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let is_json = content_type.is_some_and(|ct| ct.contains("json"));
    if is_json {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(bytes) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

fn push_block(out: &mut String, block: &str) {
    for line in block.lines() {
        out.push_str("\n    ");
        out.push_str(line);
    }
}
