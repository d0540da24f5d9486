//! Strict parsing of raw user text into descriptor parts.
//!
//! Nothing here coerces: bad input is rejected with a [`DescriptorError`]
//! naming what was wrong, and no partial value escapes.

use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

use crate::descriptor::{Body, HeaderList, HTTP_SCHEMES, Method, WS_SCHEMES, is_field_value, is_token};
use crate::errors::DescriptorError;

/// How a body text area should be interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BodyMode {
    /// Send the text verbatim.
    #[default]
    Raw,
    /// Parse as JSON and send with a JSON content type.
    Json,
}

/// Parse a `Key: Value` header block.
///
/// Trailing blank lines are ignored. Any other blank line, a line without
/// a colon, an empty or non-token name, or a control character in the
/// value rejects the whole block with the offending 1-based line.
pub fn parse_headers(text: &str) -> Result<HeaderList, DescriptorError> {
    let lines: Vec<&str> = text.lines().collect();
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |idx| idx + 1);

    let mut headers = HeaderList::new();
    for (idx, line) in lines[..end].iter().enumerate() {
        let line_number = idx + 1;
        if line.trim().is_empty() {
            return Err(DescriptorError::BlankHeaderLine { line_number });
        }
        let malformed = |reason| DescriptorError::MalformedHeader {
            line_number,
            line: (*line).to_owned(),
            reason,
        };
        let Some((name, value)) = line.split_once(':') else {
            return Err(malformed("missing ':'"));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(malformed("empty name"));
        }
        if !is_token(name) {
            return Err(malformed("invalid name"));
        }
        let value = value.trim();
        if !is_field_value(value) {
            return Err(malformed("invalid character in value"));
        }
        headers.push(name, value);
    }
    Ok(headers)
}

/// Inverse of [`parse_headers`]: one `Key: Value` line per pair.
pub fn format_headers(headers: &HeaderList) -> String {
    headers
        .iter()
        .map(|h| format!("{}: {}", h.name, h.value))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse an HTTP verb, case-insensitively.
pub fn parse_method(text: &str) -> Result<Method, DescriptorError> {
    let wanted = text.trim();
    Method::ALL
        .into_iter()
        .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
        .ok_or_else(|| DescriptorError::UnsupportedMethod(wanted.to_owned()))
}

/// Parse a URL for an HTTP or GraphQL session.
pub fn parse_http_url(text: &str) -> Result<Url, DescriptorError> {
    parse_url(text, HTTP_SCHEMES, "http or https")
}

/// Parse a URL for a WebSocket session.
pub fn parse_ws_url(text: &str) -> Result<Url, DescriptorError> {
    parse_url(text, WS_SCHEMES, "ws or wss")
}

fn parse_url(text: &str, schemes: &[&str], expected: &'static str) -> Result<Url, DescriptorError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DescriptorError::MissingUrl);
    }
    let url = Url::parse(text).map_err(|e| DescriptorError::InvalidUrl {
        url: text.to_owned(),
        reason: e.to_string(),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(DescriptorError::UnsupportedScheme {
            scheme: url.scheme().to_owned(),
            expected,
        });
    }
    Ok(url)
}

/// Parse a request body. Whitespace-only text means no body.
pub fn parse_body(text: &str, mode: BodyMode) -> Result<Body, DescriptorError> {
    if text.trim().is_empty() {
        return Ok(Body::Empty);
    }
    match mode {
        BodyMode::Raw => Ok(Body::Raw(Bytes::copy_from_slice(text.as_bytes()))),
        BodyMode::Json => serde_json::from_str(text)
            .map(Body::Json)
            .map_err(|e| DescriptorError::InvalidJsonBody(e.to_string())),
    }
}

/// Parse GraphQL variables. Whitespace-only text means no variables.
pub fn parse_variables(text: &str) -> Result<Option<Map<String, Value>>, DescriptorError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(text).map_err(|e| DescriptorError::InvalidVariables(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(Some(map)),
        other => Err(DescriptorError::VariablesNotObject(json_type_name(&other))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    // ── headers ─────────────────────────────────────────────────────

    #[test]
    fn headers_round_trip() {
        let text = "Content-Type: application/json\nX-Trace: 1";
        let headers = parse_headers(text).unwrap();
        let pairs: Vec<(&str, &str)> = headers
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
            .collect();
        assert_eq!(pairs, [("Content-Type", "application/json"), ("X-Trace", "1")]);
        assert_eq!(format_headers(&headers), text);
    }

    #[test]
    fn empty_block_is_no_headers() {
        assert!(parse_headers("").unwrap().is_empty());
        assert!(parse_headers("  \n\n").unwrap().is_empty());
    }

    #[test]
    fn trailing_blank_lines_ignored() {
        let headers = parse_headers("Accept: */*\n\n  \n").unwrap();
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn value_keeps_inner_colons() {
        let headers = parse_headers("Authorization: Bearer a:b:c").unwrap();
        assert_eq!(headers.get("authorization"), Some("Bearer a:b:c"));
    }

    #[test]
    fn duplicates_are_kept() {
        let headers = parse_headers("Cookie: a=1\nCookie: b=2").unwrap();
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn blank_line_in_middle_rejected() {
        assert_eq!(
            parse_headers("A: 1\n\nB: 2"),
            Err(DescriptorError::BlankHeaderLine { line_number: 2 })
        );
    }

    #[test]
    fn missing_colon_reports_line() {
        assert_matches!(
            parse_headers("Accept: */*\nnot a header"),
            Err(DescriptorError::MalformedHeader { line_number: 2, ref line, .. }) if line == "not a header"
        );
    }

    #[test]
    fn empty_and_invalid_names_rejected() {
        assert_matches!(
            parse_headers(": value"),
            Err(DescriptorError::MalformedHeader { reason: "empty name", .. })
        );
        assert_matches!(
            parse_headers("Bad Name: value"),
            Err(DescriptorError::MalformedHeader { reason: "invalid name", .. })
        );
    }

    #[test]
    fn control_characters_in_value_rejected() {
        assert_matches!(
            parse_headers("X-A: one\rtwo"),
            Err(DescriptorError::MalformedHeader { reason: "invalid character in value", .. })
        );
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(
            pairs in proptest::collection::vec(
                ("[A-Za-z0-9-]{1,16}", "([!-~]([ -~]{0,24}[!-~])?)?"),
                0..8,
            )
        ) {
            let mut headers = HeaderList::new();
            for (name, value) in &pairs {
                headers.push(name.clone(), value.clone());
            }
            let parsed = parse_headers(&format_headers(&headers)).unwrap();
            prop_assert_eq!(parsed, headers);
        }
    }

    // ── method / url ────────────────────────────────────────────────

    #[test]
    fn method_is_case_insensitive() {
        assert_eq!(parse_method("patch").unwrap(), Method::Patch);
        assert_eq!(parse_method(" GET ").unwrap(), Method::Get);
        assert_eq!(
            parse_method("BREW"),
            Err(DescriptorError::UnsupportedMethod("BREW".into()))
        );
    }

    #[test]
    fn url_required() {
        assert_eq!(parse_http_url("  "), Err(DescriptorError::MissingUrl));
    }

    #[test]
    fn url_must_parse() {
        assert_matches!(parse_http_url("not a url"), Err(DescriptorError::InvalidUrl { .. }));
    }

    #[test]
    fn url_scheme_checked_per_kind() {
        assert!(parse_http_url("https://example.com").is_ok());
        assert!(parse_ws_url("wss://echo.example.com").is_ok());
        assert_matches!(
            parse_ws_url("https://example.com"),
            Err(DescriptorError::UnsupportedScheme { expected: "ws or wss", .. })
        );
        assert_matches!(
            parse_http_url("ws://example.com"),
            Err(DescriptorError::UnsupportedScheme { expected: "http or https", .. })
        );
    }

    // ── bodies / variables ──────────────────────────────────────────

    #[test]
    fn raw_body_verbatim() {
        let body = parse_body("name=nocturne", BodyMode::Raw).unwrap();
        assert_eq!(body, Body::Raw(Bytes::from_static(b"name=nocturne")));
    }

    #[test]
    fn json_body_is_strict() {
        assert_eq!(
            parse_body(r#"{"name": "Nocturne"}"#, BodyMode::Json).unwrap(),
            Body::Json(serde_json::json!({"name": "Nocturne"}))
        );
        assert_matches!(
            parse_body("{name: 'x'}", BodyMode::Json),
            Err(DescriptorError::InvalidJsonBody(_))
        );
        assert_matches!(
            parse_body(r#"{"a": 1,}"#, BodyMode::Json),
            Err(DescriptorError::InvalidJsonBody(_))
        );
    }

    #[test]
    fn blank_body_is_empty() {
        assert_eq!(parse_body("\n ", BodyMode::Json).unwrap(), Body::Empty);
    }

    #[test]
    fn variables_must_be_json_object() {
        assert_eq!(parse_variables("").unwrap(), None);
        let vars = parse_variables(r#"{"limit": 2}"#).unwrap().unwrap();
        assert_eq!(vars["limit"], 2);
        assert_matches!(parse_variables("not json"), Err(DescriptorError::InvalidVariables(_)));
        assert_eq!(
            parse_variables("[1, 2]"),
            Err(DescriptorError::VariablesNotObject("array"))
        );
    }
}
