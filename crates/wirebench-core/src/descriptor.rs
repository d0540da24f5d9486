//! Immutable request descriptors.
//!
//! A [`RequestDescriptor`] is the tagged, fully-validated description of
//! what a session will do on the wire. Descriptors are built from raw user
//! text by [`crate::parse`] and shared with adapters behind an `Arc`.

use std::fmt;

use bytes::Bytes;
use serde_json::{Map, Value};
use url::Url;

use crate::errors::DescriptorError;
use crate::session::SessionKind;

// ─────────────────────────────────────────────────────────────────────────────
// Headers
// ─────────────────────────────────────────────────────────────────────────────

/// One `Key: Value` header pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Header name as entered (case preserved).
    pub name: String,
    /// Header value with surrounding whitespace trimmed.
    pub value: String,
}

/// Ordered header sequence. Duplicate names are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderList(Vec<Header>);

impl HeaderList {
    /// Empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a pair. Use [`RequestDescriptor::validate`] to check names.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Header {
            name: name.into(),
            value: value.into(),
        });
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn validate(&self) -> Result<(), DescriptorError> {
        for (idx, header) in self.0.iter().enumerate() {
            let malformed = |reason| DescriptorError::MalformedHeader {
                line_number: idx + 1,
                line: format!("{}: {}", header.name, header.value),
                reason,
            };
            if header.name.is_empty() {
                return Err(malformed("empty name"));
            }
            if !is_token(&header.name) {
                return Err(malformed("invalid name"));
            }
            if !is_field_value(&header.value) {
                return Err(malformed("invalid character in value"));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// RFC 9110 `token` characters, the legal alphabet for header names.
pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric()
                || matches!(
                    b,
                    b'!' | b'#'
                        | b'$'
                        | b'%'
                        | b'&'
                        | b'\''
                        | b'*'
                        | b'+'
                        | b'-'
                        | b'.'
                        | b'^'
                        | b'_'
                        | b'`'
                        | b'|'
                        | b'~'
                )
        })
}

/// Header values may hold any visible character, space or tab.
pub(crate) fn is_field_value(s: &str) -> bool {
    !s.chars().any(|c| c.is_control() && c != '\t')
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP pieces
// ─────────────────────────────────────────────────────────────────────────────

/// Supported HTTP verbs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// Every supported verb, in menu order.
    pub const ALL: [Method; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Head,
        Self::Options,
    ];

    /// Uppercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Body {
    /// No body is sent.
    #[default]
    Empty,
    /// Raw bytes sent as-is.
    Raw(Bytes),
    /// Structured JSON, serialized with `Content-Type: application/json`.
    Json(Value),
}

impl Body {
    /// Whether nothing will be sent.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// A one-shot HTTP request.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpDescriptor {
    /// Verb.
    pub method: Method,
    /// Target URL (`http` or `https`).
    pub url: Url,
    /// Request headers.
    pub headers: HeaderList,
    /// Request body.
    pub body: Body,
}

/// A GraphQL query posted over HTTP.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphQlDescriptor {
    /// Endpoint URL (`http` or `https`).
    pub url: Url,
    /// Request headers.
    pub headers: HeaderList,
    /// Query document.
    pub query: String,
    /// Operation to execute when the document holds several.
    pub operation_name: Option<String>,
    /// Variables object.
    pub variables: Option<Map<String, Value>>,
}

/// A WebSocket connection.
#[derive(Clone, Debug, PartialEq)]
pub struct WebSocketDescriptor {
    /// Socket URL (`ws` or `wss`).
    pub url: Url,
    /// Extra handshake headers.
    pub headers: HeaderList,
}

/// Tagged description of one session's work.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestDescriptor {
    /// Plain HTTP.
    Http(HttpDescriptor),
    /// GraphQL over HTTP.
    GraphQl(GraphQlDescriptor),
    /// WebSocket.
    WebSocket(WebSocketDescriptor),
}

pub(crate) const HTTP_SCHEMES: &[&str] = &["http", "https"];
pub(crate) const WS_SCHEMES: &[&str] = &["ws", "wss"];

impl RequestDescriptor {
    /// Session kind this descriptor creates.
    pub fn kind(&self) -> SessionKind {
        match self {
            Self::Http(_) => SessionKind::HttpRequest,
            Self::GraphQl(_) => SessionKind::GraphQlQuery,
            Self::WebSocket(_) => SessionKind::WebSocketConnection,
        }
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        match self {
            Self::Http(d) => &d.url,
            Self::GraphQl(d) => &d.url,
            Self::WebSocket(d) => &d.url,
        }
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderList {
        match self {
            Self::Http(d) => &d.headers,
            Self::GraphQl(d) => &d.headers,
            Self::WebSocket(d) => &d.headers,
        }
    }

    /// One-line summary, e.g. `GET https://example.com/`.
    pub fn summary(&self) -> String {
        match self {
            Self::Http(d) => format!("{} {}", d.method, d.url),
            Self::GraphQl(d) => match &d.operation_name {
                Some(op) => format!("QUERY {} ({op})", d.url),
                None => format!("QUERY {}", d.url),
            },
            Self::WebSocket(d) => format!("CONNECT {}", d.url),
        }
    }

    /// Re-check invariants that the type system does not enforce.
    ///
    /// Descriptors built by [`crate::parse`] always pass; this guards
    /// descriptors assembled programmatically.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let (schemes, expected) = match self {
            Self::Http(_) | Self::GraphQl(_) => (HTTP_SCHEMES, "http or https"),
            Self::WebSocket(_) => (WS_SCHEMES, "ws or wss"),
        };
        let scheme = self.url().scheme();
        if !schemes.contains(&scheme) {
            return Err(DescriptorError::UnsupportedScheme {
                scheme: scheme.to_owned(),
                expected,
            });
        }
        self.headers().validate()?;
        if let Self::GraphQl(d) = self {
            if d.query.trim().is_empty() {
                return Err(DescriptorError::EmptyQuery);
            }
        }
        Ok(())
    }
}
