//! Raw form input to validated descriptors.
//!
//! Each form holds exactly what a user typed. `into_descriptor` either
//! returns a complete [`RequestDescriptor`] or the first problem found;
//! nothing is created on failure.

use wirebench_core::parse::{
    parse_body, parse_headers, parse_http_url, parse_method, parse_variables, parse_ws_url,
};
use wirebench_core::{
    BodyMode, DescriptorError, GraphQlDescriptor, HttpDescriptor, Method, RequestDescriptor,
    WebSocketDescriptor,
};

/// HTTP request form.
#[derive(Clone, Debug, Default)]
pub struct HttpForm {
    /// Verb text, e.g. `get`. Blank means `GET`.
    pub method: String,
    /// URL text.
    pub url: String,
    /// Header block.
    pub headers: String,
    /// Body text.
    pub body: String,
    /// How to interpret `body`.
    pub body_mode: BodyMode,
}

impl HttpForm {
    /// Validate into a descriptor.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, DescriptorError> {
        let method = if self.method.trim().is_empty() {
            Method::Get
        } else {
            parse_method(&self.method)?
        };
        Ok(RequestDescriptor::Http(HttpDescriptor {
            method,
            url: parse_http_url(&self.url)?,
            headers: parse_headers(&self.headers)?,
            body: parse_body(&self.body, self.body_mode)?,
        }))
    }
}

/// GraphQL query form.
#[derive(Clone, Debug, Default)]
pub struct GraphQlForm {
    /// Endpoint URL text.
    pub url: String,
    /// Header block.
    pub headers: String,
    /// Query document.
    pub query: String,
    /// Variables as JSON text. Blank means none.
    pub variables: String,
    /// Operation name. Blank means none.
    pub operation_name: String,
}

impl GraphQlForm {
    /// Validate into a descriptor.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, DescriptorError> {
        let url = parse_http_url(&self.url)?;
        let headers = parse_headers(&self.headers)?;
        if self.query.trim().is_empty() {
            return Err(DescriptorError::EmptyQuery);
        }
        let variables = parse_variables(&self.variables)?;
        let operation_name = Some(self.operation_name.trim())
            .filter(|op| !op.is_empty())
            .map(str::to_owned);
        Ok(RequestDescriptor::GraphQl(GraphQlDescriptor {
            url,
            headers,
            query: self.query,
            operation_name,
            variables,
        }))
    }
}

/// WebSocket connect form.
#[derive(Clone, Debug, Default)]
pub struct WebSocketForm {
    /// Socket URL text.
    pub url: String,
    /// Handshake header block.
    pub headers: String,
}

impl WebSocketForm {
    /// Validate into a descriptor.
    pub fn into_descriptor(self) -> Result<RequestDescriptor, DescriptorError> {
        Ok(RequestDescriptor::WebSocket(WebSocketDescriptor {
            url: parse_ws_url(&self.url)?,
            headers: parse_headers(&self.headers)?,
        }))
    }
}

/// Check an outbound message. The text is sent exactly as typed.
pub fn validate_message(text: &str) -> Result<(), DescriptorError> {
    if text.is_empty() {
        return Err(DescriptorError::EmptyMessage);
    }
    Ok(())
}
