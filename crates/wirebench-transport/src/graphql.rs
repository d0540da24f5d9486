//! GraphQL executor: posts `{query, variables?, operationName?}` as JSON.
//!
//! A response whose body is a JSON object with `data` or `errors` is an
//! envelope and is reported as `Progress(Envelope)`, whatever the HTTP
//! status. Anything else is a `ProtocolError` after the status is reported.

use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span};
use wirebench_core::{
    CloseReason, ErrorKind, EventPayload, GraphQlDescriptor, GraphQlEnvelope, Progress,
    RequestDescriptor, SessionKind,
};

use crate::handle::TransportHandle;
use crate::http::{emit_failure, fetch, with_headers};
use crate::{Transport, TransportRequest, emit_cancelled, emit_kind_mismatch};

/// GraphQL-over-HTTP executor.
#[derive(Clone, Debug)]
pub struct GraphQlTransport {
    client: reqwest::Client,
}

impl GraphQlTransport {
    /// Share an existing connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for GraphQlTransport {
    fn kind(&self) -> SessionKind {
        SessionKind::GraphQlQuery
    }

    fn start(&self, request: TransportRequest) -> TransportHandle {
        let cancel = request.cancel.clone();
        let span = info_span!("graphql", session_id = %request.session_id);
        let task = tokio::spawn(run(self.client.clone(), request).instrument(span));
        TransportHandle::new(cancel, task)
    }
}

/// JSON request document for a query.
pub fn request_body(desc: &GraphQlDescriptor) -> Value {
    let mut body = Map::new();
    let _ = body.insert("query".into(), Value::String(desc.query.clone()));
    if let Some(variables) = &desc.variables {
        let _ = body.insert("variables".into(), Value::Object(variables.clone()));
    }
    if let Some(op) = &desc.operation_name {
        let _ = body.insert("operationName".into(), Value::String(op.clone()));
    }
    Value::Object(body)
}

/// Decode a response body into an envelope, if it is one.
pub fn parse_envelope(body: &[u8]) -> Option<GraphQlEnvelope> {
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    if !map.contains_key("data") && !map.contains_key("errors") {
        return None;
    }
    Some(GraphQlEnvelope {
        data: map.remove("data"),
        errors: map.remove("errors"),
        extensions: map.remove("extensions"),
    })
}

async fn run(client: reqwest::Client, request: TransportRequest) {
    let TransportRequest {
        descriptor,
        emitter,
        cancel,
        ..
    } = request;
    let RequestDescriptor::GraphQl(desc) = descriptor.as_ref() else {
        emit_kind_mismatch(&emitter, SessionKind::GraphQlQuery).await;
        return;
    };

    let builder = with_headers(client.post(desc.url.clone()), &desc.headers).json(&request_body(desc));
    let _ = emitter.emit(EventPayload::Started).await;
    debug!(url = %desc.url, operation = ?desc.operation_name, "query sent");

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = fetch(builder) => Some(result),
    };

    let fetched = match outcome {
        None => {
            debug!("query cancelled");
            emit_cancelled(&emitter).await;
            return;
        }
        Some(Err(e)) => {
            emit_failure(&emitter, &e).await;
            return;
        }
        Some(Ok(fetched)) => fetched,
    };

    let code = fetched.status.code;
    match parse_envelope(&fetched.body) {
        Some(envelope) => {
            debug!(status = code, has_errors = envelope.has_errors(), "envelope received");
            let _ = emitter
                .emit(EventPayload::Progress(Progress::Envelope(envelope)))
                .await;
            let _ = emitter.emit(EventPayload::StatusChanged(fetched.status)).await;
            let _ = emitter.emit(EventPayload::Closed(CloseReason::Completed)).await;
        }
        None => {
            debug!(status = code, "response is not a GraphQL envelope");
            let _ = emitter.emit(EventPayload::StatusChanged(fetched.status)).await;
            let _ = emitter
                .emit(EventPayload::error(
                    ErrorKind::ProtocolError,
                    format!("HTTP {code} response is not a GraphQL envelope"),
                ))
                .await;
        }
    }
}
