//! One-shot HTTP executor backed by `reqwest`.
//!
//! Event sequence on success:
//! `Started → Progress(Body) → StatusChanged → Closed(Completed)`.
//! Non-2xx statuses are ordinary responses. A cancelled request drops the
//! in-flight future, which closes the connection, and emits no body.

use std::time::Instant;

use bytes::Bytes;
use tracing::{Instrument, debug, info_span, warn};
use wirebench_core::{
    Body, CloseReason, EventEmitter, EventPayload, HeaderList, HttpDescriptor, Method, Progress,
    RequestDescriptor, SessionKind, StatusInfo,
};
use wirebench_settings::HttpSettings;

use crate::error::classify_reqwest;
use crate::handle::TransportHandle;
use crate::{Transport, TransportRequest, emit_cancelled, emit_kind_mismatch};

/// HTTP executor.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the configured timeouts and user agent.
    pub fn new(settings: &HttpSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .connect_timeout(settings.connect_timeout())
            .user_agent(settings.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build configured HTTP client, using defaults");
                reqwest::Client::default()
            });
        Self { client }
    }

    /// Underlying connection pool.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Transport for HttpTransport {
    fn kind(&self) -> SessionKind {
        SessionKind::HttpRequest
    }

    fn start(&self, request: TransportRequest) -> TransportHandle {
        let cancel = request.cancel.clone();
        let span = info_span!("http", session_id = %request.session_id);
        let task = tokio::spawn(run(self.client.clone(), request).instrument(span));
        TransportHandle::new(cancel, task)
    }
}

async fn run(client: reqwest::Client, request: TransportRequest) {
    let TransportRequest {
        descriptor,
        emitter,
        cancel,
        ..
    } = request;
    let RequestDescriptor::Http(desc) = descriptor.as_ref() else {
        emit_kind_mismatch(&emitter, SessionKind::HttpRequest).await;
        return;
    };

    let builder = build_request(&client, desc);
    let _ = emitter.emit(EventPayload::Started).await;
    debug!(method = %desc.method, url = %desc.url, "request sent");

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        result = fetch(builder) => Some(result),
    };

    match outcome {
        None => {
            debug!("request cancelled");
            emit_cancelled(&emitter).await;
        }
        Some(Ok(fetched)) => {
            debug!(status = fetched.status.code, elapsed_ms = fetched.status.elapsed_ms, "response received");
            let _ = emitter
                .emit(EventPayload::Progress(Progress::Body {
                    bytes: fetched.body,
                    content_type: fetched.content_type,
                }))
                .await;
            let _ = emitter.emit(EventPayload::StatusChanged(fetched.status)).await;
            let _ = emitter.emit(EventPayload::Closed(CloseReason::Completed)).await;
        }
        Some(Err(e)) => emit_failure(&emitter, &e).await,
    }
}

fn build_request(client: &reqwest::Client, desc: &HttpDescriptor) -> reqwest::RequestBuilder {
    let builder = with_headers(
        client.request(to_reqwest_method(desc.method), desc.url.clone()),
        &desc.headers,
    );
    match &desc.body {
        Body::Empty => builder,
        Body::Raw(bytes) => builder.body(bytes.clone()),
        Body::Json(value) => builder.json(value),
    }
}

pub(crate) fn with_headers(
    mut builder: reqwest::RequestBuilder,
    headers: &HeaderList,
) -> reqwest::RequestBuilder {
    for header in headers {
        builder = builder.header(header.name.as_str(), header.value.as_str());
    }
    builder
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// A fully-read response.
#[derive(Debug)]
pub(crate) struct Fetched {
    pub(crate) status: StatusInfo,
    pub(crate) content_type: Option<String>,
    pub(crate) body: Bytes,
}

/// Send and read the whole body. Elapsed time runs to the last body byte.
pub(crate) async fn fetch(builder: reqwest::RequestBuilder) -> Result<Fetched, reqwest::Error> {
    let started = Instant::now();
    let response = builder.send().await?;

    let status = response.status();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let body = response.bytes().await?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    Ok(Fetched {
        status: StatusInfo {
            code: status.as_u16(),
            reason: status.canonical_reason().map(str::to_owned),
            headers,
            elapsed_ms,
        },
        content_type,
        body,
    })
}

pub(crate) async fn emit_failure(emitter: &EventEmitter, err: &reqwest::Error) {
    let (kind, detail) = classify_reqwest(err);
    debug!(kind = %kind, detail = %detail, "request failed");
    let _ = emitter.emit(EventPayload::error(kind, detail)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_mapping() {
        for method in Method::ALL {
            assert_eq!(to_reqwest_method(method).as_str(), method.as_str());
        }
    }

    #[test]
    fn builds_with_configured_settings() {
        let transport = HttpTransport::new(&HttpSettings::default());
        assert_eq!(transport.kind(), SessionKind::HttpRequest);
        let _client = transport.client().clone();
    }

    #[test]
    fn request_carries_headers_and_json_body() {
        let client = reqwest::Client::new();
        let mut headers = HeaderList::new();
        headers.push("X-Trace", "1");
        headers.push("X-Trace", "2");
        let desc = HttpDescriptor {
            method: Method::Post,
            url: "http://localhost/items".parse().unwrap(),
            headers,
            body: Body::Json(serde_json::json!({"name": "Nocturne"})),
        };
        let request = build_request(&client, &desc).build().unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        let traces: Vec<_> = request.headers().get_all("x-trace").iter().collect();
        assert_eq!(traces.len(), 2);
        assert_eq!(
            request.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
