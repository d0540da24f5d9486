//! WebSocket executor backed by `tokio-tungstenite`.
//!
//! The task connects under a timeout, reports `Started`, then runs one
//! `select!` loop over cancellation, outbound [`SocketCommand`]s and
//! inbound frames. Exactly one terminal event is emitted: `Closed` with
//! the reason the loop ended, or an `Error` if the socket failed.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, info_span};
use wirebench_core::{
    CloseReason, ErrorKind, EventEmitter, EventPayload, Progress, RequestDescriptor, SessionKind,
    WebSocketDescriptor,
};
use wirebench_settings::WebSocketSettings;

use crate::error::classify_ws;
use crate::handle::{SocketCommand, TransportHandle};
use crate::{Transport, TransportRequest, emit_cancelled, emit_kind_mismatch};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// WebSocket executor.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    settings: WebSocketSettings,
}

impl WebSocketTransport {
    /// Executor with the given timeouts and queue size.
    pub fn new(settings: WebSocketSettings) -> Self {
        Self { settings }
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> SessionKind {
        SessionKind::WebSocketConnection
    }

    fn start(&self, request: TransportRequest) -> TransportHandle {
        let cancel = request.cancel.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel(self.settings.send_queue_capacity.max(1));
        let span = info_span!("websocket", session_id = %request.session_id);
        let task = tokio::spawn(run(self.settings.clone(), request, cmd_rx).instrument(span));
        TransportHandle::with_commands(cancel, cmd_tx, task)
    }
}

/// Build the handshake request with the user's extra headers.
pub fn handshake_request(desc: &WebSocketDescriptor) -> Result<Request, String> {
    let mut request = desc
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| e.to_string())?;
    for header in &desc.headers {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| format!("header {:?}: {e}", header.name))?;
        let value = HeaderValue::from_str(&header.value)
            .map_err(|e| format!("header {:?}: {e}", header.name))?;
        let _ = request.headers_mut().append(name, value);
    }
    Ok(request)
}

/// How the socket loop ended.
enum Ended {
    Closed(CloseReason),
    Cancelled,
    Failed(ErrorKind, String),
}

async fn run(
    settings: WebSocketSettings,
    request: TransportRequest,
    mut commands: mpsc::Receiver<SocketCommand>,
) {
    let TransportRequest {
        descriptor,
        emitter,
        cancel,
        ..
    } = request;
    let RequestDescriptor::WebSocket(desc) = descriptor.as_ref() else {
        emit_kind_mismatch(&emitter, SessionKind::WebSocketConnection).await;
        return;
    };

    let handshake = match handshake_request(desc) {
        Ok(handshake) => handshake,
        Err(detail) => {
            let _ = emitter
                .emit(EventPayload::error(ErrorKind::ProtocolError, detail))
                .await;
            return;
        }
    };

    debug!(url = %desc.url, "connecting");
    let connect_timeout = settings.connect_timeout();
    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            emit_cancelled(&emitter).await;
            return;
        }
        result = tokio::time::timeout(connect_timeout, connect_async(handshake)) => result,
    };
    let socket = match connected {
        Ok(Ok((socket, _response))) => socket,
        Ok(Err(e)) => {
            let (kind, detail) = classify_ws(&e);
            debug!(kind = %kind, detail = %detail, "connect failed");
            let _ = emitter.emit(EventPayload::error(kind, detail)).await;
            return;
        }
        Err(_) => {
            let _ = emitter
                .emit(EventPayload::error(
                    ErrorKind::Timeout,
                    format!("connect timed out after {}ms", connect_timeout.as_millis()),
                ))
                .await;
            return;
        }
    };

    let _ = emitter.emit(EventPayload::Started).await;
    debug!("connected");

    let (mut sink, mut source) = socket.split();
    let ended = pump(&settings, &emitter, &cancel, &mut commands, &mut sink, &mut source).await;

    match ended {
        Ended::Closed(reason) => {
            debug!(?reason, "socket closed");
            let _ = emitter.emit(EventPayload::Closed(reason)).await;
        }
        Ended::Cancelled => {
            close_gracefully(&mut sink, &mut source, settings.close_timeout()).await;
            emit_cancelled(&emitter).await;
        }
        Ended::Failed(kind, detail) => {
            debug!(kind = %kind, detail = %detail, "socket failed");
            let _ = emitter.emit(EventPayload::error(kind, detail)).await;
        }
    }
}

async fn pump(
    settings: &WebSocketSettings,
    emitter: &EventEmitter,
    cancel: &tokio_util::sync::CancellationToken,
    commands: &mut mpsc::Receiver<SocketCommand>,
    sink: &mut WsSink,
    source: &mut WsSource,
) -> Ended {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ended::Cancelled,
            command = commands.recv() => match command {
                Some(SocketCommand::SendText(text)) => {
                    // A peer that stops reading stalls the write; cancel still wins.
                    let sent = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Ended::Cancelled,
                        sent = sink.send(Message::Text(text.clone().into())) => sent,
                    };
                    if let Err(e) = sent {
                        let (kind, detail) = classify_ws(&e);
                        return Ended::Failed(kind, detail);
                    }
                    if settings.echo_sent {
                        let _ = emitter.emit(EventPayload::Progress(Progress::Echo { text })).await;
                    }
                }
                Some(SocketCommand::Close) | None => {
                    close_gracefully(sink, source, settings.close_timeout()).await;
                    return Ended::Closed(CloseReason::LocalClose);
                }
            },
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = emitter
                        .emit(EventPayload::MessageReceived { text: text.to_string() })
                        .await;
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "skipping binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, text) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or_default();
                    return Ended::Closed(CloseReason::PeerClosed { code, text });
                }
                Some(Ok(_)) => {}
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
                | None => {
                    return Ended::Closed(CloseReason::PeerClosed { code: None, text: String::new() });
                }
                Some(Err(e)) => {
                    let (kind, detail) = classify_ws(&e);
                    return Ended::Failed(kind, detail);
                }
            },
        }
    }
}

/// Send a normal close frame and wait for the peer's reply. Both the write
/// and the drain share one `limit`.
async fn close_gracefully(sink: &mut WsSink, source: &mut WsSource, limit: Duration) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    let closed = tokio::time::timeout(limit, async {
        if sink.send(Message::Close(Some(frame))).await.is_err() {
            return;
        }
        while let Some(Ok(message)) = source.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    if closed.is_err() {
        debug!(limit_ms = limit.as_millis(), "peer did not acknowledge close");
    }
}
