//! Scripted transports for unit tests.

use std::sync::Arc;

use tokio::sync::mpsc;
use wirebench_core::{
    CloseReason, ErrorKind, EventPayload, HeaderList, HttpDescriptor, Method, Progress,
    RequestDescriptor, SessionKind, StatusInfo, WebSocketDescriptor,
};
use wirebench_transport::{SocketCommand, Transport, TransportHandle, TransportRequest, Transports};

/// What a scripted adapter does after `Started`.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Script {
    /// Report status 200 and close.
    Complete,
    /// Fail with the given kind.
    Fail(ErrorKind),
    /// Wait for cancellation or a close command, echoing sent frames.
    Hang,
}

pub(crate) struct ScriptedTransport {
    kind: SessionKind,
    script: Script,
}

impl ScriptedTransport {
    /// One scripted executor per kind.
    pub(crate) fn set(script: Script) -> Transports {
        let make = |kind| Arc::new(Self { kind, script }) as Arc<dyn Transport>;
        Transports::new(
            make(SessionKind::HttpRequest),
            make(SessionKind::GraphQlQuery),
            make(SessionKind::WebSocketConnection),
        )
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> SessionKind {
        self.kind
    }

    fn start(&self, request: TransportRequest) -> TransportHandle {
        let cancel = request.cancel.clone();
        let (tx, rx) = mpsc::channel::<SocketCommand>(8);
        let socket = self.kind == SessionKind::WebSocketConnection;
        let mut commands = socket.then_some(rx);
        let script = self.script;
        let task = tokio::spawn(async move {
            let TransportRequest { emitter, cancel, .. } = request;
            let _ = emitter.emit(EventPayload::Started).await;
            match script {
                Script::Complete => {
                    let _ = emitter.emit(EventPayload::StatusChanged(ok_status())).await;
                    let _ = emitter.emit(EventPayload::Closed(CloseReason::Completed)).await;
                }
                Script::Fail(kind) => {
                    let _ = emitter.emit(EventPayload::error(kind, "scripted failure")).await;
                }
                Script::Hang => loop {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            let _ = emitter
                                .emit(EventPayload::error(ErrorKind::Cancelled, "cancelled by user"))
                                .await;
                            let _ = emitter.emit(EventPayload::Closed(CloseReason::Cancelled)).await;
                            break;
                        }
                        command = next_command(&mut commands) => match command {
                            Some(SocketCommand::SendText(text)) => {
                                let _ = emitter.emit(EventPayload::Progress(Progress::Echo { text })).await;
                            }
                            Some(SocketCommand::Close) | None => {
                                let _ = emitter.emit(EventPayload::Closed(CloseReason::LocalClose)).await;
                                break;
                            }
                        },
                    }
                },
            }
        });
        if socket {
            TransportHandle::with_commands(cancel, tx, task)
        } else {
            TransportHandle::new(cancel, task)
        }
    }
}

async fn next_command(commands: &mut Option<mpsc::Receiver<SocketCommand>>) -> Option<SocketCommand> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn ok_status() -> StatusInfo {
    StatusInfo {
        code: 200,
        reason: Some("OK".into()),
        headers: Vec::new(),
        elapsed_ms: 1,
    }
}

pub(crate) fn http_descriptor() -> RequestDescriptor {
    RequestDescriptor::Http(HttpDescriptor {
        method: Method::Get,
        url: "http://localhost/health".parse().unwrap(),
        headers: HeaderList::new(),
        body: Default::default(),
    })
}

pub(crate) fn ws_descriptor() -> RequestDescriptor {
    RequestDescriptor::WebSocket(WebSocketDescriptor {
        url: "ws://localhost/socket".parse().unwrap(),
        headers: HeaderList::new(),
    })
}
