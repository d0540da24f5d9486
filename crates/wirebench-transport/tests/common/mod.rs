//! Shared helpers for transport integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wirebench_core::emitter::{self, EventReceiver};
use wirebench_core::{EventPayload, RequestDescriptor, SessionId};
use wirebench_transport::TransportRequest;

/// A request wired to a fresh emitter; returns the receiver and token.
pub fn request(descriptor: RequestDescriptor) -> (TransportRequest, EventReceiver, CancellationToken) {
    let session_id = SessionId::new();
    let (emitter, receiver) =
        emitter::channel(session_id.clone(), 64, Duration::from_millis(50));
    let cancel = CancellationToken::new();
    let request = TransportRequest {
        session_id,
        descriptor: Arc::new(descriptor),
        emitter,
        cancel: cancel.clone(),
    };
    (request, receiver, cancel)
}

/// Every payload until the adapter drops its emitter.
pub async fn collect(receiver: &mut EventReceiver) -> Vec<EventPayload> {
    let mut out = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => panic!("adapter did not finish; got {out:?}"),
            event = receiver.recv() => match event {
                Some(event) => out.push(event.payload),
                None => return out,
            },
        }
    }
}

/// Next payload, failing after a few seconds.
pub async fn next(receiver: &mut EventReceiver) -> EventPayload {
    tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("timed out waiting for event")
        .expect("adapter ended early")
        .payload
}

/// An address nothing is listening on.
pub fn refused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
