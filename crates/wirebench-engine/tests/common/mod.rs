//! Shared helpers for engine integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use wirebench_core::{SessionId, SessionState};
use wirebench_engine::Engine;
use wirebench_settings::WorkbenchSettings;

/// Engine with network transports and short timeouts.
pub fn engine() -> Engine {
    let mut settings = WorkbenchSettings::default();
    settings.http.timeout_ms = 2_000;
    settings.websocket.close_timeout_ms = 500;
    settings.engine.shutdown_grace_ms = 500;
    Engine::new(settings)
}

/// Poll until `id` is terminal and detached, then flush what is queued.
pub async fn settle(engine: &Engine, id: &SessionId) -> SessionState {
    for _ in 0..500 {
        let _ = engine.poll(Duration::from_millis(10)).await;
        if let Some(session) = engine.session(id) {
            if session.state.is_terminal() && !session.attached {
                while engine.poll(Duration::from_millis(10)).await > 0 {}
                return session.state;
            }
        }
    }
    panic!("{id} did not finish: {:?}", engine.session(id));
}

/// Poll until `id` reaches `state`.
pub async fn wait_state(engine: &Engine, id: &SessionId, state: SessionState) {
    for _ in 0..500 {
        let _ = engine.poll(Duration::from_millis(10)).await;
        if engine.session(id).is_some_and(|s| s.state == state) {
            return;
        }
    }
    panic!("{id} never reached {state}: {:?}", engine.session(id));
}

/// Text echo server on an ephemeral port.
pub async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _ = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        let _ = ws.send(Message::Text(text)).await;
                    }
                }
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
