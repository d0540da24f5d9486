//! Control handle for a running adapter task.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Instruction for a connected socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketCommand {
    /// Write one text frame.
    SendText(String),
    /// Start a graceful close handshake.
    Close,
}

/// Why a frame could not be queued.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The adapter does not accept frames, or its task already ended.
    #[error("transport is not connected")]
    NotConnected,
    /// The outbound queue is full.
    #[error("outbound queue is full")]
    QueueFull,
}

/// Returned by [`crate::Transport::start`]. Dropping it does not stop
/// the task; use [`TransportHandle::cancel`].
#[derive(Debug)]
pub struct TransportHandle {
    cancel: CancellationToken,
    commands: Option<mpsc::Sender<SocketCommand>>,
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Handle for a one-shot adapter with no command channel.
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            commands: None,
            task,
        }
    }

    /// Handle for an adapter that accepts [`SocketCommand`]s.
    pub fn with_commands(
        cancel: CancellationToken,
        commands: mpsc::Sender<SocketCommand>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            cancel,
            commands: Some(commands),
            task,
        }
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Request a graceful close. Adapters without a command channel, or
    /// whose channel is full or gone, are cancelled instead.
    pub fn close(&self) {
        let queued = self
            .commands
            .as_ref()
            .is_some_and(|tx| tx.try_send(SocketCommand::Close).is_ok());
        if !queued {
            self.cancel();
        }
    }

    /// Queue a text frame without waiting.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        let tx = self.commands.as_ref().ok_or(SendError::NotConnected)?;
        tx.try_send(SocketCommand::SendText(text)).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::NotConnected,
        })
    }

    /// Whether the adapter task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the task to end. Returns immediately if it already has.
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Abort the task without waiting for it to unwind.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn one_shot_handle_rejects_frames_and_close_cancels() {
        let token = CancellationToken::new();
        let watched = token.clone();
        let task = tokio::spawn(async move { watched.cancelled().await });
        let handle = TransportHandle::new(token.clone(), task);

        assert_eq!(handle.send_text("hi".into()), Err(SendError::NotConnected));
        handle.close();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn socket_handle_queues_until_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(async {});
        let handle = TransportHandle::with_commands(CancellationToken::new(), tx, task);

        handle.send_text("one".into()).unwrap();
        assert_eq!(handle.send_text("two".into()), Err(SendError::QueueFull));
        assert_eq!(rx.recv().await, Some(SocketCommand::SendText("one".into())));

        handle.close();
        assert_eq!(rx.recv().await, Some(SocketCommand::Close));

        drop(rx);
        assert_eq!(handle.send_text("late".into()), Err(SendError::NotConnected));
    }

    #[tokio::test]
    async fn close_on_full_queue_falls_back_to_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let handle = TransportHandle::with_commands(token.clone(), tx, tokio::spawn(async {}));
        handle.send_text("fill".into()).unwrap();
        handle.close();
        assert!(token.is_cancelled());
    }
}
