//! Transport seams for one client connection.
//!
//! The inbound half is a [`FrameSource`] the session handler reads from. The
//! outbound half is an [`OutboundHandle`]: a bounded queue drained by a writer
//! task that owns the real socket, plus a close signal. Broadcast only ever
//! enqueues, so a slow client can never stall fan-out to the others.

use agora_types::error::TransportError;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

/// Identifies one registered connection (UUIDv7).
pub type SessionId = Uuid;

/// Inbound text frames from one client.
pub trait FrameSource: Send {
    /// Next text frame. `Ok(None)` means the peer closed the connection.
    fn recv_frame(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Option<String>, TransportError>> + Send;
}

/// In-process transport: frames come from a channel and the connection
/// closes when every sender is dropped.
impl FrameSource for mpsc::Receiver<String> {
    async fn recv_frame(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.recv().await)
    }
}

/// Outbound side of one client connection.
///
/// Cloning shares the same queue and close signal.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    tx: mpsc::Sender<String>,
    close: CancellationToken,
}

impl OutboundHandle {
    /// Create a handle and the receiving end its writer task drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                close: CancellationToken::new(),
            },
            rx,
        )
    }

    /// Queue a frame without waiting.
    pub fn send_frame(&self, text: String) -> Result<(), TransportError> {
        if self.close.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Ask the writer to flush what is queued and close the connection.
    pub fn close(&self) {
        self.close.cancel();
    }

    /// Whether the connection is closed or closing.
    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }
}
