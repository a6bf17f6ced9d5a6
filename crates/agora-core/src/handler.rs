//! Per-connection chat session handler.
//!
//! Each connection runs one [`ChatSessionHandler::run`] loop through three
//! states: `Connecting` (register with the registry), `Open` (receive frames,
//! persist, publish) and `Closed` (release the registry entry).
//!
//! On the success path the handler never writes to local transports itself.
//! Every client, the sender included, receives the line through the bus
//! listener, so there is exactly one fan-out path and one ordering. The local
//! registry is only used directly when publishing fails, to degrade to
//! local-only delivery for that event.

use std::sync::Arc;

use agora_types::chat::ChatEvent;
use agora_types::identity::Identity;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::bus::BroadcastBus;
use crate::registry::SessionRegistry;
use crate::store::MessageStore;
use crate::transport::{FrameSource, OutboundHandle};

/// Sent to a sender whose message could not be persisted.
pub const STORE_FAILURE_NOTICE: &str = "error: message not saved, please retry";

/// Sent to a connection that is being replaced by a newer one for the same identity.
pub const REPLACED_NOTICE: &str = "system: signed in from another connection";

/// Default cap on one inbound frame, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 4096;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

/// Counters for one finished session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_received: u64,
    pub events_published: u64,
    pub store_failures: u64,
    pub bus_failures: u64,
    pub rejected_frames: u64,
}

/// Runs the receive loop for each connection.
///
/// Generic over the store and bus ports; one instance is shared by every
/// connection in the process.
pub struct ChatSessionHandler<S, B> {
    store: Arc<S>,
    bus: Arc<B>,
    registry: Arc<SessionRegistry>,
    channel: String,
    max_body_bytes: usize,
}

impl<S: MessageStore, B: BroadcastBus> ChatSessionHandler<S, B> {
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        registry: Arc<SessionRegistry>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
            channel: channel.into(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Drive one connection from handshake to close.
    ///
    /// The transport handshake has already been accepted by the caller;
    /// `outbound` is the handle broadcast will queue lines on. Returns when
    /// the peer disconnects, the transport fails, or the session is closed
    /// from outside (replaced or shut down).
    pub async fn run<F: FrameSource>(
        &self,
        identity: Identity,
        mut source: F,
        outbound: OutboundHandle,
    ) -> SessionSummary {
        let span = info_span!("chat_session", %identity);
        async move {
            let mut summary = SessionSummary::default();
            let mut session_id = None;
            let mut state = SessionState::Connecting;

            loop {
                state = match state {
                    SessionState::Connecting => {
                        let registration =
                            self.registry.register(identity.clone(), outbound.clone());
                        if let Some(previous) = registration.replaced {
                            info!(
                                previous_session = %previous.id(),
                                connected_at = %previous.connected_at(),
                                "replacing existing session"
                            );
                            // Force-close the superseded connection.
                            if let Err(err) =
                                previous.outbound().send_frame(REPLACED_NOTICE.to_string())
                            {
                                debug!(error = %err, "could not notify replaced session");
                            }
                            previous.outbound().close();
                        }
                        session_id = Some(registration.session_id);
                        SessionState::Open
                    }
                    SessionState::Open => {
                        tokio::select! {
                            _ = outbound.closed() => {
                                debug!("session closed by server");
                                SessionState::Closed
                            }
                            frame = source.recv_frame() => match frame {
                                Ok(Some(frame)) => {
                                    self.handle_frame(&identity, frame, &outbound, &mut summary)
                                        .await;
                                    SessionState::Open
                                }
                                Ok(None) => {
                                    debug!("peer closed connection");
                                    SessionState::Closed
                                }
                                Err(err) => {
                                    debug!(error = %err, "transport error");
                                    SessionState::Closed
                                }
                            },
                        }
                    }
                    SessionState::Closed => {
                        if let Some(session_id) = session_id {
                            self.registry.release(&identity, session_id);
                        }
                        break;
                    }
                };
            }

            info!(
                frames = summary.frames_received,
                published = summary.events_published,
                store_failures = summary.store_failures,
                bus_failures = summary.bus_failures,
                "chat session ended"
            );
            summary
        }
        .instrument(span)
        .await
    }

    async fn handle_frame(
        &self,
        identity: &Identity,
        frame: String,
        outbound: &OutboundHandle,
        summary: &mut SessionSummary,
    ) {
        summary.frames_received += 1;

        if frame.len() > self.max_body_bytes {
            summary.rejected_frames += 1;
            warn!(len = frame.len(), max = self.max_body_bytes, "rejecting oversized frame");
            let notice = format!(
                "error: message exceeds {} bytes and was not sent",
                self.max_body_bytes
            );
            if let Err(err) = outbound.send_frame(notice) {
                debug!(error = %err, "could not notify sender of rejected frame");
            }
            return;
        }

        let event = ChatEvent::new(identity.clone(), frame);

        // Write-then-publish: an event that was not persisted is never published.
        if let Err(err) = self.store.append(&event).await {
            summary.store_failures += 1;
            warn!(event_id = %event.id(), error = %err, "failed to persist chat event");
            if let Err(send_err) = outbound.send_frame(STORE_FAILURE_NOTICE.to_string()) {
                debug!(error = %send_err, "could not notify sender of store failure");
            }
            return;
        }

        match self.bus.publish(&self.channel, &event).await {
            Ok(()) => summary.events_published += 1,
            Err(err) => {
                summary.bus_failures += 1;
                let report = self.registry.broadcast(&event.render());
                warn!(
                    event_id = %event.id(),
                    channel = %self.channel,
                    error = %err,
                    delivered = report.delivered,
                    "publish failed, delivered to local sessions only"
                );
            }
        }
    }
}
