//! Process-wide bus listener.
//!
//! Subscribes to the chat channel and re-broadcasts every event to the local
//! sessions, including events this process published itself. The task is
//! supervised: a failed subscribe or a lost subscription is retried with
//! exponential backoff, so a transient broker outage never permanently stops
//! cross-process fan-out. Only cancellation ends it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::bus::BroadcastBus;
use crate::registry::SessionRegistry;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("bus listener is already running")]
    AlreadyRunning,
}

/// Counters reported when the listener stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerStats {
    pub events_delivered: u64,
    pub malformed_dropped: u64,
    pub resubscribes: u64,
}

/// Subscribes to the bus and fans events out to the session registry.
///
/// One per process. [`start`](Self::start) can succeed only once per
/// listener; the app state owns the single instance.
pub struct BusListener<B> {
    bus: Arc<B>,
    registry: Arc<SessionRegistry>,
    channel: String,
    backoff: BackoffPolicy,
    started: AtomicBool,
}

impl<B: BroadcastBus + 'static> BusListener<B> {
    pub fn new(bus: Arc<B>, registry: Arc<SessionRegistry>, channel: impl Into<String>) -> Self {
        Self {
            bus,
            registry,
            channel: channel.into(),
            backoff: BackoffPolicy::default(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Spawn the supervised listener task.
    ///
    /// Returns [`ListenerError::AlreadyRunning`] if this listener was
    /// already started.
    pub fn start(self: &Arc<Self>) -> Result<ListenerHandle, ListenerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        let listener = Arc::clone(self);
        let token = cancel.clone();
        let task = tokio::spawn(async move { listener.run(token).await });

        info!(channel = %self.channel, "bus listener started");
        Ok(ListenerHandle { cancel, task })
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    async fn run(&self, cancel: CancellationToken) -> ListenerStats {
        let mut stats = ListenerStats::default();
        let mut backoff = self.backoff.start();

        'supervise: loop {
            let subscription = tokio::select! {
                _ = cancel.cancelled() => break 'supervise,
                result = self.bus.subscribe(&self.channel) => result,
            };

            let mut stream = match subscription {
                Ok(stream) => {
                    info!(channel = %self.channel, "subscribed to broadcast bus");
                    stream
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(
                        channel = %self.channel,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "bus subscribe failed"
                    );
                    if !sleep_unless_cancelled(delay, &cancel).await {
                        break 'supervise;
                    }
                    continue;
                }
            };

            loop {
                let item = tokio::select! {
                    _ = cancel.cancelled() => break 'supervise,
                    item = stream.next() => item,
                };

                match item {
                    Some(Ok(event)) => {
                        backoff.reset();
                        let report = self.registry.broadcast(&event.render());
                        stats.events_delivered += 1;
                        debug!(
                            event_id = %event.id(),
                            delivered = report.delivered,
                            failed = report.failed,
                            "fanned out chat event"
                        );
                    }
                    Some(Err(err)) if err.is_malformed() => {
                        stats.malformed_dropped += 1;
                        warn!(error = %err, "dropping malformed bus message");
                    }
                    Some(Err(err)) => {
                        warn!(channel = %self.channel, error = %err, "bus subscription failed");
                        break;
                    }
                    None => {
                        warn!(channel = %self.channel, "bus subscription ended");
                        break;
                    }
                }
            }

            drop(stream);
            stats.resubscribes += 1;
            let delay = backoff.next_delay();
            if !sleep_unless_cancelled(delay, &cancel).await {
                break 'supervise;
            }
        }

        info!(
            delivered = stats.events_delivered,
            malformed = stats.malformed_dropped,
            resubscribes = stats.resubscribes,
            "bus listener stopped"
        );
        stats
    }
}

/// Sleep for `delay`; returns `false` if cancelled first.
async fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Handle to a running listener task.
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<ListenerStats>,
}

impl ListenerHandle {
    /// Cancel the subscription and wait for the task to finish.
    pub async fn shutdown(self) -> ListenerStats {
        self.cancel.cancel();
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "bus listener task did not finish cleanly");
                ListenerStats::default()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
