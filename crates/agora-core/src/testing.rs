//! In-memory fakes for the store and bus ports, shared by the core tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use agora_types::chat::ChatEvent;
use agora_types::error::{BusError, StoreError};
use tokio::sync::mpsc;

use crate::bus::{BroadcastBus, EventStream};
use crate::store::MessageStore;

pub(crate) type BusItem = Result<ChatEvent, BusError>;

#[derive(Default)]
pub(crate) struct FakeStore {
    events: Mutex<Vec<ChatEvent>>,
    failing: AtomicBool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl MessageStore for FakeStore {
    async fn append(&self, event: &ChatEvent) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("disk unavailable".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<ChatEvent>, StoreError> {
        let events = self.events.lock().unwrap();
        let skip = events.len().saturating_sub(limit as usize);
        Ok(events[skip..].to_vec())
    }
}

/// Single-subscriber loopback bus: whatever is published is fed to the
/// current subscription, so the listener sees it like a real broker echo.
#[derive(Default)]
pub(crate) struct FakeBus {
    published: Mutex<Vec<(String, ChatEvent)>>,
    loopback: Mutex<Option<mpsc::UnboundedSender<BusItem>>>,
    failing_publish: AtomicBool,
    failing_subscribes: AtomicUsize,
    subscribe_calls: AtomicUsize,
}

impl FakeBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_failing_publish(&self, failing: bool) {
        self.failing_publish.store(failing, Ordering::SeqCst);
    }

    /// Make the next `n` subscribe calls fail.
    pub(crate) fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    pub(crate) fn published(&self) -> Vec<(String, ChatEvent)> {
        self.published.lock().unwrap().clone()
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Push a raw item into the live subscription.
    pub(crate) fn inject(&self, item: BusItem) {
        if let Some(tx) = self.loopback.lock().unwrap().as_ref() {
            let _ = tx.send(item);
        }
    }

    /// End the live subscription, as a broker disconnect would.
    pub(crate) fn drop_subscription(&self) {
        self.loopback.lock().unwrap().take();
    }

    /// Wait until a subscription is live.
    pub(crate) async fn subscribed(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.loopback.lock().unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("listener never subscribed");
    }
}

impl BroadcastBus for FakeBus {
    async fn publish(&self, channel: &str, event: &ChatEvent) -> Result<(), BusError> {
        if self.failing_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                channel: channel.to_string(),
                reason: "broker unreachable".to_string(),
            });
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), event.clone()));
        self.inject(Ok(event.clone()));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EventStream, BusError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_subscribes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_subscribes.store(remaining - 1, Ordering::SeqCst);
            return Err(BusError::Subscribe {
                channel: channel.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.loopback.lock().unwrap() = Some(tx);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}
