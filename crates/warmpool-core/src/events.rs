//! Event bus for pool and monitor events.
//!
//! A thin wrapper over `tokio::sync::broadcast`. Emitting never waits on a
//! subscriber: a slow receiver lags and skips, it does not apply backpressure.

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default channel capacity for an event bus
pub const DEFAULT_CAPACITY: usize = 256;

/// Events carried by an [`EventBus`].
pub trait BusEvent: Clone + Send + 'static {
    /// Stable event name, e.g. `connection:error`
    fn name(&self) -> &'static str;
}

#[derive(Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event and continue.
    ///
    /// Returns the number of receivers that got it; 0 when nobody listens.
    pub fn emit(&self, event: E) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event = name, receivers = count, "[EventBus] Emitted event");
                count
            },
            Err(_) => {
                debug!(event = name, "[EventBus] No receivers for event");
                0
            },
        }
    }

    /// Each subscriber receives every event emitted after it subscribed.
    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: BusEvent> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EventReceiver<E> {
    receiver: broadcast::Receiver<E>,
}

impl<E: BusEvent> EventReceiver<E> {
    /// Receive the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                },
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<E> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
