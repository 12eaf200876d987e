//! Event source contract
//!
//! An event source invokes a callback once per event and hands back a
//! cancellation handle. How events are captured is up to the source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::types::InteractionEvent;

/// Callback invoked once per event
pub type EventHandler = Arc<dyn Fn(InteractionEvent) + Send + Sync>;

/// Anything that can feed interaction events to a subscriber
pub trait EventSource: Send + Sync {
    fn subscribe(&self, handler: EventHandler) -> Subscription;
}

/// Cancellation handle for a subscription.
///
/// Clones share the same flag. Cancelling is immediate and idempotent, and
/// also cancels any upstream subscription this one was linked to.
#[derive(Clone, Default)]
pub struct Subscription {
    cancelled: Arc<AtomicBool>,
    upstream: Option<Box<Subscription>>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `upstream` together with this handle
    pub fn linked(mut self, upstream: Subscription) -> Self {
        self.upstream = Some(Box::new(upstream));
        self
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(upstream) = &self.upstream {
            upstream.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// In-process publisher, used when the host pushes events directly
#[derive(Default)]
pub struct LocalEventSource {
    subscribers: Mutex<Vec<(Subscription, EventHandler)>>,
}

impl LocalEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every live subscriber; returns how many received it
    pub fn publish(&self, event: InteractionEvent) -> usize {
        let live: Vec<(Subscription, EventHandler)> = {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|(sub, _)| !sub.is_cancelled());
            subscribers.clone()
        };

        let mut delivered = 0;
        for (subscription, handler) in live {
            if subscription.is_cancelled() {
                continue;
            }
            handler(event.clone());
            delivered += 1;
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(sub, _)| !sub.is_cancelled())
            .count()
    }
}

impl EventSource for LocalEventSource {
    fn subscribe(&self, handler: EventHandler) -> Subscription {
        let subscription = Subscription::new();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((subscription.clone(), handler));
        debug!("Event source has a new subscriber");
        subscription
    }
}
