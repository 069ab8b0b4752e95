//! Publish/subscribe broker.
//!
//! The [`Broker`] keeps an ordered list of subscriber callbacks.
//! Registration order is dispatch priority: [`Broker::publish`] hands the
//! message to each callback in turn and stops at the first one that
//! reports it consumed the message.
//!
//! There is no unsubscribe. A subscriber whose receiver went away keeps its
//! slot and simply declines every message (see [`attach`](crate::attach)).

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use crate::message::MessageType;

/// Signature of a subscriber: returns `true` if it consumed the message.
pub type Callback = Arc<dyn Fn(MessageType, &str) -> bool + Send + Sync>;

/// Ordered registry of subscribers with first-responder-wins dispatch.
///
/// Dispatch runs on the publisher's thread. A callback may publish again
/// while it handles a message; the nested call sees the same subscriber
/// list and runs to completion before the outer dispatch resumes.
///
/// # Examples
///
/// ```
/// use panel_bus::{Broker, MessageType};
///
/// let broker = Broker::new();
/// broker.subscribe(|t, payload| t.intersects(MessageType::INBOUND_WIRED) && payload == "ping");
///
/// assert!(broker.publish(MessageType::INBOUND_WIRED, "ping"));
/// assert!(!broker.publish(MessageType::INBOUND_WIRELESS, "ping"));
/// ```
#[derive(Default)]
pub struct Broker {
    callbacks: RwLock<Vec<Callback>>,
}

impl Broker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to the registry. Duplicates are not filtered.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(MessageType, &str) -> bool + Send + Sync + 'static,
    {
        self.subscribe_callback(Arc::new(callback));
    }

    /// Append an already shared callback to the registry.
    pub fn subscribe_callback(&self, callback: Callback) {
        let mut callbacks = self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.push(callback);
        debug!(subscribers = callbacks.len(), "subscriber registered");
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Offer a message to every subscriber in registration order.
    ///
    /// Returns `true` as soon as one callback consumes the message; later
    /// callbacks are not invoked. Returns `false` if nobody took it.
    pub fn publish(&self, message_type: MessageType, payload: &str) -> bool {
        // Snapshot so callbacks can publish or subscribe without holding the lock.
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        trace!(%message_type, len = payload.len(), "forwarding message to subscribers");
        for (index, callback) in callbacks.iter().enumerate() {
            if callback(message_type, payload) {
                trace!(%message_type, index, "message consumed");
                return true;
            }
        }
        debug!(%message_type, "message not accepted by any subscriber");
        false
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
