//! Broker-attached endpoints.
//!
//! A node is anything that both listens on and talks to the [`Broker`]:
//! transport pipes and protocol parsers. [`NodeCore`] holds the state every
//! node shares (broker handle, direction masks, liveness flag); the [`Node`]
//! trait adds the per-node receive logic; [`attach`] subscribes a node to
//! its broker without keeping it alive.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::broker::Broker;
use crate::message::MessageType;

/// State shared by every node.
///
/// The masks are atomics so they can be retuned after the node has been
/// attached and is receiving from another thread.
#[derive(Debug)]
pub struct NodeCore {
    broker: Arc<Broker>,
    input: AtomicU16,
    output: AtomicU16,
    running: AtomicBool,
}

impl NodeCore {
    /// Create a running node core with the given direction masks.
    pub fn new(broker: Arc<Broker>, input: MessageType, output: MessageType) -> Self {
        Self {
            broker,
            input: AtomicU16::new(input.bits()),
            output: AtomicU16::new(output.bits()),
            running: AtomicBool::new(true),
        }
    }

    /// The broker this node is attached to.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Mask of message types this node accepts.
    pub fn input_message_type(&self) -> MessageType {
        MessageType::from_bits(self.input.load(Ordering::Acquire))
    }

    /// Tag this node puts on the messages it publishes.
    pub fn output_message_type(&self) -> MessageType {
        MessageType::from_bits(self.output.load(Ordering::Acquire))
    }

    /// Replace the input mask.
    pub fn set_input_message_type(&self, message_type: MessageType) {
        self.input.store(message_type.bits(), Ordering::Release);
    }

    /// Replace the output tag.
    pub fn set_output_message_type(&self, message_type: MessageType) {
        self.output.store(message_type.bits(), Ordering::Release);
    }

    /// True if `message_type` passes this node's input filter.
    pub fn accepts(&self, message_type: MessageType) -> bool {
        message_type.intersects(self.input_message_type())
    }

    /// Publish `payload` under the node's output tag.
    pub fn publish(&self, payload: &str) -> bool {
        self.broker.publish(self.output_message_type(), payload)
    }

    /// False once [`stop`](Self::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark the node stopped. The attached callback declines every message
    /// from now on and background loops observing the flag exit.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("node stopped");
        }
    }
}

/// A broker subscriber with direction masks.
pub trait Node: Send + Sync + 'static {
    /// Shared node state.
    fn core(&self) -> &NodeCore;

    /// Receive logic, invoked by the broker for every published message
    /// while the node is alive and running. Returns `true` if consumed.
    fn publish_callback(&self, message_type: MessageType, payload: &str) -> bool;

    /// Replace the input mask.
    fn set_input_message_type(&self, message_type: MessageType) {
        self.core().set_input_message_type(message_type);
    }

    /// Replace the output tag. Parsers override this to retag their stubs.
    fn set_output_message_type(&self, message_type: MessageType) {
        self.core().set_output_message_type(message_type);
    }

    /// Stop processing.
    fn stop(&self) {
        self.core().stop();
    }
}

/// Subscribe `node` to its broker.
///
/// The broker only holds a weak reference: once the last `Arc` is dropped,
/// or the node is stopped, the subscription stays in the registry but
/// declines every message.
pub fn attach<N: Node>(node: &Arc<N>) {
    let weak = Arc::downgrade(node);
    node.core().broker().subscribe(move |message_type, payload| {
        match weak.upgrade() {
            Some(node) if node.core().is_running() => node.publish_callback(message_type, payload),
            _ => false,
        }
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
