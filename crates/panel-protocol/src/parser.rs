//! Stub bookkeeping shared by every parser.
//!
//! [`ParserCore`] pairs a [`NodeCore`] with the weak stub registry. Concrete
//! parsers decide which messages they accept and how a command key is
//! extracted; the core does lookup, pruning, abort broadcast and reply-tag
//! propagation.

use std::sync::{Arc, Mutex};

use panel_bus::{Broker, MessageType, Node, NodeCore};
use tracing::{debug, warn};

use crate::error::ParserError;
use crate::stub::{lock, ParserStub, SharedStub, StubReply, WeakStub};

/// Node state plus the weak stub registry.
#[derive(Debug)]
pub struct ParserCore {
    node: NodeCore,
    stubs: Mutex<Vec<WeakStub>>,
}

impl ParserCore {
    /// A parser core with no stubs.
    pub fn new(broker: Arc<Broker>, input: MessageType, output: MessageType) -> Self {
        Self {
            node: NodeCore::new(broker, input, output),
            stubs: Mutex::new(Vec::new()),
        }
    }

    /// Underlying node state.
    pub fn node(&self) -> &NodeCore {
        &self.node
    }

    /// Add a stub to the registry and hand it the current reply tag.
    ///
    /// An already expired reference is ignored. Re-registering a stub that
    /// is already present is a no-op. A stub whose command keys overlap
    /// those of another live stub is rejected.
    pub fn register_stub(&self, stub: WeakStub) -> Result<(), ParserError> {
        let Some(candidate) = stub.upgrade() else {
            debug!("skipping registration of expired stub");
            return Ok(());
        };
        let keys = lock(&candidate).command_keys();

        let mut stubs = lock(&self.stubs);
        for existing in stubs.iter().filter_map(std::sync::Weak::upgrade) {
            if std::ptr::addr_eq(Arc::as_ptr(&existing), Arc::as_ptr(&candidate)) {
                return Ok(());
            }
            let taken = lock(&existing).command_keys();
            if let Some(command) = keys.iter().find(|key| taken.contains(key)) {
                warn!(%command, "refusing stub with conflicting command key");
                return Err(ParserError::CommandConflict {
                    command: command.clone(),
                });
            }
        }

        lock(&candidate).set_message_type(self.node.output_message_type());
        debug!(commands = ?keys, "stub registered");
        stubs.push(stub);
        Ok(())
    }

    /// First live stub willing to handle `command`.
    pub fn find_stub_for_command(&self, command: &str) -> Option<SharedStub> {
        lock(&self.stubs)
            .iter()
            .filter_map(std::sync::Weak::upgrade)
            .find(|stub| lock(stub).can_handle_command(command))
    }

    /// Drop registry entries whose stub no longer exists.
    pub fn clean_up_stubs(&self) {
        let mut stubs = lock(&self.stubs);
        let before = stubs.len();
        stubs.retain(|stub| stub.strong_count() > 0);
        if stubs.len() != before {
            debug!(removed = before - stubs.len(), "pruned expired stubs");
        }
    }

    /// Reset every live stub to its initial phase.
    pub fn abort_stubs(&self) {
        for stub in self.live_stubs() {
            lock(&stub).abort();
        }
    }

    /// Change the reply tag of the parser and of every live stub.
    pub fn set_output_message_type(&self, message_type: MessageType) {
        self.node.set_output_message_type(message_type);
        for stub in self.live_stubs() {
            lock(&stub).set_message_type(message_type);
        }
    }

    /// Number of registry entries, expired ones included until pruned.
    pub fn registered_stubs(&self) -> usize {
        lock(&self.stubs).len()
    }

    /// Prune, look up the stub for `command` and let it parse `content`.
    /// Returns `None` when no stub answers to the command.
    ///
    /// No lock is held once this returns, so the caller may publish the
    /// reply even if that re-enters this parser.
    pub fn dispatch(&self, command: &str, content: &str) -> Option<StubReply> {
        self.clean_up_stubs();
        let stub = self.find_stub_for_command(command)?;
        let reply = lock(&stub).parse(content);
        Some(reply)
    }

    fn live_stubs(&self) -> Vec<SharedStub> {
        lock(&self.stubs)
            .iter()
            .filter_map(std::sync::Weak::upgrade)
            .collect()
    }
}

/// A [`Node`] that dispatches commands to registered stubs.
pub trait Parser: Node {
    /// Stub registry and node state.
    fn parser_core(&self) -> &ParserCore;

    /// Register a stub through a weak reference.
    fn register_stub(&self, stub: WeakStub) -> Result<(), ParserError> {
        self.parser_core().register_stub(stub)
    }

    /// Register a stub held in a typed `Arc`.
    fn register<S: ParserStub + 'static>(&self, stub: &Arc<Mutex<S>>) -> Result<(), ParserError>
    where
        Self: Sized,
    {
        self.register_stub(Arc::downgrade(stub) as WeakStub)
    }
}
