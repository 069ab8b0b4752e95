//! Parser stubs: one handler per command key.
//!
//! A stub turns the content of one inbound command into one reply. Stateful
//! stubs run small phase machines and switch the command key they answer to
//! as they move between phases, so the follow-up command of a multi-step
//! exchange is routed back to the same instance.
//!
//! Stubs are owned by whoever wires the system; parsers only keep
//! [`WeakStub`] references to them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use panel_bus::MessageType;

/// Outcome of [`ParserStub::parse`]: the reply to publish and whether the
/// command succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubReply {
    /// Tag to publish the payload under.
    pub message_type: MessageType,
    /// False when the command was rejected.
    pub success: bool,
    /// Reply payload, or the failure reason.
    pub payload: String,
}

impl StubReply {
    /// A reply with an explicit success flag.
    pub fn message(message_type: MessageType, success: bool, payload: impl Into<String>) -> Self {
        Self {
            message_type,
            success,
            payload: payload.into(),
        }
    }

    /// A successful reply.
    pub fn ok(message_type: MessageType, payload: impl Into<String>) -> Self {
        Self::message(message_type, true, payload)
    }

    /// A failed reply carrying `reason` as payload.
    pub fn error(message_type: MessageType, reason: impl Into<String>) -> Self {
        Self::message(message_type, false, reason)
    }

    /// Success with nothing to publish.
    pub fn silent() -> Self {
        Self::message(MessageType::NO_OUTLET, true, String::new())
    }
}

/// State common to every stub: the command key it currently answers to and
/// the tag its replies carry.
#[derive(Debug, Clone)]
pub struct StubBase {
    command: String,
    message_type: MessageType,
}

impl StubBase {
    /// A base answering to `command`, with no reply tag until registered.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            message_type: MessageType::NO_OUTLET,
        }
    }

    /// Command key currently answered to.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Switch the command key, used on phase changes.
    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    /// Tag replies are published under.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Set by the owning parser.
    pub fn set_message_type(&mut self, message_type: MessageType) {
        self.message_type = message_type;
    }
}

/// A single command handler.
pub trait ParserStub: Send {
    /// Shared stub state.
    fn base(&self) -> &StubBase;

    /// Shared stub state, mutably.
    fn base_mut(&mut self) -> &mut StubBase;

    /// Handle the content of one command.
    fn parse(&mut self, data: &str) -> StubReply;

    /// Return to the initial phase and release any open resource.
    fn abort(&mut self) {}

    /// Every command key this stub may answer to across all of its phases.
    /// Registration refuses stubs whose keys overlap a live stub's.
    fn command_keys(&self) -> Vec<String> {
        vec![self.base().command().to_string()]
    }

    /// Exact match on the current command key.
    fn can_handle_command(&self, command: &str) -> bool {
        self.base().command() == command
    }

    /// Command key currently answered to.
    fn command(&self) -> &str {
        self.base().command()
    }

    /// Tag replies are published under.
    fn message_type(&self) -> MessageType {
        self.base().message_type()
    }

    /// Set the reply tag.
    fn set_message_type(&mut self, message_type: MessageType) {
        self.base_mut().set_message_type(message_type);
    }
}

/// Owning handle on a stub.
pub type SharedStub = Arc<Mutex<dyn ParserStub>>;

/// Non-owning handle kept by parsers.
pub type WeakStub = Weak<Mutex<dyn ParserStub>>;

/// Wrap a stub for sharing with a parser.
pub fn shared<S: ParserStub + 'static>(stub: S) -> Arc<Mutex<S>> {
    Arc::new(Mutex::new(stub))
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
