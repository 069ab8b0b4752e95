//! obs-websocket protocol.
//!
//! Every frame is a JSON envelope `{"op": <opcode>, "d": {...}}`.
//! [`ObsParser`] routes the `d` object to the stub registered under the
//! decimal opcode. Replies to requests are re-tagged as
//! [`MessageType::EVENT`] and picked up by [`ObsReplyParser`], which routes
//! them by request id.
//!
//! Malformed frames are never answered: failures are logged and dropped.

use std::sync::Arc;

use panel_bus::{attach, Broker, MessageType, Node, NodeCore};
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use crate::error::ProtocolError;
use crate::parser::{Parser, ParserCore};

mod auth;
mod reply;
mod request_id;
mod stubs;

pub use auth::authenticate;
pub use reply::{CorrelatedReplyStub, ObsReplyParser};
pub use request_id::{add_request_id, generate_request_id, tag_request};
pub use stubs::{EventStub, HelloStub, IdentifiedStub, RequestBatchResponseStub, RequestResponseStub};

/// RPC version spoken by this implementation.
pub const RPC_VERSION: u8 = 1;

/// Subscription mask sent with Identify: every non-high-volume category.
pub const EVENT_SUBSCRIPTIONS_ALL: u32 = 0x7ff;

/// obs-websocket message opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::FromRepr, strum::EnumIter)]
#[repr(u8)]
pub enum Opcode {
    /// Server greeting, carries the authentication challenge.
    Hello = 0,
    /// Client handshake reply.
    Identify = 1,
    /// Server confirms the session.
    Identified = 2,
    /// Client updates session parameters.
    Reidentify = 3,
    /// Server event.
    Event = 5,
    /// Client request.
    Request = 6,
    /// Server reply to a request.
    RequestResponse = 7,
    /// Client batch request.
    RequestBatch = 8,
    /// Server reply to a batch request.
    RequestBatchResponse = 9,
}

impl Opcode {
    /// Numeric opcode.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Stub lookup key: the opcode in decimal.
    pub fn key(self) -> String {
        self.code().to_string()
    }
}

/// Parse `data` as a JSON object.
pub(crate) fn parse_object(data: &str) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::from_str(data)? {
        Value::Object(object) => Ok(object),
        _ => Err(ProtocolError::NotAnObject),
    }
}

/// Fail on the first of `fields` absent from `object`.
pub(crate) fn require_fields(object: &Map<String, Value>, fields: &[&str]) -> Result<(), ProtocolError> {
    match fields.iter().find(|field| !object.contains_key(**field)) {
        Some(field) => Err(ProtocolError::missing(field)),
        None => Ok(()),
    }
}

/// Parser for frames received from the obs-websocket server.
///
/// Accepts [`MessageType::INBOUND_WIRELESS`]; stub replies go out on
/// [`MessageType::OUTBOUND_WIRELESS`] by default.
#[derive(Debug)]
pub struct ObsParser {
    core: ParserCore,
}

impl ObsParser {
    /// Create the parser and subscribe it to `broker`.
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        let parser = Arc::new(Self {
            core: ParserCore::new(
                broker,
                MessageType::INBOUND_WIRELESS,
                MessageType::OUTBOUND_WIRELESS,
            ),
        });
        attach(&parser);
        parser
    }
}

impl Node for ObsParser {
    fn core(&self) -> &NodeCore {
        self.core.node()
    }

    fn publish_callback(&self, message_type: MessageType, data: &str) -> bool {
        let node = self.core.node();
        if !node.accepts(message_type) {
            return false;
        }
        let Ok(envelope) = parse_object(data) else {
            trace!("ignoring non-JSON frame");
            return false;
        };
        let (Some(op), Some(payload)) = (envelope.get("op"), envelope.get("d")) else {
            trace!("ignoring frame without op/d");
            return false;
        };
        let Some(op) = op.as_i64() else {
            trace!(%op, "ignoring frame with non-integer opcode");
            return false;
        };

        let Some(stub_reply) = self.core.dispatch(&op.to_string(), &payload.to_string()) else {
            debug!(op, "no stub for opcode");
            return false;
        };
        if !stub_reply.success {
            warn!(op, reason = %stub_reply.payload, "dropping rejected message");
            return false;
        }
        if stub_reply.message_type.is_no_outlet() {
            return true;
        }
        debug!(op, message_type = %stub_reply.message_type, "stub replied");
        node.broker().publish(stub_reply.message_type, &stub_reply.payload)
    }

    fn set_output_message_type(&self, message_type: MessageType) {
        self.core.set_output_message_type(message_type);
    }
}

impl Parser for ObsParser {
    fn parser_core(&self) -> &ParserCore {
        &self.core
    }
}
