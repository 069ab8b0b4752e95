//! Routing of request replies back to their originator.
//!
//! Requests sent to the server carry a fresh `requestId` (see
//! [`tag_request`](super::tag_request)). Whoever waits for the answer
//! registers a stub keyed by that id with the [`ObsReplyParser`]; replies
//! nobody waits for are dropped quietly.

use std::sync::Arc;

use panel_bus::{attach, Broker, MessageType, Node, NodeCore};
use serde_json::Value;
use tracing::{debug, trace, warn};

use super::parse_object;
use crate::error::ProtocolError;
use crate::parser::{Parser, ParserCore};
use crate::stub::{ParserStub, StubBase, StubReply};

/// Second-stage parser for re-tagged request replies.
///
/// Accepts [`MessageType::EVENT`]; stub replies go out on
/// [`MessageType::OUTBOUND_ANY`] by default.
#[derive(Debug)]
pub struct ObsReplyParser {
    core: ParserCore,
}

impl ObsReplyParser {
    /// Create the parser and subscribe it to `broker`.
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        let parser = Arc::new(Self {
            core: ParserCore::new(broker, MessageType::EVENT, MessageType::OUTBOUND_ANY),
        });
        attach(&parser);
        parser
    }
}

impl Node for ObsReplyParser {
    fn core(&self) -> &NodeCore {
        self.core.node()
    }

    fn publish_callback(&self, message_type: MessageType, data: &str) -> bool {
        let node = self.core.node();
        if !node.accepts(message_type) {
            return false;
        }
        let Ok(object) = parse_object(data) else {
            return false;
        };
        let Some(request_id) = object.get("requestId").and_then(Value::as_str) else {
            trace!("event without request id");
            return false;
        };
        if !object.contains_key("requestType") && !object.contains_key("results") {
            trace!(request_id, "not a request reply");
            return false;
        }

        let Some(stub_reply) = self.core.dispatch(request_id, data) else {
            trace!(request_id, "nobody waits for this reply");
            return true;
        };
        if !stub_reply.success {
            warn!(request_id, reason = %stub_reply.payload, "dropping rejected reply");
            return false;
        }
        if stub_reply.message_type.is_no_outlet() {
            return true;
        }
        debug!(request_id, message_type = %stub_reply.message_type, "forwarding reply");
        node.broker()
            .publish(stub_reply.message_type, &stub_reply.payload)
    }

    fn set_output_message_type(&self, message_type: MessageType) {
        self.core.set_output_message_type(message_type);
    }
}

impl Parser for ObsReplyParser {
    fn parser_core(&self) -> &ParserCore {
        &self.core
    }
}

/// Waits for the reply to one request.
///
/// On the matching reply it publishes the `responseData` object of a single
/// request, or the `results` array of a batch, then stops answering to its
/// request id.
pub struct CorrelatedReplyStub {
    base: StubBase,
    completed: bool,
}

impl CorrelatedReplyStub {
    /// A stub for the request tagged `request_id`.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            base: StubBase::new(request_id),
            completed: false,
        }
    }

    /// The awaited request id.
    pub fn request_id(&self) -> &str {
        self.base.command()
    }

    /// True once the reply has been handled.
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    fn extract(data: &str) -> Result<String, ProtocolError> {
        let object = parse_object(data)?;
        object
            .get("responseData")
            .or_else(|| object.get("results"))
            .map(Value::to_string)
            .ok_or_else(|| ProtocolError::missing("responseData"))
    }
}

impl ParserStub for CorrelatedReplyStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        match Self::extract(data) {
            Ok(payload) => {
                self.completed = true;
                StubReply::ok(self.base.message_type(), payload)
            }
            Err(e) => StubReply::error(self.base.message_type(), e.to_string()),
        }
    }

    fn can_handle_command(&self, command: &str) -> bool {
        !self.completed && self.base.command() == command
    }
}
