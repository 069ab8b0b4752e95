//! Opcode stubs of the obs-websocket parser.

use panel_bus::MessageType;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{authenticate, parse_object, require_fields, Opcode, EVENT_SUBSCRIPTIONS_ALL, RPC_VERSION};
use crate::error::ProtocolError;
use crate::stub::{ParserStub, StubBase, StubReply};

fn check_rpc_version(object: &Map<String, Value>, field: &str) -> Result<(), ProtocolError> {
    let value = object.get(field).ok_or_else(|| ProtocolError::missing(field))?;
    if value.as_u64() == Some(u64::from(RPC_VERSION)) {
        Ok(())
    } else {
        Err(ProtocolError::RpcVersionMismatch {
            expected: RPC_VERSION,
            received: value.to_string(),
        })
    }
}

fn into_reply(message_type: MessageType, result: Result<String, ProtocolError>) -> StubReply {
    match result {
        Ok(payload) => StubReply::ok(message_type, payload),
        Err(e) => StubReply::error(message_type, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// Answers Hello (op 0) with Identify (op 1), authenticating with the
/// pre-shared password when the server asks for it.
pub struct HelloStub {
    base: StubBase,
    password: String,
}

impl HelloStub {
    /// A stub authenticating with `password`.
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            base: StubBase::new(Opcode::Hello.key()),
            password: password.into(),
        }
    }

    fn identify(&self, data: &str) -> Result<String, ProtocolError> {
        let hello = parse_object(data)?;
        check_rpc_version(&hello, "rpcVersion")?;

        let mut identify = json!({
            "rpcVersion": RPC_VERSION,
            "eventSubscriptions": EVENT_SUBSCRIPTIONS_ALL,
        });
        if let Some(auth) = hello.get("authentication") {
            let field = |name: &str| {
                auth.get(name)
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::missing(&format!("authentication.{name}")))
            };
            let challenge = field("challenge")?;
            let salt = field("salt")?;
            debug!("server requires authentication");
            identify["authentication"] = Value::String(authenticate(&self.password, salt, challenge));
        }

        Ok(json!({ "op": Opcode::Identify.code(), "d": identify }).to_string())
    }
}

impl ParserStub for HelloStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        into_reply(self.base.message_type(), self.identify(data))
    }
}

/// Checks the Identified (op 2) confirmation. Nothing is sent back.
pub struct IdentifiedStub {
    base: StubBase,
}

impl IdentifiedStub {
    /// A new stub.
    pub fn new() -> Self {
        Self {
            base: StubBase::new(Opcode::Identified.key()),
        }
    }
}

impl Default for IdentifiedStub {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserStub for IdentifiedStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let checked = parse_object(data).and_then(|object| check_rpc_version(&object, "negotiatedRpcVersion"));
        match checked {
            Ok(()) => {
                debug!("session identified");
                StubReply::silent()
            }
            Err(e) => StubReply::error(self.base.message_type(), e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Server traffic forwarded to the reply parser
// ---------------------------------------------------------------------------

macro_rules! forwarding_stub {
    ($(#[$doc:meta])* $name:ident, $opcode:expr, [$($field:literal),+ $(,)?]) => {
        $(#[$doc])*
        ///
        /// Replies carry the validated payload unchanged, tagged
        /// [`MessageType::EVENT`] whatever the parser's output type.
        pub struct $name {
            base: StubBase,
        }

        impl $name {
            /// A new stub.
            pub fn new() -> Self {
                Self {
                    base: StubBase::new($opcode.key()),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ParserStub for $name {
            fn base(&self) -> &StubBase {
                &self.base
            }

            fn base_mut(&mut self) -> &mut StubBase {
                &mut self.base
            }

            fn parse(&mut self, data: &str) -> StubReply {
                let checked = parse_object(data)
                    .and_then(|object| require_fields(&object, &[$($field),+]))
                    .map(|()| data.to_string());
                into_reply(MessageType::EVENT, checked)
            }
        }
    };
}

forwarding_stub!(
    /// Validates Event (op 5) payloads.
    EventStub,
    Opcode::Event,
    ["eventType", "eventIntent", "eventData"]
);

forwarding_stub!(
    /// Validates RequestResponse (op 7) payloads.
    RequestResponseStub,
    Opcode::RequestResponse,
    ["requestType", "requestId", "responseData", "requestStatus"]
);

forwarding_stub!(
    /// Validates RequestBatchResponse (op 9) payloads.
    RequestBatchResponseStub,
    Opcode::RequestBatchResponse,
    ["requestId", "results"]
);
