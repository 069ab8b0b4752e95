//! Error types for the `panel-protocol` crate.
//!
//! None of these cross the broker: stubs turn them into failure replies
//! (`ERROR` on the serial link, a dropped message on the obs-websocket side)
//! and log the underlying cause.

use crate::kv::ItemType;

/// Failures reported by the storage collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A path was empty or tried to leave the partition root.
    #[error("invalid path \"{path}\": {reason}")]
    InvalidPath {
        /// The path as received.
        path: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A namespace or key name was rejected.
    #[error("invalid key name \"{name}\": {reason}")]
    InvalidKey {
        /// The rejected name.
        name: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// The key already holds a value of another type.
    #[error("key \"{namespace}/{key}\" holds a {stored} value, cannot store {requested}")]
    TypeConflict {
        /// Namespace of the key.
        namespace: String,
        /// Key name.
        key: String,
        /// Type currently pinned on the key.
        stored: ItemType,
        /// Type of the rejected write.
        requested: ItemType,
    },

    /// The type code does not name a storable item type.
    #[error("unsupported item type code {0}")]
    UnsupportedType(u32),

    /// The textual value does not fit the requested type.
    #[error("cannot store \"{value}\" as {item_type}")]
    InvalidValue {
        /// The value as received.
        value: String,
        /// Requested type.
        item_type: ItemType,
    },

    /// Nothing is stored under the key.
    #[error("no value stored under \"{namespace}/{key}\"")]
    MissingKey {
        /// Namespace of the key.
        namespace: String,
        /// Key name.
        key: String,
    },

    /// Persisted store could not be read or written as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed obs-websocket traffic.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// A required field is absent or has the wrong JSON type.
    #[error("missing required field: {field}")]
    MissingField {
        /// Name of the field.
        field: String,
    },

    /// The peer speaks another RPC version.
    #[error("RPC version mismatch: expected {expected}, got {received}")]
    RpcVersionMismatch {
        /// Version this implementation speaks.
        expected: u8,
        /// Version found in the message.
        received: String,
    },
}

impl ProtocolError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }
}

/// Stub registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParserError {
    /// Another live stub already answers to this command key.
    #[error("command \"{command}\" is already handled by a registered stub")]
    CommandConflict {
        /// The contested command key.
        command: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_type_conflict() {
        let err = StorageError::TypeConflict {
            namespace: "websocket".into(),
            key: "port".into(),
            stored: ItemType::U16,
            requested: ItemType::Str,
        };
        assert_eq!(
            err.to_string(),
            "key \"websocket/port\" holds a U16 value, cannot store Str"
        );
    }

    #[test]
    fn error_display_missing_field() {
        assert_eq!(
            ProtocolError::missing("rpcVersion").to_string(),
            "missing required field: rpcVersion"
        );
    }

    #[test]
    fn error_display_command_conflict() {
        let err = ParserError::CommandConflict {
            command: "AT+PUTDATA".into(),
        };
        assert_eq!(
            err.to_string(),
            "command \"AT+PUTDATA\" is already handled by a registered stub"
        );
    }
}
