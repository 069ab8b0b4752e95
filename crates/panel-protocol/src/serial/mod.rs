//! Serial AT-command protocol.
//!
//! One command per line, `AT+<CMD>` or `AT+<CMD>=<args>`; one reply per
//! command, terminated by [`TERMINATION`]. `AT+ABORT` is handled by the
//! parser itself and resets every stub.

use std::sync::Arc;

use panel_bus::{attach, Broker, MessageType, Node, NodeCore};
use tracing::{debug, info};

use crate::parser::{Parser, ParserCore};

mod config;
mod device;
mod dir;
mod file;

pub use config::{DelConfigStub, GetConfigStub, SetConfigStub};
pub use device::{BufferSizeStub, FirmwareVersionStub};
pub use dir::ListDirStub;
pub use file::{DeleteFileStub, GetFileStub, MakeDirStub, Phase, PutFileStub};

/// Reply terminator.
pub const TERMINATION: &str = "\r";

/// AT command tokens.
pub mod command {
    /// Query the UART buffer size.
    pub const GET_BUFFER_SIZE: &str = "AT+GETBUFS";
    /// Query the firmware version.
    pub const GET_FIRMWARE_VERSION: &str = "AT+GETFWVER";
    /// Reset every stub.
    pub const ABORT: &str = "AT+ABORT";
    /// Open a file for upload.
    pub const PUT_FILE: &str = "AT+PUTFILE";
    /// Upload a base64 chunk.
    pub const PUT_DATA: &str = "AT+PUTDATA";
    /// Open a file for download.
    pub const GET_FILE: &str = "AT+GETFILE";
    /// Download a base64 chunk.
    pub const GET_DATA: &str = "AT+GETDATA";
    /// Open a directory listing.
    pub const LIST_DIR: &str = "AT+LISTDIR";
    /// Next listing entry.
    pub const NEXT_FILE: &str = "AT+NEXTFILE";
    /// Create a directory.
    pub const MAKE_DIR: &str = "AT+MAKEDIR";
    /// Remove a file or empty directory.
    pub const DELETE: &str = "AT+DELETE";
    /// Store a configuration value.
    pub const SET_CONF: &str = "AT+SETCONF";
    /// Read a configuration value.
    pub const GET_CONF: &str = "AT+GETCONF";
    /// Erase a configuration value.
    pub const DEL_CONF: &str = "AT+DELCONF";
}

/// Replies and reply prefixes.
pub mod reply {
    /// Command accepted.
    pub const OK: &str = "OK\r";
    /// Command failed.
    pub const ERROR: &str = "ERROR\r";
    /// No stub answers to the command.
    pub const UNKNOWN: &str = "UNKN\r";
    /// Base64 size of a file opened for download.
    pub const SIZE: &str = "SIZE";
    /// Base64 chunk of a download.
    pub const DATA: &str = "DATA";
    /// Entry count of a listing.
    pub const NUM_FILES: &str = "NUMFILES";
    /// Listing entry.
    pub const FILE: &str = "FILE";
    /// Configuration value.
    pub const VALUE: &str = "VALUE";
    /// UART buffer size.
    pub const BUFFER_SIZE: &str = "BUFS";
    /// Firmware version.
    pub const FIRMWARE_VERSION: &str = "FWVER";
}

/// `PREFIX=value\r`.
pub fn prefixed(prefix: &str, value: impl std::fmt::Display) -> String {
    format!("{prefix}={value}{TERMINATION}")
}

/// Split at the first `delimiter`; both halves are empty when it is absent.
pub(crate) fn split_first(data: &str, delimiter: char) -> (&str, &str) {
    data.split_once(delimiter).unwrap_or(("", ""))
}

/// A non-empty run of ASCII digits.
pub(crate) fn parse_count<T: std::str::FromStr>(data: &str) -> Option<T> {
    if data.is_empty() || !data.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    data.parse().ok()
}

/// Parser for the serial AT-command link.
///
/// Accepts [`MessageType::INBOUND_WIRED`] and replies on
/// [`MessageType::OUTBOUND_WIRED`] by default.
#[derive(Debug)]
pub struct SerialParser {
    core: ParserCore,
}

impl SerialParser {
    /// Create the parser and subscribe it to `broker`.
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        let parser = Arc::new(Self {
            core: ParserCore::new(
                broker,
                MessageType::INBOUND_WIRED,
                MessageType::OUTBOUND_WIRED,
            ),
        });
        attach(&parser);
        parser
    }
}

impl Node for SerialParser {
    fn core(&self) -> &NodeCore {
        self.core.node()
    }

    fn publish_callback(&self, message_type: MessageType, data: &str) -> bool {
        let node = self.core.node();
        if !node.accepts(message_type) {
            debug!(%message_type, expected = %node.input_message_type(), "message rejected");
            return false;
        }

        let (token, content) = data.split_once('=').unwrap_or((data, ""));
        if token == command::ABORT {
            info!("abort requested, resetting stubs");
            self.core.abort_stubs();
            node.publish(reply::OK);
            return true;
        }

        match self.core.dispatch(token, content) {
            Some(stub_reply) => {
                debug!(command = %token, success = stub_reply.success, "stub replied");
                let published = node
                    .broker()
                    .publish(stub_reply.message_type, &stub_reply.payload);
                stub_reply.success && published
            }
            None => {
                debug!(command = %token, "no stub for command");
                node.publish(reply::UNKNOWN);
                false
            }
        }
    }

    fn set_output_message_type(&self, message_type: MessageType) {
        self.core.set_output_message_type(message_type);
    }
}

impl Parser for SerialParser {
    fn parser_core(&self) -> &ParserCore {
        &self.core
    }
}
