//! Device information stubs.

use super::{command, prefixed, reply};
use crate::stub::{ParserStub, StubBase, StubReply};

/// `AT+GETBUFS`, replying `BUFS=<size>`.
pub struct BufferSizeStub {
    base: StubBase,
    size: usize,
}

impl BufferSizeStub {
    /// Reports `size` as the UART buffer size.
    pub fn new(size: usize) -> Self {
        Self {
            base: StubBase::new(command::GET_BUFFER_SIZE),
            size,
        }
    }
}

impl ParserStub for BufferSizeStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, _data: &str) -> StubReply {
        StubReply::ok(self.base.message_type(), prefixed(reply::BUFFER_SIZE, self.size))
    }
}

/// `AT+GETFWVER`, replying `FWVER=<version>`.
pub struct FirmwareVersionStub {
    base: StubBase,
    version: String,
}

impl FirmwareVersionStub {
    /// Reports `version` as the firmware version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            base: StubBase::new(command::GET_FIRMWARE_VERSION),
            version: version.into(),
        }
    }
}

impl ParserStub for FirmwareVersionStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, _data: &str) -> StubReply {
        StubReply::ok(
            self.base.message_type(),
            prefixed(reply::FIRMWARE_VERSION, &self.version),
        )
    }
}
