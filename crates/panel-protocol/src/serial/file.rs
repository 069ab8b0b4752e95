//! File-transfer stubs.
//!
//! Uploads and downloads run in two phases. The handshake opens the file
//! and switches the stub's command key to the data token; data commands
//! then move base64 chunks until the counter runs out, at which point the
//! stub closes the file and returns to the handshake phase by itself.
//!
//! Both counters are kept in base64 characters. The upload handshake
//! declares the encoded length of the payload.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{command, parse_count, prefixed, reply, split_first};
use crate::codec;
use crate::storage::{FileHandle, OpenMode, Partition};
use crate::stub::{ParserStub, StubBase, StubReply};

/// Position of a stub within a two-step exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for the opening command.
    #[default]
    Handshake,
    /// Resource open, serving follow-up commands.
    Transfer,
}

fn as_signed(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// `AT+PUTFILE=<name>,<b64 length>` then `AT+PUTDATA=<b64 chunk>`.
pub struct PutFileStub {
    base: StubBase,
    partition: Arc<dyn Partition>,
    phase: Phase,
    file: Option<Box<dyn FileHandle>>,
    remaining: i64,
}

impl PutFileStub {
    /// A stub writing into `partition`.
    pub fn new(partition: Arc<dyn Partition>) -> Self {
        Self {
            base: StubBase::new(command::PUT_FILE),
            partition,
            phase: Phase::Handshake,
            file: None,
            remaining: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a file is held open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Base64 characters still expected.
    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    fn failure(&self) -> StubReply {
        StubReply::error(self.base.message_type(), reply::ERROR)
    }

    fn open(&mut self, data: &str) -> StubReply {
        let (name, length) = split_first(data, ',');
        let name = name.trim();
        let Some(length) = parse_count::<i64>(length.trim()) else {
            warn!(file = name, "upload length missing or not numeric");
            return self.failure();
        };
        match self.partition.open(name, OpenMode::Write) {
            Ok(file) => {
                self.file = Some(file);
                self.remaining = length;
                self.phase = Phase::Transfer;
                self.base.set_command(command::PUT_DATA);
                info!(file = name, length, "upload started");
                StubReply::ok(self.base.message_type(), reply::OK)
            }
            Err(e) => {
                warn!(file = name, error = %e, "cannot open file for upload");
                self.failure()
            }
        }
    }

    fn write_chunk(&mut self, data: &str) -> StubReply {
        if data.len() % 4 != 0 {
            debug!(len = data.len(), "chunk is not a whole number of base64 quanta");
            return self.failure();
        }
        let decoded = match codec::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "chunk is not valid base64");
                return self.failure();
            }
        };
        let Some(file) = self.file.as_mut() else {
            self.abort();
            return self.failure();
        };

        let written = file.write(&decoded);
        self.remaining -= as_signed(data.len());
        match written {
            Ok(count) if count == decoded.len() => {}
            Ok(count) => {
                warn!(expected = decoded.len(), written = count, "short write, aborting upload");
                self.abort();
                return self.failure();
            }
            Err(e) => {
                warn!(error = %e, "write failed, aborting upload");
                self.abort();
                return self.failure();
            }
        }

        if self.remaining <= 0 {
            info!("upload complete");
            self.abort();
        }
        StubReply::ok(self.base.message_type(), reply::OK)
    }
}

impl ParserStub for PutFileStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        match self.phase {
            Phase::Handshake => self.open(data),
            Phase::Transfer => self.write_chunk(data),
        }
    }

    fn abort(&mut self) {
        self.phase = Phase::Handshake;
        self.file = None;
        self.remaining = 0;
        self.base.set_command(command::PUT_FILE);
    }

    fn command_keys(&self) -> Vec<String> {
        vec![command::PUT_FILE.into(), command::PUT_DATA.into()]
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// `AT+GETFILE=<name>` then `AT+GETDATA=<b64 length>`.
pub struct GetFileStub {
    base: StubBase,
    partition: Arc<dyn Partition>,
    phase: Phase,
    file: Option<Box<dyn FileHandle>>,
    remaining: usize,
}

impl GetFileStub {
    /// A stub reading from `partition`.
    pub fn new(partition: Arc<dyn Partition>) -> Self {
        Self {
            base: StubBase::new(command::GET_FILE),
            partition,
            phase: Phase::Handshake,
            file: None,
            remaining: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a file is held open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Base64 characters still to be served.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn failure(&self) -> StubReply {
        StubReply::error(self.base.message_type(), reply::ERROR)
    }

    fn open(&mut self, data: &str) -> StubReply {
        let name = data.trim();
        let opened = self
            .partition
            .open(name, OpenMode::Read)
            .and_then(|file| file.size().map(|size| (file, size)));
        match opened {
            Ok((_, 0)) => {
                info!(file = name, "empty file, nothing to transfer");
                StubReply::ok(self.base.message_type(), prefixed(reply::SIZE, 0))
            }
            Ok((file, size)) => {
                let size = usize::try_from(size).unwrap_or(usize::MAX);
                self.file = Some(file);
                self.remaining = codec::encoded_len(size);
                self.phase = Phase::Transfer;
                self.base.set_command(command::GET_DATA);
                info!(file = name, size, encoded = self.remaining, "download started");
                StubReply::ok(
                    self.base.message_type(),
                    prefixed(reply::SIZE, self.remaining),
                )
            }
            Err(e) => {
                warn!(file = name, error = %e, "cannot open file for download");
                self.failure()
            }
        }
    }

    fn read_chunk(&mut self, data: &str) -> StubReply {
        let Some(requested) = parse_count::<usize>(data.trim()) else {
            debug!(request = data, "chunk size is not numeric");
            return self.failure();
        };
        let wanted = requested.min(self.remaining);
        if wanted % 4 != 0 {
            debug!(wanted, "chunk size is not a whole number of base64 quanta");
            return self.failure();
        }
        let Some(file) = self.file.as_mut() else {
            self.abort();
            return self.failure();
        };

        let chunk = match file.read(codec::raw_len(wanted)) {
            Ok(bytes) => codec::encode(&bytes),
            Err(e) => {
                warn!(error = %e, "read failed, aborting download");
                self.abort();
                return self.failure();
            }
        };
        self.remaining -= wanted;
        if chunk.len() != wanted {
            warn!(expected = wanted, read = chunk.len(), "short read, aborting download");
            self.abort();
            return self.failure();
        }

        if self.remaining == 0 {
            info!("download complete");
            self.abort();
        }
        StubReply::ok(self.base.message_type(), prefixed(reply::DATA, chunk))
    }
}

impl ParserStub for GetFileStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        match self.phase {
            Phase::Handshake => self.open(data),
            Phase::Transfer => self.read_chunk(data),
        }
    }

    fn abort(&mut self) {
        self.phase = Phase::Handshake;
        self.file = None;
        self.remaining = 0;
        self.base.set_command(command::GET_FILE);
    }

    fn command_keys(&self) -> Vec<String> {
        vec![command::GET_FILE.into(), command::GET_DATA.into()]
    }
}

// ---------------------------------------------------------------------------
// Single-shot file commands
// ---------------------------------------------------------------------------

/// `AT+DELETE=<path>`.
pub struct DeleteFileStub {
    base: StubBase,
    partition: Arc<dyn Partition>,
}

impl DeleteFileStub {
    /// A stub removing entries of `partition`.
    pub fn new(partition: Arc<dyn Partition>) -> Self {
        Self {
            base: StubBase::new(command::DELETE),
            partition,
        }
    }
}

impl ParserStub for DeleteFileStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let path = data.trim();
        match self.partition.remove(path) {
            Ok(()) => StubReply::ok(self.base.message_type(), reply::OK),
            Err(e) => {
                warn!(path, error = %e, "cannot remove");
                StubReply::error(self.base.message_type(), reply::ERROR)
            }
        }
    }
}

/// `AT+MAKEDIR=<path>`.
pub struct MakeDirStub {
    base: StubBase,
    partition: Arc<dyn Partition>,
}

impl MakeDirStub {
    /// A stub creating directories in `partition`.
    pub fn new(partition: Arc<dyn Partition>) -> Self {
        Self {
            base: StubBase::new(command::MAKE_DIR),
            partition,
        }
    }
}

impl ParserStub for MakeDirStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        let path = data.trim();
        match self.partition.make_dir(path) {
            Ok(()) => StubReply::ok(self.base.message_type(), reply::OK),
            Err(e) => {
                warn!(path, error = %e, "cannot create directory");
                StubReply::error(self.base.message_type(), reply::ERROR)
            }
        }
    }
}
