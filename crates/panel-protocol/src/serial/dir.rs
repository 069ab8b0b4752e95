//! Directory listing, one entry per `AT+NEXTFILE`.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{command, prefixed, reply, Phase};
use crate::storage::{DirHandle, Partition};
use crate::stub::{ParserStub, StubBase, StubReply};

/// `AT+LISTDIR=<path>` then one `AT+NEXTFILE` per entry.
///
/// The handshake replies `NUMFILES=<n>`; each follow-up replies
/// `FILE=<name>,<kind code>`. The directory is closed after the last entry
/// has been served. An empty directory is never held open.
pub struct ListDirStub {
    base: StubBase,
    partition: Arc<dyn Partition>,
    phase: Phase,
    dir: Option<Box<dyn DirHandle>>,
    remaining: usize,
}

impl ListDirStub {
    /// A stub listing directories of `partition`.
    pub fn new(partition: Arc<dyn Partition>) -> Self {
        Self {
            base: StubBase::new(command::LIST_DIR),
            partition,
            phase: Phase::Handshake,
            dir: None,
            remaining: 0,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Entries not yet served.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    fn open(&mut self, data: &str) -> StubReply {
        let path = data.trim();
        let dir = match self.partition.open_dir(path) {
            Ok(dir) => dir,
            Err(e) => {
                warn!(path, error = %e, "cannot open directory");
                return StubReply::error(self.base.message_type(), reply::ERROR);
            }
        };
        let count = dir.num_files();
        debug!(path, count, "listing directory");
        if count > 0 {
            self.dir = Some(dir);
            self.remaining = count;
            self.phase = Phase::Transfer;
            self.base.set_command(command::NEXT_FILE);
        }
        StubReply::ok(self.base.message_type(), prefixed(reply::NUM_FILES, count))
    }

    fn next(&mut self) -> StubReply {
        let Some(entry) = self.dir.as_mut().and_then(|dir| dir.next_entry()) else {
            warn!(remaining = self.remaining, "directory exhausted early");
            self.abort();
            return StubReply::error(self.base.message_type(), reply::ERROR);
        };
        self.remaining -= 1;
        if self.remaining == 0 {
            self.abort();
        }
        StubReply::ok(
            self.base.message_type(),
            prefixed(reply::FILE, format!("{},{}", entry.name, entry.kind.code())),
        )
    }
}

impl ParserStub for ListDirStub {
    fn base(&self) -> &StubBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StubBase {
        &mut self.base
    }

    fn parse(&mut self, data: &str) -> StubReply {
        match self.phase {
            Phase::Handshake => self.open(data),
            Phase::Transfer => self.next(),
        }
    }

    fn abort(&mut self) {
        self.phase = Phase::Handshake;
        self.dir = None;
        self.remaining = 0;
        self.base.set_command(command::LIST_DIR);
    }

    fn command_keys(&self) -> Vec<String> {
        vec![command::LIST_DIR.into(), command::NEXT_FILE.into()]
    }
}
