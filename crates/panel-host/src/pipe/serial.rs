//! Serial link on a byte stream, stdin/stdout on the host.

use std::io::{self, BufReader, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use panel_bus::{attach, Broker, MessageType, Node, NodeCore};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

/// Line-oriented serial link.
///
/// Incoming bytes are framed on `\r` or `\n` and published as
/// [`MessageType::INBOUND_WIRED`]; replies tagged
/// [`MessageType::OUTBOUND_WIRED`] are written out verbatim.
pub struct SerialPipe {
    core: NodeCore,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl SerialPipe {
    /// Create the pipe and subscribe it to `broker`.
    pub fn new(broker: Arc<Broker>, writer: impl Write + Send + 'static) -> Arc<Self> {
        let pipe = Arc::new(Self {
            core: NodeCore::new(broker, MessageType::OUTBOUND_WIRED, MessageType::INBOUND_WIRED),
            writer: Mutex::new(Box::new(writer)),
        });
        attach(&pipe);
        pipe
    }

    /// Read lines from `reader` on a dedicated thread.
    ///
    /// The returned receiver resolves once the input ends, fails, or the
    /// pipe is stopped and another byte arrives.
    pub fn spawn_reader<R: Read + Send + 'static>(
        self: &Arc<Self>,
        reader: R,
    ) -> io::Result<oneshot::Receiver<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        let pipe = Arc::clone(self);
        thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || {
                pipe.read_lines(reader);
                let _ = done_tx.send(());
            })?;
        Ok(done_rx)
    }

    fn read_lines<R: Read>(&self, reader: R) {
        let mut line = Vec::new();
        for byte in BufReader::new(reader).bytes() {
            if !self.core.is_running() {
                break;
            }
            match byte {
                Ok(b'\r' | b'\n') => {
                    if !line.is_empty() {
                        self.publish_line(&line);
                        line.clear();
                    }
                }
                Ok(b) => line.push(b),
                Err(e) => {
                    warn!(error = %e, "serial read failed");
                    return;
                }
            }
        }
        if !line.is_empty() && self.core.is_running() {
            self.publish_line(&line);
        }
        info!("serial input closed");
    }

    fn publish_line(&self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        trace!(line = %text, "serial line");
        if !self.core.publish(&text) {
            debug!(line = %text, "serial line not consumed");
        }
    }
}

impl Node for SerialPipe {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn publish_callback(&self, message_type: MessageType, payload: &str) -> bool {
        if !self.core.accepts(message_type) {
            return false;
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match writer
            .write_all(payload.as_bytes())
            .and_then(|()| writer.flush())
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "serial write failed");
                false
            }
        }
    }
}
