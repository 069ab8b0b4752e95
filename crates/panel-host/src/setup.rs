//! Startup wiring: parsers, their stubs, and who owns what.
//!
//! Parsers only keep weak references to their stubs, so the handles
//! returned here must outlive the session.

use std::sync::{Arc, PoisonError};

use anyhow::Context;
use panel_bus::{Broker, Node};
use panel_protocol::obs::{
    EventStub, HelloStub, IdentifiedStub, RequestBatchResponseStub, RequestResponseStub,
};
use panel_protocol::serial::{
    BufferSizeStub, DelConfigStub, DeleteFileStub, FirmwareVersionStub, GetConfigStub,
    GetFileStub, ListDirStub, MakeDirStub, PutFileStub, SetConfigStub,
};
use panel_protocol::stub::shared;
use panel_protocol::{
    KeyValueStore, ObsParser, ObsReplyParser, Parser, ParserStub, Partition, SerialParser,
    SharedStub,
};
use tracing::info;

use crate::config::HostConfig;

fn own<P: Parser, S: ParserStub + 'static>(
    parser: &P,
    stubs: &mut Vec<SharedStub>,
    stub: S,
) -> anyhow::Result<()> {
    let stub = shared(stub);
    parser.register(&stub).context("stub registration refused")?;
    stubs.push(stub);
    Ok(())
}

fn abort_all(stubs: &[SharedStub]) {
    for stub in stubs {
        stub.lock().unwrap_or_else(PoisonError::into_inner).abort();
    }
}

/// The serial parser and the stubs it serves.
pub struct SerialHandles {
    /// Parser on the wired channel.
    pub parser: Arc<SerialParser>,
    stubs: Vec<SharedStub>,
}

impl SerialHandles {
    /// Abort in-flight transfers and detach the parser.
    pub fn shutdown(&self) {
        abort_all(&self.stubs);
        self.parser.stop();
    }
}

/// Build the serial parser with the full AT-command set.
pub fn setup_serial(
    broker: &Arc<Broker>,
    partition: &Arc<dyn Partition>,
    store: &Arc<dyn KeyValueStore>,
    config: &HostConfig,
) -> anyhow::Result<SerialHandles> {
    let parser = SerialParser::new(Arc::clone(broker));
    let mut stubs = Vec::new();

    own(&*parser, &mut stubs, BufferSizeStub::new(config.uart_buffer_size))?;
    own(&*parser, &mut stubs, FirmwareVersionStub::new(config.firmware_version.clone()))?;
    own(&*parser, &mut stubs, PutFileStub::new(Arc::clone(partition)))?;
    own(&*parser, &mut stubs, GetFileStub::new(Arc::clone(partition)))?;
    own(&*parser, &mut stubs, ListDirStub::new(Arc::clone(partition)))?;
    own(&*parser, &mut stubs, DeleteFileStub::new(Arc::clone(partition)))?;
    own(&*parser, &mut stubs, MakeDirStub::new(Arc::clone(partition)))?;
    own(&*parser, &mut stubs, SetConfigStub::new(Arc::clone(store)))?;
    own(&*parser, &mut stubs, GetConfigStub::new(Arc::clone(store)))?;
    own(&*parser, &mut stubs, DelConfigStub::new(Arc::clone(store)))?;

    info!(stubs = stubs.len(), "serial parser ready");
    Ok(SerialHandles { parser, stubs })
}

/// The obs-websocket parsers and their stubs.
pub struct ObsHandles {
    /// Parser on the wireless channel.
    pub parser: Arc<ObsParser>,
    /// Second-stage parser routing request replies.
    pub replies: Arc<ObsReplyParser>,
    stubs: Vec<SharedStub>,
}

impl ObsHandles {
    /// Reset the stubs and detach both parsers.
    pub fn shutdown(&self) {
        abort_all(&self.stubs);
        self.parser.stop();
        self.replies.stop();
    }
}

/// Build the obs-websocket parser, authenticating with `password`.
pub fn setup_websocket(broker: &Arc<Broker>, password: &str) -> anyhow::Result<ObsHandles> {
    let parser = ObsParser::new(Arc::clone(broker));
    let replies = ObsReplyParser::new(Arc::clone(broker));
    let mut stubs = Vec::new();

    own(&*parser, &mut stubs, HelloStub::new(password))?;
    own(&*parser, &mut stubs, IdentifiedStub::new())?;
    own(&*parser, &mut stubs, EventStub::new())?;
    own(&*parser, &mut stubs, RequestResponseStub::new())?;
    own(&*parser, &mut stubs, RequestBatchResponseStub::new())?;

    info!(stubs = stubs.len(), "obs-websocket parser ready");
    Ok(ObsHandles {
        parser,
        replies,
        stubs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_bus::MessageType;
    use panel_protocol::{FsPartition, MemoryStore};
    use std::sync::Mutex;

    fn sink(broker: &Arc<Broker>, mask: MessageType) -> Arc<Mutex<Vec<String>>> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&sent);
        broker.subscribe(move |message_type, payload| {
            if !message_type.intersects(mask) {
                return false;
            }
            seen.lock().unwrap().push(payload.to_string());
            true
        });
        sent
    }

    fn config() -> HostConfig {
        HostConfig {
            storage_dir: "unused".into(),
            nvs_file: "unused.json".into(),
            uart_buffer_size: 512,
            firmware_version: "0.9.1".into(),
        }
    }

    // -- serial -------------------------------------------------------------

    #[test]
    fn serial_setup_registers_every_command() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let partition: Arc<dyn Partition> = Arc::new(FsPartition::new(dir.path()));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let handles = setup_serial(&broker, &partition, &store, &config()).unwrap();
        let sent = sink(&broker, MessageType::OUTBOUND_WIRED);

        assert_eq!(handles.parser.parser_core().registered_stubs(), 10);
        assert!(broker.publish(MessageType::INBOUND_WIRED, "AT+GETBUFS"));
        assert!(broker.publish(MessageType::INBOUND_WIRED, "AT+GETFWVER"));
        assert!(broker.publish(MessageType::INBOUND_WIRED, "AT+SETCONF=websocket,port,2,4460"));
        assert!(broker.publish(MessageType::INBOUND_WIRED, "AT+GETCONF=websocket,port"));
        assert_eq!(
            *sent.lock().unwrap(),
            vec!["BUFS=512\r", "FWVER=0.9.1\r", "OK\r", "VALUE=2,4460\r"]
        );
    }

    #[test]
    fn shutdown_detaches_the_serial_parser() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(Broker::new());
        let partition: Arc<dyn Partition> = Arc::new(FsPartition::new(dir.path()));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let handles = setup_serial(&broker, &partition, &store, &config()).unwrap();
        let sent = sink(&broker, MessageType::OUTBOUND_WIRED);

        assert!(broker.publish(MessageType::INBOUND_WIRED, "AT+PUTFILE=a.txt,8"));
        handles.shutdown();
        assert!(!broker.publish(MessageType::INBOUND_WIRED, "AT+PUTDATA=aGVsbG8h"));
        assert_eq!(*sent.lock().unwrap(), vec!["OK\r"]);
    }

    // -- obs-websocket ------------------------------------------------------

    #[test]
    fn websocket_setup_answers_hello() {
        let broker = Arc::new(Broker::new());
        let handles = setup_websocket(&broker, "p").unwrap();
        let sent = sink(&broker, MessageType::OUTBOUND_WIRELESS);

        assert_eq!(handles.parser.parser_core().registered_stubs(), 5);
        let hello = r#"{"op":0,"d":{"rpcVersion":1,"authentication":{"challenge":"c","salt":"s"}}}"#;
        assert!(broker.publish(MessageType::INBOUND_WIRELESS, hello));

        let sent = sent.lock().unwrap();
        let identify: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(identify["op"], 1);
        assert_eq!(
            identify["d"]["authentication"],
            "LEfh2WVBWpa8M06P7MehLXlToA1PtH2lNSNPjUZVYls="
        );
    }

    #[test]
    fn shutdown_detaches_both_obs_parsers() {
        let broker = Arc::new(Broker::new());
        let handles = setup_websocket(&broker, "").unwrap();
        handles.shutdown();

        assert!(!broker.publish(MessageType::INBOUND_WIRELESS, r#"{"op":0,"d":{"rpcVersion":1}}"#));
        assert!(!broker.publish(MessageType::EVENT, r#"{"requestId":"a","results":[]}"#));
    }
}
