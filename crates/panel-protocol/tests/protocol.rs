//! End-to-end behaviour of the parsers on a shared broker.

use std::sync::{Arc, Mutex};

use panel_bus::{Broker, MessageType, Node};
use panel_protocol::obs::{
    CorrelatedReplyStub, HelloStub, IdentifiedStub, ObsParser, ObsReplyParser, RequestResponseStub,
};
use panel_protocol::serial::{
    GetConfigStub, GetFileStub, Phase, PutFileStub, SerialParser, SetConfigStub,
};
use panel_protocol::stub::shared;
use panel_protocol::{
    codec, FsPartition, KeyValueStore, MemoryStore, Parser, ParserError, ParserStub, Partition,
};
use serde_json::{json, Value};

type Sent = Arc<Mutex<Vec<(MessageType, String)>>>;

/// Subscriber standing in for a transport: takes everything matching `mask`.
fn sink(broker: &Broker, mask: MessageType) -> Sent {
    let sent: Sent = Arc::default();
    let log = Arc::clone(&sent);
    broker.subscribe(move |message_type, payload| {
        if !message_type.intersects(mask) {
            return false;
        }
        log.lock().unwrap().push((message_type, payload.to_string()));
        true
    });
    sent
}

fn last(sent: &Sent) -> String {
    sent.lock().unwrap().last().map(|(_, p)| p.clone()).unwrap_or_default()
}

struct Serial {
    broker: Arc<Broker>,
    parser: Arc<SerialParser>,
    sent: Sent,
    dir: tempfile::TempDir,
    partition: Arc<dyn Partition>,
}

impl Serial {
    fn new() -> Self {
        let broker = Arc::new(Broker::new());
        let parser = SerialParser::new(Arc::clone(&broker));
        let sent = sink(&broker, MessageType::OUTBOUND_WIRED);
        let dir = tempfile::tempdir().unwrap();
        let partition: Arc<dyn Partition> = Arc::new(FsPartition::new(dir.path()));
        Self {
            broker,
            parser,
            sent,
            dir,
            partition,
        }
    }

    fn send(&self, line: &str) -> bool {
        self.broker.publish(MessageType::INBOUND_WIRED, line)
    }

    fn reply(&self, line: &str) -> String {
        self.send(line);
        last(&self.sent)
    }
}

// -- serial: file transfer --------------------------------------------------

#[test]
fn upload_completes_and_resets_the_stub() {
    let serial = Serial::new();
    let put = shared(PutFileStub::new(Arc::clone(&serial.partition)));
    serial.parser.register(&put).unwrap();

    assert_eq!(serial.reply("AT+PUTFILE=foo.bin,6"), "OK\r");
    assert_eq!(serial.reply("AT+PUTDATA=aGVs"), "OK\r");
    assert_eq!(serial.reply("AT+PUTDATA=bG8h"), "OK\r");

    let stub = put.lock().unwrap();
    assert_eq!(stub.phase(), Phase::Handshake);
    assert!(!stub.is_open());
    assert_eq!(stub.command(), "AT+PUTFILE");
    assert_eq!(std::fs::read(serial.dir.path().join("foo.bin")).unwrap(), b"hello!");
}

#[test]
fn download_reconstructs_the_file_and_closes_it() {
    let serial = Serial::new();
    let get = shared(GetFileStub::new(Arc::clone(&serial.partition)));
    serial.parser.register(&get).unwrap();

    let content: Vec<u8> = (0..100u8).map(|b| b.wrapping_mul(37)).collect();
    std::fs::write(serial.dir.path().join("blob.bin"), &content).unwrap();

    assert_eq!(serial.reply("AT+GETFILE=blob.bin"), "SIZE=136\r");
    let mut received = Vec::new();
    let mut requested = 0;
    while requested < 136 {
        let reply = serial.reply("AT+GETDATA=32");
        let chunk = reply
            .strip_prefix("DATA=")
            .and_then(|r| r.strip_suffix('\r'))
            .unwrap();
        received.extend(codec::decode(chunk).unwrap());
        requested += 32;
    }

    assert_eq!(received, content);
    assert_eq!(get.lock().unwrap().phase(), Phase::Handshake);
    assert!(!get.lock().unwrap().is_open());
    assert_eq!(serial.reply("AT+GETDATA=4"), "UNKN\r");
}

#[test]
fn abort_mid_upload_releases_the_file() {
    let serial = Serial::new();
    let put = shared(PutFileStub::new(Arc::clone(&serial.partition)));
    serial.parser.register(&put).unwrap();

    serial.send("AT+PUTFILE=foo.bin,8");
    serial.send("AT+PUTDATA=aGVs");
    assert!(serial.send("AT+ABORT"));
    assert_eq!(last(&serial.sent), "OK\r");
    {
        let stub = put.lock().unwrap();
        assert_eq!(stub.phase(), Phase::Handshake);
        assert!(!stub.is_open());
    }
    assert_eq!(serial.reply("AT+PUTDATA=bG8h"), "UNKN\r");

    assert_eq!(serial.reply("AT+PUTFILE=foo.bin,4"), "OK\r");
    assert_eq!(serial.reply("AT+PUTDATA=bG8h"), "OK\r");
    assert_eq!(std::fs::read(serial.dir.path().join("foo.bin")).unwrap(), b"lo!");
}

// -- serial: configuration and dispatch -------------------------------------

#[test]
fn config_type_is_pinned_through_the_parser() {
    let serial = Serial::new();
    let store = Arc::new(MemoryStore::new());
    let set = shared(SetConfigStub::new(store.clone()));
    let get = shared(GetConfigStub::new(store.clone()));
    serial.parser.register(&set).unwrap();
    serial.parser.register(&get).unwrap();

    assert!(serial.send("AT+SETCONF=panel,level,1,5"));
    assert!(!serial.send("AT+SETCONF=panel,level,2,7"));
    assert_eq!(last(&serial.sent), "ERROR\r");
    assert_eq!(serial.reply("AT+GETCONF=panel,level"), "VALUE=1,5\r");
    assert_eq!(store.get_type("panel", "level").code(), 1);
}

#[test]
fn unknown_command_replies_unkn_and_fails() {
    let serial = Serial::new();
    assert!(!serial.send("AT+BOGUS=x"));
    assert_eq!(last(&serial.sent), "UNKN\r");
}

#[test]
fn dropped_stub_is_no_longer_reachable() {
    let serial = Serial::new();
    let put = shared(PutFileStub::new(Arc::clone(&serial.partition)));
    serial.parser.register(&put).unwrap();
    drop(put);

    assert_eq!(serial.reply("AT+PUTFILE=foo.bin,4"), "UNKN\r");
    assert_eq!(serial.parser.parser_core().registered_stubs(), 0);
}

#[test]
fn colliding_stubs_are_refused() {
    let serial = Serial::new();
    let first = shared(PutFileStub::new(Arc::clone(&serial.partition)));
    let second = shared(PutFileStub::new(Arc::clone(&serial.partition)));
    serial.parser.register(&first).unwrap();

    assert_eq!(
        serial.parser.register(&second),
        Err(ParserError::CommandConflict {
            command: "AT+PUTFILE".into()
        })
    );
}

#[test]
fn output_type_change_reaches_stub_replies() {
    let serial = Serial::new();
    let wireless = sink(&serial.broker, MessageType::OUTBOUND_WIRELESS);
    let set = shared(SetConfigStub::new(Arc::new(MemoryStore::new())));
    serial.parser.register(&set).unwrap();

    serial.parser.set_output_message_type(MessageType::OUTBOUND_WIRELESS);
    serial.send("AT+SETCONF=a,b,1,1");
    serial.send("AT+NOPE");

    assert!(serial.sent.lock().unwrap().is_empty());
    let wireless = wireless.lock().unwrap();
    assert_eq!(wireless.len(), 2);
    assert_eq!(wireless[0].1, "OK\r");
    assert_eq!(wireless[1].1, "UNKN\r");
}

#[test]
fn wireless_traffic_is_ignored_by_the_serial_parser() {
    let serial = Serial::new();
    assert!(!serial.broker.publish(MessageType::INBOUND_WIRELESS, "AT+ABORT"));
    assert!(serial.sent.lock().unwrap().is_empty());
}

// -- obs-websocket -----------------------------------------------------------

struct Obs {
    broker: Arc<Broker>,
    parser: Arc<ObsParser>,
    replies: Arc<ObsReplyParser>,
    outbound: Sent,
}

impl Obs {
    fn new() -> Self {
        let broker = Arc::new(Broker::new());
        let parser = ObsParser::new(Arc::clone(&broker));
        let replies = ObsReplyParser::new(Arc::clone(&broker));
        let outbound = sink(&broker, MessageType::OUTBOUND_ANY);
        Self {
            broker,
            parser,
            replies,
            outbound,
        }
    }

    fn receive(&self, frame: &Value) -> bool {
        self.broker
            .publish(MessageType::INBOUND_WIRELESS, &frame.to_string())
    }
}

#[test]
fn hello_with_challenge_is_answered_with_identify() {
    let obs = Obs::new();
    let hello = shared(HelloStub::new("p"));
    obs.parser.register(&hello).unwrap();

    assert!(obs.receive(&json!({
        "op": 0,
        "d": {"rpcVersion": 1, "authentication": {"challenge": "c", "salt": "s"}}
    })));

    let sent = obs.outbound.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, MessageType::OUTBOUND_WIRELESS);
    let identify: Value = serde_json::from_str(&sent[0].1).unwrap();
    assert_eq!(
        identify,
        json!({"op": 1, "d": {
            "rpcVersion": 1,
            "eventSubscriptions": 2047,
            "authentication": "LEfh2WVBWpa8M06P7MehLXlToA1PtH2lNSNPjUZVYls="
        }})
    );
}

#[test]
fn malformed_frames_are_dropped_silently() {
    let obs = Obs::new();
    let hello = shared(HelloStub::new("p"));
    obs.parser.register(&hello).unwrap();

    assert!(!obs.broker.publish(MessageType::INBOUND_WIRELESS, "not json"));
    assert!(!obs.receive(&json!({"op": 0})));
    assert!(!obs.receive(&json!({"op": 0, "d": {"rpcVersion": 9}})));
    assert!(!obs.receive(&json!({"op": 4, "d": {}})));
    assert!(obs.outbound.lock().unwrap().is_empty());
}

#[test]
fn identified_is_consumed_without_reply() {
    let obs = Obs::new();
    let identified = shared(IdentifiedStub::new());
    obs.parser.register(&identified).unwrap();

    assert!(obs.receive(&json!({"op": 2, "d": {"negotiatedRpcVersion": 1}})));
    assert!(obs.outbound.lock().unwrap().is_empty());
}

#[test]
fn request_reply_is_routed_by_request_id() {
    let obs = Obs::new();
    let response = shared(RequestResponseStub::new());
    obs.parser.register(&response).unwrap();
    let waiting = shared(CorrelatedReplyStub::new("abc123"));
    obs.replies.register(&waiting).unwrap();

    let reply = |id: &str| {
        json!({"op": 7, "d": {
            "requestType": "GetCurrentProgramScene",
            "requestId": id,
            "requestStatus": {"result": true, "code": 100},
            "responseData": {"sceneName": "Live"}
        }})
    };

    assert!(obs.receive(&reply("abc123")));
    {
        let sent = obs.outbound.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, MessageType::OUTBOUND_ANY);
        assert_eq!(
            serde_json::from_str::<Value>(&sent[0].1).unwrap(),
            json!({"sceneName": "Live"})
        );
    }
    assert!(waiting.lock().unwrap().is_completed());

    // Nobody waits for this one: handled, nothing published.
    assert!(obs.receive(&reply("zzz")));
    assert_eq!(obs.outbound.lock().unwrap().len(), 1);
}

#[test]
fn reply_parser_needs_request_shape() {
    let obs = Obs::new();
    assert!(!obs.broker.publish(MessageType::EVENT, r#"{"requestId":"a"}"#));
    assert!(!obs.broker.publish(MessageType::EVENT, r#"{"requestType":"A"}"#));
    assert!(obs.broker.publish(MessageType::EVENT, r#"{"requestId":"a","results":[]}"#));
}

#[test]
fn tagged_request_round_trip() {
    let obs = Obs::new();
    let response = shared(RequestResponseStub::new());
    obs.parser.register(&response).unwrap();

    let (request, id) =
        panel_protocol::obs::tag_request(r#"{"op":6,"d":{"requestType":"ToggleRecord"}}"#).unwrap();
    let waiting = shared(CorrelatedReplyStub::new(id.clone()));
    obs.replies.register(&waiting).unwrap();
    let request: Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["d"]["requestId"], id.as_str());

    assert!(obs.receive(&json!({"op": 7, "d": {
        "requestType": "ToggleRecord",
        "requestId": id,
        "requestStatus": {"result": true, "code": 100},
        "responseData": {"outputActive": true}
    }})));
    assert!(waiting.lock().unwrap().is_completed());
    assert_eq!(last(&obs.outbound), r#"{"outputActive":true}"#);
}
