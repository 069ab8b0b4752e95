#![deny(missing_docs)]

//! # Panel Protocol
//!
//! Command parsers that sit on the [`panel_bus::Broker`] and speak the two
//! wire protocols of the control panel: the serial AT-command set (with its
//! base64 file-transfer phases) and the obs-websocket opcode protocol.
//!
//! ## Parser hierarchy
//!
//! ```text
//! ParserCore (weak stub registry, lookup, cleanup, abort)
//! ├── SerialParser    InboundWired  → OutboundWired
//! │   └── PUTFILE/PUTDATA, GETFILE/GETDATA, LISTDIR/NEXTFILE, DELETE,
//! │       MAKEDIR, SETCONF, GETCONF, DELCONF, GETBUFS, GETFWVER
//! ├── ObsParser       InboundWireless → OutboundWireless / Event
//! │   └── Hello(0), Identified(2), Event(5), RequestResponse(7),
//! │       RequestBatchResponse(9)
//! └── ObsReplyParser  Event → OutboundAny, keyed by request id
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`stub`] | `ParserStub` trait, `StubBase`, `StubReply` |
//! | [`parser`] | `ParserCore` and the `Parser` trait |
//! | [`storage`] | Partition / file / directory collaborator traits |
//! | [`fs`] | `FsPartition`: a partition rooted in a host directory |
//! | [`kv`] | `ItemType`, `ConfigValue`, `KeyValueStore`, `MemoryStore` |
//! | [`codec`] | base64 helpers used by the file-transfer stubs |
//! | [`serial`] | AT-command parser and its stubs |
//! | [`obs`] | obs-websocket parsers, stubs, authentication, request ids |
//! | [`error`] | `StorageError`, `ProtocolError`, `ParserError` |

pub mod codec;
pub mod error;
pub mod fs;
pub mod kv;
pub mod obs;
pub mod parser;
pub mod serial;
pub mod storage;
pub mod stub;

pub use error::{ParserError, ProtocolError, StorageError};
pub use fs::FsPartition;
pub use kv::{ConfigValue, ItemType, KeyValueStore, MemoryStore};
pub use obs::{ObsParser, ObsReplyParser, Opcode};
pub use parser::{Parser, ParserCore};
pub use serial::SerialParser;
pub use storage::{DirEntry, DirHandle, EntryKind, FileHandle, OpenMode, Partition};
pub use stub::{ParserStub, SharedStub, StubBase, StubReply, WeakStub};
