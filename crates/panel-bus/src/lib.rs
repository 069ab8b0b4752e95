#![deny(missing_docs)]

//! # Panel Bus
//!
//! In-process publish/subscribe plumbing for the control panel.
//!
//! Transports (serial link, obs-websocket connection) and protocol parsers
//! never talk to each other directly: they all hang off one shared
//! [`Broker`] and exchange `(MessageType, payload)` pairs.
//!
//! ```text
//! serial pipe ──InboundWired──▶ Broker ──▶ SerialParser ──OutboundWired──▶ Broker ──▶ serial pipe
//! ws pipe ──InboundWireless──▶ Broker ──▶ ObsParser ──Event──▶ Broker ──▶ ObsReplyParser
//! ```
//!
//! ## Module layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`message`] | `MessageType` bitmask and subscription filtering |
//! | [`broker`] | `Broker`: ordered subscriber registry, first-responder-wins dispatch |
//! | [`node`] | `NodeCore`, the `Node` trait and [`attach`] |

pub mod broker;
pub mod message;
pub mod node;

pub use broker::{Broker, Callback};
pub use message::MessageType;
pub use node::{attach, Node, NodeCore};
