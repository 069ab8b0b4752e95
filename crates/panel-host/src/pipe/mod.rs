//! Transport endpoints on the broker.
//!
//! A pipe publishes what arrives from its transport under its output tag
//! and writes out whatever the broker hands it under its input mask.

mod serial;
mod websocket;

pub use serial::SerialPipe;
pub use websocket::WebSocketPipe;
