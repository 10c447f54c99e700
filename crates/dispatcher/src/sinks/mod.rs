//! Sink implementations
//!
//! Log, JSON-lines file and UDP outputs.

mod file;
mod log;
mod network;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::log::LogSink;
pub use self::network::{packetize, FramePacket, NetworkFormat, NetworkSink, NetworkSinkConfig};
