//! Byte-oriented reliable channel over a source of transient streams
//! (spec.md §4.1).

pub mod buffer;
pub mod protocol;
pub mod reader;
pub mod stream;
pub mod writer;

pub use buffer::{WriteBuffer, DEFAULT_WRITE_BUFFER};
pub use protocol::FIN_ACKED;
pub use reader::ChannelReader;
pub use stream::{BoxedStream, DialStreamSource, DuplexStream, QueueStreamSource, StreamSource};
pub use writer::ChannelWriter;

/// Default payload chunk size (§4.1, `[ADD] Payload size bound` in
/// SPEC_FULL.md §4).
pub const DEFAULT_PAYLOAD_SIZE: u16 = 8192;
