//! Generation-stream decoding.

mod event;
mod ingestor;

pub use event::{DONE_MARKER, EVENT_PREFIX, StreamEvent};
pub use ingestor::{LineFramer, ProtocolMode, StreamIngestor};
