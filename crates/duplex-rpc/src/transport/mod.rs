//! Byte-stream framing for envelopes.

pub mod framing;

pub use framing::{encode_frame, FrameReader, FrameWriter, READ_CHUNK};
