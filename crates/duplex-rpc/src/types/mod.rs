//! Wire envelopes and error types shared by every part of the engine.

pub mod error;
pub mod message;

pub use error::*;
pub use message::*;
