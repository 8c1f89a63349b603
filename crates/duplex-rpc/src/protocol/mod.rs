//! Inbound request handling.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, PreparedCall, RejectedRequest};
