//! Transports for the node.

pub mod tcp;

pub use tcp::{dial, open_connection, TcpServer};
