//! duplex-rpc — a symmetric JSON-RPC engine.
//!
//! One bidirectional byte stream carries our calls to the peer and the peer's calls
//! to us at the same time. Messages are told apart by shape, not by channel.

pub mod client;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod types;

pub use config::ConnectionConfig;
pub use connection::{Connection, StatsSnapshot};
pub use service::{MethodSet, Service, ServiceRegistry};
pub use types::{DecodeError, DispatchError, RegistrationError, RpcError, RpcResult};
