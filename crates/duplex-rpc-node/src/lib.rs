//! duplex-rpc node: a TCP endpoint that serves the demo service and calls its peer.

pub mod config;
pub mod error;
pub mod repl;
pub mod services;
pub mod transport;

pub use config::{resolve_connect_addr, resolve_listen_addr};
pub use error::{NodeError, NodeResult};
pub use services::Servable;
pub use transport::{dial, TcpServer};
