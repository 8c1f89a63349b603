//! Errors raised by the node around the engine.

use duplex_rpc::{RegistrationError, RpcError};

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("Accept failed: {0}")]
    Accept(std::io::Error),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub type NodeResult<T> = Result<T, NodeError>;
