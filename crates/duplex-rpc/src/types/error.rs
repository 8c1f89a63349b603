//! Error types for registration, dispatch, decoding, and outgoing calls.

/// Why a service could not be registered.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("rpc.Register: type {0} is not exported")]
    UnexportedName(String),

    #[error("rpc: service already defined: {0}")]
    DuplicateService(String),

    #[error("rpc.Register: type {service} has no exported methods of suitable type{}", hint_suffix(.hint))]
    NoSuitableMethods { service: String, hint: Option<String> },
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(h) => format!(" (hint: {h})"),
        None => String::new(),
    }
}

/// Why an inbound request could not be dispatched.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("rpc: service/method request ill-formed: {0}")]
    IllFormedMethod(String),

    #[error("rpc: can't find service {0}")]
    ServiceNotFound(String),

    #[error("rpc: can't find method {0}")]
    MethodNotFound(String),

    #[error("jsonrpc: request body missing params")]
    MissingParams,

    #[error("jsonrpc: invalid params for {method}: {reason}")]
    InvalidParams { method: String, reason: String },
}

/// Failure to pull the next envelope off the stream.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed JSON on stream: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stream ended inside a message ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// All errors surfaced to callers of the engine.
#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Encode error: {0}")]
    Encode(serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The peer answered the call with an error value.
    #[error("{0}")]
    Remote(String),

    #[error("empty result")]
    EmptyResult,

    #[error("Invalid reply: {0}")]
    InvalidReply(serde_json::Error),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("connection is already being served")]
    AlreadyServing,

    /// The dispatch loop has stopped; no reply could ever be matched.
    #[error("connection closed: dispatch loop has stopped")]
    Closed,
}

impl RpcError {
    /// True when the error came back from the peer rather than from this side.
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote(_) | RpcError::EmptyResult)
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_messages() {
        assert_eq!(
            RegistrationError::UnexportedName("servable".into()).to_string(),
            "rpc.Register: type servable is not exported"
        );
        assert_eq!(
            RegistrationError::DuplicateService("Servable".into()).to_string(),
            "rpc: service already defined: Servable"
        );
        let plain = RegistrationError::NoSuitableMethods {
            service: "Empty".into(),
            hint: None,
        };
        assert_eq!(
            plain.to_string(),
            "rpc.Register: type Empty has no exported methods of suitable type"
        );
        let hinted = RegistrationError::NoSuitableMethods {
            service: "Lower".into(),
            hint: Some("method names must start with an upper-case letter".into()),
        };
        assert!(hinted.to_string().ends_with("(hint: method names must start with an upper-case letter)"));
    }

    #[test]
    fn test_dispatch_messages() {
        assert_eq!(
            DispatchError::ServiceNotFound("Unknown.Method".into()).to_string(),
            "rpc: can't find service Unknown.Method"
        );
        assert_eq!(
            DispatchError::IllFormedMethod("nodot".into()).to_string(),
            "rpc: service/method request ill-formed: nodot"
        );
        assert_eq!(
            DispatchError::MissingParams.to_string(),
            "jsonrpc: request body missing params"
        );
    }

    #[test]
    fn test_remote_flag() {
        assert!(RpcError::Remote("x".into()).is_remote());
        assert!(RpcError::EmptyResult.is_remote());
        assert!(!RpcError::AlreadyServing.is_remote());
    }
}
