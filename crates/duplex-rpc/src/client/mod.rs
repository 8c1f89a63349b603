//! Outgoing-call bookkeeping.

pub mod pending;

pub use pending::{CallOutcome, PendingCallInfo, PendingCalls};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{error_text, InboundResponse, RpcError, RpcResult};

/// Turn a matched response into the outcome handed to the waiting caller.
pub fn response_outcome(response: InboundResponse) -> CallOutcome {
    if let Some(error) = response.error.filter(|e| !e.is_null()) {
        return Err(RpcError::Remote(error_text(&error)));
    }
    match response.result {
        Some(result) => Ok(result),
        None => Err(RpcError::EmptyResult),
    }
}

/// Decode a result blob into the caller's reply type.
///
/// A `null` result that the reply type cannot hold is an empty result, not a bad reply.
pub fn decode_reply<R: DeserializeOwned>(result: Value) -> RpcResult<R> {
    let was_null = result.is_null();
    serde_json::from_value(result).map_err(|e| {
        if was_null {
            RpcError::EmptyResult
        } else {
            RpcError::InvalidReply(e)
        }
    })
}
