//! Resolves inbound requests against the registry and runs them.
//!
//! Resolution and argument decoding happen on the read task, in arrival order.
//! Invocation happens later on a task of its own, so replies may leave out of order.

use std::sync::Arc;

use serde_json::Value;

use crate::service::{BoundCall, ServiceRegistry};
use crate::types::{DispatchError, InboundRequest, OutgoingResponse};

/// A request that resolved to a method and decoded its argument.
pub struct PreparedCall {
    id: Value,
    method: String,
    call: BoundCall,
}

impl PreparedCall {
    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Run the handler on the current thread and build the reply.
    pub fn invoke(self) -> OutgoingResponse {
        match (self.call)() {
            Ok(result) => OutgoingResponse::success(self.id, result),
            Err(message) => OutgoingResponse::failure(self.id, message),
        }
    }
}

impl std::fmt::Debug for PreparedCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedCall")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

/// A request that could not be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRequest {
    pub id: Value,
    pub error: DispatchError,
}

impl RejectedRequest {
    /// Error reply for the peer, if the request carried a usable id.
    pub fn response(&self) -> Option<OutgoingResponse> {
        if self.id.is_null() {
            return None;
        }
        Some(OutgoingResponse::failure(
            self.id.clone(),
            self.error.to_string(),
        ))
    }
}

/// Looks up and invokes registered methods.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Resolve the target method and decode the single positional argument.
    pub async fn prepare(&self, request: InboundRequest) -> Result<PreparedCall, RejectedRequest> {
        let InboundRequest { method, params, id } = request;

        let (service, method_name) = match self.registry.lookup(&method).await {
            Ok(found) => found,
            Err(error) => return Err(RejectedRequest { id, error }),
        };
        let Some(descriptor) = service.method(&method_name) else {
            return Err(RejectedRequest {
                id,
                error: DispatchError::MethodNotFound(method),
            });
        };

        let argument = match params {
            None | Some(Value::Null) => {
                return Err(RejectedRequest {
                    id,
                    error: DispatchError::MissingParams,
                })
            }
            Some(params) => match first_param(params) {
                Ok(argument) => argument,
                Err(reason) => {
                    return Err(RejectedRequest {
                        id,
                        error: DispatchError::InvalidParams { method, reason },
                    })
                }
            },
        };

        match descriptor.bind(argument) {
            Ok(call) => Ok(PreparedCall { id, method, call }),
            Err(e) => Err(RejectedRequest {
                id,
                error: DispatchError::InvalidParams {
                    method,
                    reason: e.to_string(),
                },
            }),
        }
    }

    /// Run a prepared call off the async workers and build its reply.
    ///
    /// A panicking handler is answered with an error instead of leaving the caller waiting.
    pub async fn run(prepared: PreparedCall) -> OutgoingResponse {
        let id = prepared.id.clone();
        let method = prepared.method.clone();
        match tokio::task::spawn_blocking(move || prepared.invoke()).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Handler for {method} did not complete: {e}");
                OutgoingResponse::failure(id, format!("rpc: method {method} panicked"))
            }
        }
    }
}

/// Params are a positional array; only the first element is the argument.
fn first_param(params: Value) -> Result<Value, String> {
    match params {
        Value::Array(items) => Ok(items.into_iter().next().unwrap_or(Value::Null)),
        other => Err(format!("params must be an array, got {other}")),
    }
}
