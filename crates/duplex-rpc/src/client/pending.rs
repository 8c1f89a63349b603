//! Table of calls waiting for a response.
//!
//! The table is behind a `std::sync::RwLock`: no guard is ever held across an
//! `.await`, and entries must be removable from `Drop` when a caller stops waiting.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::types::RpcError;

/// What a waiting caller receives: the raw result blob or the failure.
pub type CallOutcome = Result<Value, RpcError>;

/// An outstanding call.
struct PendingCall {
    method: String,
    argument: Value,
    done: oneshot::Sender<CallOutcome>,
}

#[derive(Default)]
struct PendingTable {
    /// Last id handed out. Guarded together with `calls`.
    seq: u64,
    calls: HashMap<u64, PendingCall>,
}

/// Snapshot of an outstanding call, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCallInfo {
    pub id: u64,
    pub method: String,
    pub argument: Value,
}

/// Outstanding calls keyed by correlation id.
#[derive(Default)]
pub struct PendingCalls {
    table: RwLock<PendingTable>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, PendingTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PendingTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate the next correlation id and park a call under it.
    pub fn begin(&self, method: &str, argument: Value) -> (u64, oneshot::Receiver<CallOutcome>) {
        let (done, rx) = oneshot::channel();
        let mut table = self.write();
        table.seq += 1;
        let id = table.seq;
        table.calls.insert(
            id,
            PendingCall {
                method: method.to_string(),
                argument,
                done,
            },
        );
        (id, rx)
    }

    /// Deliver `outcome` to the call with `id` and forget it.
    ///
    /// Returns `false` when no such call is pending (a stale or duplicate response).
    pub fn complete(&self, id: u64, outcome: CallOutcome) -> bool {
        let call = self.write().calls.remove(&id);
        match call {
            Some(call) => {
                if call.done.send(outcome).is_err() {
                    tracing::debug!("caller for {} (id {id}) stopped waiting", call.method);
                }
                true
            }
            None => false,
        }
    }

    /// Drop the call with `id` without completing it.
    pub fn remove(&self, id: u64) -> bool {
        self.write().calls.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.read().calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().calls.is_empty()
    }

    /// Last correlation id issued (0 before the first call).
    pub fn last_id(&self) -> u64 {
        self.read().seq
    }

    /// Outstanding calls in id order.
    pub fn snapshot(&self) -> Vec<PendingCallInfo> {
        let table = self.read();
        let mut calls: Vec<PendingCallInfo> = table
            .calls
            .iter()
            .map(|(id, call)| PendingCallInfo {
                id: *id,
                method: call.method.clone(),
                argument: call.argument.clone(),
            })
            .collect();
        calls.sort_by_key(|c| c.id);
        calls
    }
}

/// Removes a call from the table when dropped, however the caller exits.
pub(crate) struct PendingGuard<'a> {
    pending: &'a PendingCalls,
    id: u64,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pending: &'a PendingCalls, id: u64) -> Self {
        Self { pending, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(self.id);
    }
}
