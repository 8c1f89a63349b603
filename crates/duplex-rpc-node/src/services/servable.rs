//! The demo service both ends of a node connection expose.

use serde_json::Value;
use tokio::task::JoinSet;

use duplex_rpc::{Connection, MethodSet, RpcResult, Service};

pub const PING_PREFIX: &str = "Pong:";

/// Answers pings, echoes values, and fails on request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Servable;

impl Servable {
    fn ping(&self, message: String, reply: &mut String) -> Result<(), String> {
        *reply = format!("{PING_PREFIX}{message}");
        Ok(())
    }

    fn echo(&self, value: Value, reply: &mut Value) -> Result<(), String> {
        *reply = value;
        Ok(())
    }

    fn fail(&self, message: String, _reply: &mut Value) -> Result<(), String> {
        Err(message)
    }
}

impl Service for Servable {
    fn methods(methods: &mut MethodSet<Self>) {
        methods
            .method("Ping", Servable::ping)
            .method("Echo", Servable::echo)
            .method("Fail", Servable::fail);
    }
}

/// Call `Servable.Ping` on the peer.
pub async fn ping(conn: &Connection, message: &str) -> RpcResult<String> {
    conn.call("Servable.Ping", &message).await
}

/// Issue `count` pings at once. Results come back in call order.
pub async fn ping_many(conn: &Connection, message: &str, count: usize) -> Vec<RpcResult<String>> {
    let mut calls = JoinSet::new();
    for index in 0..count {
        let conn = conn.clone();
        let message = if count > 1 {
            format!("{message}#{index}")
        } else {
            message.to_string()
        };
        calls.spawn(async move { (index, ping(&conn, &message).await) });
    }

    let mut results = Vec::with_capacity(count);
    while let Some(joined) = calls.join_next().await {
        match joined {
            Ok(done) => results.push(done),
            Err(e) => tracing::error!("Ping task failed: {e}"),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
