//! A duplex connection: one stream, calls flowing both ways.
//!
//! A single read task ([`Connection::serve`]) decodes every inbound envelope and
//! routes it by shape: responses complete our outstanding calls, requests are
//! dispatched to registered services. Any number of tasks may call
//! [`Connection::call`] meanwhile; all outbound frames go through one send lock.

pub mod stats;

pub use stats::{ConnectionStats, StatsSnapshot};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::client::pending::PendingGuard;
use crate::client::{decode_reply, response_outcome, PendingCallInfo, PendingCalls};
use crate::config::ConnectionConfig;
use crate::protocol::Dispatcher;
use crate::service::{Service, ServiceInfo, ServiceRegistry};
use crate::transport::{encode_frame, FrameReader, FrameWriter};
use crate::types::{
    InboundRequest, InboundResponse, Message, OutgoingRequest, RegistrationError, RpcError,
    RpcResult,
};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Handle to a duplex connection. Cloning is cheap; all clones share the stream.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    /// Taken by the one task that runs the dispatch loop.
    reader: Mutex<Option<FrameReader<BoxedReader>>>,
    /// Send lock: every outbound frame is written under it.
    writer: Mutex<FrameWriter<BoxedWriter>>,
    dispatcher: Dispatcher,
    pending: PendingCalls,
    stats: ConnectionStats,
    in_flight: Option<Arc<Semaphore>>,
    config: ConnectionConfig,
    /// Set once the dispatch loop has exited.
    stopped: AtomicBool,
}

/// Marks the dispatch loop as stopped however `serve` exits.
struct StopOnExit<'a>(&'a AtomicBool);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Connection {
    /// Wrap an established bidirectional stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, ConnectionConfig::default())
    }

    pub fn with_config<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }

    /// Build a connection from separately owned read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        let in_flight = config
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Self {
            inner: Arc::new(Inner {
                reader: Mutex::new(Some(FrameReader::new(reader))),
                writer: Mutex::new(FrameWriter::new(writer)),
                dispatcher: Dispatcher::new(Arc::new(ServiceRegistry::new())),
                pending: PendingCalls::new(),
                stats: ConnectionStats::default(),
                in_flight,
                config,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.inner.dispatcher.registry()
    }

    /// Make `receiver`'s methods callable by the peer under the receiver's type name.
    pub async fn register<S: Service>(&self, receiver: S) -> Result<(), RegistrationError> {
        self.registry().register(receiver, None).await
    }

    /// Like [`register`](Self::register) but under `name` (ignored if empty).
    pub async fn register_as<S: Service>(
        &self,
        receiver: S,
        name: &str,
    ) -> Result<(), RegistrationError> {
        self.registry().register(receiver, Some(name)).await
    }

    /// Register a receiver that is also used outside this connection.
    pub async fn register_shared<S: Service>(
        &self,
        receiver: Arc<S>,
        name_override: Option<&str>,
    ) -> Result<(), RegistrationError> {
        self.registry().register_shared(receiver, name_override).await
    }

    pub async fn services(&self) -> Vec<ServiceInfo> {
        self.registry().describe().await
    }

    /// Call `Service.Method` on the peer and wait for its reply.
    ///
    /// There is no timeout: wrap the future in `tokio::time::timeout` to bound the wait.
    /// Dropping the future forgets the call.
    pub async fn call<A, R>(&self, service_method: &str, argument: &A) -> RpcResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_value(service_method, argument).await?;
        decode_reply(result)
    }

    /// Call `Service.Method` and decode the reply into `reply`.
    pub async fn call_into<A, R>(
        &self,
        service_method: &str,
        argument: &A,
        reply: &mut R,
    ) -> RpcResult<()>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        *reply = self.call(service_method, argument).await?;
        Ok(())
    }

    async fn call_value<A: Serialize>(&self, service_method: &str, argument: &A) -> RpcResult<Value> {
        if self.is_stopped() {
            return Err(RpcError::Closed);
        }
        let recorded = serde_json::to_value(argument).map_err(RpcError::Encode)?;
        let (id, done) = self.inner.pending.begin(service_method, recorded);
        let _guard = PendingGuard::new(&self.inner.pending, id);

        let request = OutgoingRequest::new(service_method, argument, id);
        if let Err(e) = self.inner.send(&request).await {
            tracing::warn!("Call {service_method} (id {id}) could not be sent: {e}");
            return Err(e);
        }
        tracing::debug!("Call {service_method} (id {id}) sent");

        match done.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcError::Transport(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "connection dropped while the call was pending",
            ))),
        }
    }

    /// Run the dispatch loop until the stream ends or fails.
    ///
    /// Returns `Ok(())` on a clean end of stream. Calls still pending when the loop
    /// stops are not failed; they stay blocked. Calls made afterwards fail with
    /// [`RpcError::Closed`].
    pub async fn serve(&self) -> RpcResult<()> {
        let mut reader = self
            .inner
            .reader
            .lock()
            .await
            .take()
            .ok_or(RpcError::AlreadyServing)?;
        let _stop = StopOnExit(&self.inner.stopped);

        tracing::info!("Dispatch loop started");

        loop {
            let envelope = match reader.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    tracing::info!("End of stream, dispatch loop stopped");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Decode failed, dispatch loop stopped: {e}");
                    return Err(e.into());
                }
            };

            match envelope.into_message() {
                Some(Message::Response(response)) => self.inner.handle_response(response),
                Some(Message::Request(request)) => self.handle_request(request).await,
                None => {
                    self.inner.stats.malformed_dropped();
                    tracing::warn!("Dropped envelope that is neither a request nor a response");
                }
            }
        }
    }

    /// Run [`serve`](Self::serve) on a new task.
    pub fn spawn_serve(&self) -> JoinHandle<RpcResult<()>> {
        let connection = self.clone();
        tokio::spawn(async move { connection.serve().await })
    }

    async fn handle_request(&self, request: InboundRequest) {
        tracing::debug!("Request {} (id {})", request.method, request.id);

        let prepared = match self.inner.dispatcher.prepare(request).await {
            Ok(prepared) => prepared,
            Err(rejected) => {
                self.inner.stats.dispatch_failed();
                tracing::warn!("rpc: {}", rejected.error);
                let Some(response) = rejected.response() else {
                    tracing::warn!("Request without usable id, no response sent");
                    return;
                };
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    if let Err(e) = inner.send(&response).await {
                        tracing::error!("Failed to send error response: {e}");
                    }
                });
                return;
            }
        };

        let permit = match &self.inner.in_flight {
            Some(slots) => Arc::clone(slots).acquire_owned().await.ok(),
            None => None,
        };

        self.inner.stats.request_dispatched();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _permit = permit;
            let response = Dispatcher::run(prepared).await;
            if let Err(e) = inner.send(&response).await {
                tracing::error!("Failed to send response (id {}): {e}", response.id);
            }
        });
    }

    /// Shut down the write side of the stream.
    pub async fn close(&self) -> RpcResult<()> {
        tracing::info!("Closing connection");
        self.inner.writer.lock().await.shutdown().await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Outstanding outgoing calls.
    pub fn pending_calls(&self) -> Vec<PendingCallInfo> {
        self.inner.pending.snapshot()
    }

    /// True once the dispatch loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.inner.pending.contains(id)
    }
}

impl Inner {
    /// Encode outside the lock, write under it.
    async fn send<T: Serialize>(&self, value: &T) -> RpcResult<()> {
        let frame = encode_frame(value)?;
        self.writer.lock().await.write_frame(&frame).await
    }

    fn handle_response(&self, response: InboundResponse) {
        let Some(id) = response.correlation_id() else {
            self.stats.stale_response();
            tracing::warn!("Response not recognized: id {}", response.id);
            return;
        };

        if self.pending.complete(id, response_outcome(response)) {
            self.stats.response_matched();
            tracing::debug!("Response matched call id {id}");
        } else {
            self.stats.stale_response();
            tracing::warn!("Response not recognized: id {id}");
        }
    }
}
