//! TCP transport: every accepted or dialed socket becomes one duplex connection.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use duplex_rpc::{Connection, ConnectionConfig, RpcResult};

use crate::error::{NodeError, NodeResult};
use crate::services;

/// Wrap a socket in a connection that exposes the demo services.
pub async fn open_connection(stream: TcpStream, config: ConnectionConfig) -> NodeResult<Connection> {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("TCP_NODELAY not set: {e}");
    }
    let (read, write) = stream.into_split();
    let conn = Connection::from_parts(read, write, config);
    services::register_all(&conn).await?;
    Ok(conn)
}

/// Connect to `addr` and start serving the peer's calls on the new connection.
pub async fn dial(
    addr: &str,
    config: ConnectionConfig,
) -> NodeResult<(Connection, JoinHandle<RpcResult<()>>)> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| NodeError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    tracing::info!("Connected to {addr}");

    let conn = open_connection(stream, config).await?;
    let serving = conn.spawn_serve();
    Ok((conn, serving))
}

/// Accepts TCP clients and serves each on its own connection.
pub struct TcpServer {
    listener: TcpListener,
    config: ConnectionConfig,
}

impl TcpServer {
    pub async fn bind(addr: &str, config: ConnectionConfig) -> NodeResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> NodeResult<SocketAddr> {
        self.listener.local_addr().map_err(NodeError::Accept)
    }

    /// Accept one client, register the demo services, and start its dispatch loop.
    pub async fn accept(&self) -> NodeResult<(Connection, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await.map_err(NodeError::Accept)?;
        tracing::info!("Accepted connection from {peer}");

        let conn = open_connection(stream, self.config.clone()).await?;
        let serving = conn.clone();
        tokio::spawn(async move {
            match serving.serve().await {
                Ok(()) => tracing::info!("Connection from {peer} closed"),
                Err(e) => tracing::warn!("Connection from {peer} failed: {e}"),
            }
        });
        Ok((conn, peer))
    }

    /// Accept clients until the listener fails.
    pub async fn run(&self) -> NodeResult<()> {
        tracing::info!("Listening on {}", self.local_addr()?);
        loop {
            match self.accept().await {
                Ok(_) => {}
                Err(NodeError::Accept(e)) => return Err(NodeError::Accept(e)),
                Err(e) => tracing::warn!("Dropping connection: {e}"),
            }
        }
    }
}
