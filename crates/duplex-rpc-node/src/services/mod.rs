//! Services this node exposes to its peer, and the client helpers that call them.

pub mod servable;

pub use servable::{ping, ping_many, Servable, PING_PREFIX};

use duplex_rpc::service::ServiceInfo;
use duplex_rpc::{Connection, RegistrationError, ServiceRegistry};

/// Register every demo service on `conn`.
pub async fn register_all(conn: &Connection) -> Result<(), RegistrationError> {
    conn.register(Servable).await
}

/// Describe the demo services without opening a connection.
pub async fn describe() -> Result<Vec<ServiceInfo>, RegistrationError> {
    let registry = ServiceRegistry::new();
    registry.register(Servable, None).await?;
    Ok(registry.describe().await)
}
