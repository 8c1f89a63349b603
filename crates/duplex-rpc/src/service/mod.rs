//! Service contract and the per-connection method registry.
//!
//! A service is a receiver value plus an explicit list of callable methods. Each
//! method has the shape `fn(&self, arg: A, reply: &mut R) -> Result<(), E>`: one
//! decoded argument, a zero-valued reply the handler fills in, and an error whose
//! text is sent back to the caller.

pub mod method;
pub mod registry;

pub use method::{BoundCall, MethodDescriptor, MethodSet};
pub use registry::{MethodInfo, ServiceEntry, ServiceInfo, ServiceRegistry};

/// A receiver whose methods can be called by the peer.
pub trait Service: Send + Sync + Sized + 'static {
    /// Name the service is registered under unless the caller overrides it.
    fn service_name() -> String {
        short_type_name::<Self>()
    }

    /// Declare the callable methods.
    fn methods(methods: &mut MethodSet<Self>);
}

/// Type name without module path or generic arguments.
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Exported names start with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}
