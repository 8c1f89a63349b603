//! Connection configuration.

/// Environment variable bounding concurrently running inbound handlers.
pub const MAX_IN_FLIGHT_ENV: &str = "DUPLEX_RPC_MAX_IN_FLIGHT";

/// Per-connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Upper bound on inbound requests being handled at once. `None` is unbounded.
    ///
    /// When the bound is reached the read loop waits for a slot before reading on,
    /// which pushes back on the peer.
    pub max_in_flight: Option<usize>,
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = (limit > 0).then_some(limit);
        self
    }

    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            max_in_flight: parse_limit(std::env::var(MAX_IN_FLIGHT_ENV).ok().as_deref()),
        }
    }
}

/// `None`, `0` and unparsable values mean unbounded.
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    let raw = raw?.trim();
    match raw.parse::<usize>() {
        Ok(0) => None,
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!("Ignoring {MAX_IN_FLIGHT_ENV}={raw:?}: not a number");
            None
        }
    }
}
