//! Address and history resolution.

use std::path::PathBuf;

use duplex_rpc::ConnectionConfig;

/// Environment variable consulted when no address is given on the command line.
pub const ADDR_ENV: &str = "DUPLEX_RPC_ADDR";

pub const DEFAULT_ADDR: &str = "127.0.0.1:2000";

/// Address to listen on: explicit flag, then `DUPLEX_RPC_ADDR`, then the default.
pub fn resolve_listen_addr(explicit: Option<&str>) -> String {
    resolve_addr(explicit, std::env::var(ADDR_ENV).ok())
}

/// Address to dial. Same precedence as [`resolve_listen_addr`].
pub fn resolve_connect_addr(explicit: Option<&str>) -> String {
    resolve_addr(explicit, std::env::var(ADDR_ENV).ok())
}

fn resolve_addr(explicit: Option<&str>, from_env: Option<String>) -> String {
    if let Some(addr) = explicit.filter(|a| !a.is_empty()) {
        return addr.to_string();
    }
    if let Some(addr) = from_env.filter(|a| !a.is_empty()) {
        return addr;
    }
    DEFAULT_ADDR.to_string()
}

/// Connection settings: an explicit limit wins over the environment.
pub fn resolve_connection_config(max_in_flight: Option<usize>) -> ConnectionConfig {
    match max_in_flight {
        Some(limit) => ConnectionConfig::new().with_max_in_flight(limit),
        None => ConnectionConfig::from_env(),
    }
}

/// Where the REPL keeps its history.
pub fn history_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".duplex_rpc_history")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_wins() {
        assert_eq!(
            resolve_addr(Some("10.0.0.1:9"), Some("10.0.0.2:9".into())),
            "10.0.0.1:9"
        );
    }

    #[test]
    fn test_env_then_default() {
        assert_eq!(resolve_addr(None, Some("10.0.0.2:9".into())), "10.0.0.2:9");
        assert_eq!(resolve_addr(None, None), DEFAULT_ADDR);
        assert_eq!(resolve_addr(Some(""), Some(String::new())), DEFAULT_ADDR);
    }

    #[test]
    fn test_explicit_limit() {
        assert_eq!(resolve_connection_config(Some(4)).max_in_flight, Some(4));
        assert_eq!(resolve_connection_config(Some(0)).max_in_flight, None);
    }

    #[test]
    fn test_history_file_name() {
        assert!(history_path().ends_with(".duplex_rpc_history"));
    }
}
