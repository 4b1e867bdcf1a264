//! Configuration module for the co-parenting backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for service authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,
    /// Public frontend origin used to build invite links
    pub public_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AddrParseError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("COPARENT_API_PSK").ok();

        let db_path = env::var("COPARENT_DB_PATH")
            .unwrap_or_else(|_| "./data/coparent.sqlite".to_string())
            .into();

        let bind_addr = env::var("COPARENT_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = env::var("COPARENT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_json = env::var("COPARENT_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let public_url = env::var("COPARENT_PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            log_json,
            public_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("COPARENT_API_PSK");
        env::remove_var("COPARENT_DB_PATH");
        env::remove_var("COPARENT_BIND_ADDR");
        env::remove_var("COPARENT_LOG_LEVEL");
        env::remove_var("COPARENT_PUBLIC_URL");
        env::remove_var("COPARENT_LOG_FORMAT");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/coparent.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.log_json);
        assert_eq!(config.public_url, "http://localhost:5173");
    }
}
