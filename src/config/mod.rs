//! Configuration module for the Mobilize backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to the SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Base URL of the Supabase project (e.g. https://xyz.supabase.co)
    pub supabase_url: Option<String>,
    /// Supabase service-role key used for both apikey and bearer headers
    pub supabase_key: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_psk = env::var("MOBILIZE_API_PSK").ok();

        let db_path = env::var("MOBILIZE_DB_PATH")
            .unwrap_or_else(|_| "./data/mobilize.sqlite".to_string())
            .into();

        let bind_addr = env::var("MOBILIZE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid MOBILIZE_BIND_ADDR format");

        let log_level = env::var("MOBILIZE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let supabase_url = env::var("SUPABASE_URL").ok();
        let supabase_key = env::var("SUPABASE_SERVICE_KEY").ok();

        Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            supabase_url,
            supabase_key,
        }
    }

    /// Whether a usable Supabase connection is configured.
    pub fn has_supabase(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("MOBILIZE_API_PSK");
        env::remove_var("MOBILIZE_DB_PATH");
        env::remove_var("MOBILIZE_BIND_ADDR");
        env::remove_var("MOBILIZE_LOG_LEVEL");
        env::remove_var("SUPABASE_URL");
        env::remove_var("SUPABASE_SERVICE_KEY");

        let config = Config::from_env();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/mobilize.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert!(!config.has_supabase());
    }
}
