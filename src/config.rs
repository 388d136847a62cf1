//! Environment-driven server configuration.

use anyhow::Result;

/// Drand mainnet quicknet (3s rounds, unchained G1 signatures).
pub const DEFAULT_BEACON_URL: &str = "https://api.drand.sh";
pub const DEFAULT_CHAIN_HASH: &str =
    "52db9ba70e0cc0f6eaf7803dd07447a1f5477735fd3f661792ba94600c84e971";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database_url: String,
    pub beacon_url: String,
    pub beacon_chain_hash: String,
    /// Inserted into the token table at startup when it is empty, so a fresh
    /// deployment has one working credential.
    pub bootstrap_token: Option<String>,
}

impl Config {
    /// Load configuration from environment or use defaults.
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "timevault.db".to_string());

        let beacon_url =
            std::env::var("BEACON_URL").unwrap_or_else(|_| DEFAULT_BEACON_URL.to_string());

        let beacon_chain_hash =
            std::env::var("BEACON_CHAIN_HASH").unwrap_or_else(|_| DEFAULT_CHAIN_HASH.to_string());

        let bootstrap_token = std::env::var("BOOTSTRAP_TOKEN").ok().filter(|t| !t.is_empty());

        Ok(Self {
            bind_addr,
            database_url,
            beacon_url,
            beacon_chain_hash,
            bootstrap_token,
        })
    }
}
