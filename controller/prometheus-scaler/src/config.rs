//! Configuration for the Prometheus external scaler service

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid server address {address}: must start with http:// or https://")]
    InvalidServerAddress { address: String },

    #[error("Prometheus query must not be empty")]
    EmptyQuery,
}

/// Configuration for the external scaler
#[derive(Debug, Clone, Parser)]
#[command(name = "prometheus-external-scaler")]
#[command(about = "Serves the external scaler gRPC contract from a Prometheus query")]
pub struct Config {
    /// Prometheus server base URL (e.g. http://prometheus:9090)
    #[arg(long, env)]
    pub server_address: String,

    /// Query evaluated on every scaler call
    #[arg(long, env)]
    pub query: String,

    /// gRPC listen address
    #[arg(long, env, default_value = "0.0.0.0:6000")]
    pub listen_addr: SocketAddr,

    /// Timeout applied by the shared HTTP client to each Prometheus request
    #[arg(long, env, default_value_t = 30)]
    pub query_timeout_secs: u64,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Validated backend settings derived from this configuration
    pub fn backend(&self) -> Result<BackendConfig, ConfigError> {
        BackendConfig::new(&self.server_address, &self.query)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Prometheus connection settings, fixed for the lifetime of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    server_address: String,
    query: String,
}

impl BackendConfig {
    pub fn new(server_address: &str, query: &str) -> Result<Self, ConfigError> {
        if !server_address.starts_with("http://") && !server_address.starts_with("https://") {
            return Err(ConfigError::InvalidServerAddress {
                address: server_address.to_string(),
            });
        }

        if query.trim().is_empty() {
            return Err(ConfigError::EmptyQuery);
        }

        Ok(Self {
            server_address: server_address.trim_end_matches('/').to_string(),
            query: query.to_string(),
        })
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Instant-query endpoint of the configured server
    pub fn query_endpoint(&self) -> String {
        format!("{}/api/v1/query", self.server_address)
    }
}
