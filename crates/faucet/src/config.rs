//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use crate::logging::{LogFormat, LoggingConfig};
use crate::wallet::zec_to_zatoshis;
use ::config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Path of the wallet command line tool
    pub cli_path: String,

    /// Wallet data directory (also holds the ledger and address cache)
    pub data_dir: PathBuf,

    /// Lightwallet proxy endpoint handed to the wallet tool
    pub lightwalletd_uri: String,

    /// Chain name passed to the wallet tool
    pub chain: String,

    /// Run the wallet tool inside this container instead of directly
    pub container: Option<String>,

    /// Container runtime used for `exec`
    pub container_runtime: String,

    /// Timeout for ordinary wallet queries (seconds)
    pub query_timeout_secs: u64,

    /// Attempts made by the pre-send synchronization
    pub sync_attempts: u32,

    /// Timeout for a single sync command (seconds)
    pub sync_timeout_secs: u64,

    /// Timeout for the send command (seconds)
    pub send_timeout_secs: u64,

    /// Wait before retrying after a wallet/chain height mismatch (seconds)
    pub height_mismatch_backoff_secs: u64,

    /// Wait before retrying after any other sync failure (seconds)
    pub sync_error_backoff_secs: u64,

    /// Settling delay after a successful sync (seconds)
    pub sync_settle_secs: u64,

    /// Node JSON-RPC endpoint
    pub rpc_url: String,

    /// Node RPC basic-auth user
    pub rpc_user: Option<String>,

    /// Node RPC basic-auth password
    pub rpc_password: Option<String>,

    /// Node RPC request timeout (seconds)
    pub rpc_timeout_secs: u64,

    /// Ask the node to validate recipient addresses
    pub rpc_address_validation: bool,

    /// Smallest amount a caller may request (ZEC)
    pub amount_min: f64,

    /// Largest amount a caller may request (ZEC)
    pub amount_max: f64,

    /// Amount sent when the request names none (ZEC)
    pub amount_default: f64,

    /// Balance below which health reports `degraded` (ZEC)
    pub low_balance_threshold: f64,

    /// Enable per-IP rate limiting
    pub rate_limit_enabled: bool,

    /// Rate limit: maximum requests per time window
    pub rate_limit_requests: u32,

    /// Rate limit: time window in seconds
    pub rate_limit_window_secs: u64,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins
    pub allowed_origins: Vec<String>,

    /// Expose `/metrics`
    pub metrics_enabled: bool,

    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:8080".to_string(),
            cli_path: "/usr/local/bin/zingo-cli".to_string(),
            data_dir: PathBuf::from("/var/zingo"),
            lightwalletd_uri: "http://lightwalletd:9067".to_string(),
            chain: "regtest".to_string(),
            container: None,
            container_runtime: "docker".to_string(),
            query_timeout_secs: 30,
            sync_attempts: 3,
            sync_timeout_secs: 60,
            send_timeout_secs: 60,
            height_mismatch_backoff_secs: 15,
            sync_error_backoff_secs: 10,
            sync_settle_secs: 5,
            rpc_url: "http://127.0.0.1:8232".to_string(),
            rpc_user: None,
            rpc_password: None,
            rpc_timeout_secs: 30,
            rpc_address_validation: false,
            amount_min: 1.0,
            amount_max: 100.0,
            amount_default: 10.0,
            low_balance_threshold: 100.0,
            rate_limit_enabled: true,
            rate_limit_requests: 10,
            rate_limit_window_secs: 3600, // 1 hour
            cors_enabled: true,
            allowed_origins: vec!["*".to_string()],
            metrics_enabled: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetConfig {
    /// Load from a config file (TOML, YAML, JSON, ... by extension).
    /// Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or_else(|| FaucetError::Config("Invalid config path".to_string()))?;

        Config::builder()
            .add_source(File::with_name(path_str))
            .build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .map_err(|e| FaucetError::Config(format!("Failed to load {}: {}", path_str, e)))
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Ok(path) = std::env::var("ZINGO_CLI_PATH") {
            self.cli_path = path;
        }

        if let Ok(dir) = std::env::var("ZINGO_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(uri) = std::env::var("LIGHTWALLETD_URI") {
            self.lightwalletd_uri = uri;
        }

        if let Ok(container) = std::env::var("ZINGO_CONTAINER") {
            self.container = Some(container).filter(|c| !c.is_empty());
        }

        if let Ok(rpc_url) = std::env::var("ZEBRA_RPC_URL") {
            self.rpc_url = rpc_url;
        }

        if let Ok(user) = std::env::var("ZEBRA_RPC_USER") {
            self.rpc_user = Some(user).filter(|u| !u.is_empty());
        }

        if let Ok(pass) = std::env::var("ZEBRA_RPC_PASS") {
            self.rpc_password = Some(pass).filter(|p| !p.is_empty());
        }

        if let Ok(timeout) = std::env::var("ZEBRA_RPC_TIMEOUT") {
            self.rpc_timeout_secs = timeout.parse().unwrap_or(self.rpc_timeout_secs);
        }

        if let Ok(min) = std::env::var("FAUCET_AMOUNT_MIN") {
            self.amount_min = min.parse().unwrap_or(self.amount_min);
        }

        if let Ok(max) = std::env::var("FAUCET_AMOUNT_MAX") {
            self.amount_max = max.parse().unwrap_or(self.amount_max);
        }

        if let Ok(default) = std::env::var("FAUCET_AMOUNT_DEFAULT") {
            self.amount_default = default.parse().unwrap_or(self.amount_default);
        }

        if let Ok(threshold) = std::env::var("FAUCET_LOW_BALANCE_THRESHOLD") {
            self.low_balance_threshold = threshold.parse().unwrap_or(self.low_balance_threshold);
        }

        if let Ok(enabled) = std::env::var("RATE_LIMIT_ENABLED") {
            self.rate_limit_enabled = enabled.to_lowercase() == "true";
        }

        if let Ok(requests) = std::env::var("RATE_LIMIT_REQUESTS") {
            self.rate_limit_requests = requests.parse().unwrap_or(self.rate_limit_requests);
        }

        if let Ok(window) = std::env::var("RATE_LIMIT_WINDOW") {
            self.rate_limit_window_secs = window.parse().unwrap_or(self.rate_limit_window_secs);
        }

        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = LogFormat::from(format.as_str());
        }
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> FaucetResult<()> {
        if self.rpc_url.is_empty() {
            return Err(FaucetError::Config("rpc_url must be set".to_string()));
        }

        if !(self.amount_min > 0.0) || zec_to_zatoshis(self.amount_min) == 0 {
            return Err(FaucetError::Config(
                "amount_min must be at least one zatoshi".to_string(),
            ));
        }

        if self.amount_max < self.amount_min {
            return Err(FaucetError::Config(
                "amount_max must be >= amount_min".to_string(),
            ));
        }

        if self.amount_default < self.amount_min || self.amount_default > self.amount_max {
            return Err(FaucetError::Config(
                "amount_default must be between amount_min and amount_max".to_string(),
            ));
        }

        if self.sync_attempts == 0 {
            return Err(FaucetError::Config("sync_attempts must be at least 1".to_string()));
        }

        if self.query_timeout_secs == 0 || self.sync_timeout_secs == 0 || self.send_timeout_secs == 0 {
            return Err(FaucetError::Config("wallet timeouts must be positive".to_string()));
        }

        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Get rate limit duration
    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
