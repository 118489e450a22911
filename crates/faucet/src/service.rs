//! Faucet service core logic

use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::{utc_timestamp, TransactionRecord};
use crate::metrics::MetricsCollector;
use crate::rpc::NodeRpcClient;
use crate::wallet::{
    validate_address, zatoshis_to_zec, zec_to_zatoshis, AddressKind, FundingOutcome,
    StatsSnapshot, SyncOutcome, WalletClient,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest memo accepted, in bytes
pub const MAX_MEMO_BYTES: usize = 512;

/// Largest page `/history` returns
pub const HISTORY_LIMIT_MAX: usize = 1000;

pub const HISTORY_LIMIT_DEFAULT: usize = 100;

/// Idle per-IP limiters kept in memory
const RATE_LIMITER_CAPACITY: u64 = 10_000;

type RateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Funding request body
#[derive(Debug, Clone, Deserialize)]
pub struct FundingRequest {
    pub address: String,
    pub amount: Option<f64>,
    pub memo: Option<String>,
}

/// Successful funding response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingResponse {
    pub success: bool,
    pub txid: String,
    pub address: String,
    pub amount: f64,
    pub new_balance: f64,
    pub timestamp: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of probing the node and the wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub node_connected: bool,
    pub block_height: Option<u64>,
    pub wallet_reachable: bool,
    pub balance: f64,
    pub issues: Vec<String>,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub node_connected: bool,
    pub wallet_reachable: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub wallet: StatsSnapshot,
    pub last_request: Option<String>,
    pub uptime_seconds: u64,
    pub network: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub count: usize,
    pub limit: usize,
    pub transactions: Vec<TransactionRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressReport {
    pub address: Option<String>,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    pub current_balance: f64,
}

/// Faucet service
pub struct FaucetService {
    config: FaucetConfig,
    wallet: Arc<WalletClient>,
    node: NodeRpcClient,
    ip_quota: Option<Quota>,
    ip_rate_limiters: moka::future::Cache<IpAddr, Arc<RateLimiterImpl>>,
    clock: DefaultClock,
    metrics: MetricsCollector,
    started_at: Instant,
}

impl FaucetService {
    pub fn new(config: FaucetConfig, wallet: Arc<WalletClient>) -> FaucetResult<Self> {
        let node = NodeRpcClient::new(&config)?;

        let ip_quota = if config.rate_limit_enabled {
            Some(ip_quota(&config)?)
        } else {
            None
        };

        let ip_rate_limiters = moka::future::Cache::builder()
            .max_capacity(RATE_LIMITER_CAPACITY)
            .time_to_idle(config.rate_limit_duration())
            .build();

        let metrics = MetricsCollector::new()
            .map_err(|e| FaucetError::Internal(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            config,
            wallet,
            node,
            ip_quota,
            ip_rate_limiters,
            clock: DefaultClock::default(),
            metrics,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &FaucetConfig {
        &self.config
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Validate a funding request and run the funding workflow
    pub async fn request_funds(
        &self,
        request: FundingRequest,
        ip_addr: IpAddr,
    ) -> FaucetResult<FundingResponse> {
        info!("Funding request for {} from {}", request.address, ip_addr);

        // 1. Validate input
        validate_address(&request.address)?;
        let amount = self.resolve_amount(request.amount)?;
        let memo = request.memo.filter(|m| !m.trim().is_empty());
        if let Some(memo) = &memo {
            if memo.len() > MAX_MEMO_BYTES {
                return Err(FaucetError::InvalidMemo(format!(
                    "Memo must be at most {} bytes",
                    MAX_MEMO_BYTES
                )));
            }
        }

        // 2. Check rate limits
        self.check_rate_limit(ip_addr).await?;

        // 3. Optional node-side address check
        if self.config.rpc_address_validation
            && !self.node.validate_address(&request.address).await?
        {
            return Err(FaucetError::InvalidAddress(
                "Address rejected by node".to_string(),
            ));
        }

        // 4. Fund
        match self.wallet.send(&request.address, amount, memo.as_deref()).await {
            FundingOutcome::Sent {
                transaction_id,
                timestamp,
            } => {
                let new_balance = self.wallet.get_balance().await;
                Ok(FundingResponse {
                    success: true,
                    message: format!(
                        "Successfully sent {} ZEC. Verify TXID: {}",
                        amount, transaction_id
                    ),
                    txid: transaction_id,
                    address: request.address,
                    amount,
                    new_balance,
                    timestamp,
                })
            }
            FundingOutcome::Failed(e) => Err(e),
        }
    }

    fn resolve_amount(&self, requested: Option<f64>) -> FaucetResult<f64> {
        let amount = requested.unwrap_or(self.config.amount_default);
        let (min, max) = (self.config.amount_min, self.config.amount_max);

        if !amount.is_finite() || amount < min || amount > max {
            return Err(FaucetError::InvalidAmount(format!(
                "Amount must be between {} and {} ZEC",
                min, max
            )));
        }

        // the response reports what the wallet is actually asked to send
        let zatoshis = zec_to_zatoshis(amount);
        if zatoshis == 0 {
            return Err(FaucetError::InvalidAmount(
                "Amount must be at least one zatoshi".to_string(),
            ));
        }
        Ok(zatoshis_to_zec(zatoshis))
    }

    async fn check_rate_limit(&self, ip_addr: IpAddr) -> FaucetResult<()> {
        let Some(quota) = self.ip_quota else {
            return Ok(());
        };

        let limiter = self
            .ip_rate_limiters
            .get_with(ip_addr, async move { Arc::new(RateLimiter::direct(quota)) })
            .await;

        limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now()).as_secs().max(1);
            warn!("Rate limit exceeded for {}, retry in {}s", ip_addr, wait);
            FaucetError::RateLimitExceeded(wait)
        })?;

        debug!("Rate limit passed for IP: {}", ip_addr);
        Ok(())
    }

    /// Probe the node and the wallet
    pub async fn health(&self) -> HealthReport {
        let mut issues = Vec::new();

        let block_height = match self.node.get_block_count().await {
            Ok(height) => Some(height),
            Err(e) => {
                warn!("Node health probe failed: {}", e);
                issues.push("node_not_responding".to_string());
                None
            }
        };

        let balance = match self.wallet.balance_snapshot().await {
            Ok(snapshot) => Some(snapshot.total_zec()),
            Err(e) => {
                warn!("Wallet health probe failed: {}", e);
                issues.push("wallet_unreachable".to_string());
                None
            }
        };

        let low_balance = balance.map_or(false, |b| b < self.config.low_balance_threshold);
        if low_balance {
            issues.push(format!(
                "low_balance: below {} ZEC",
                self.config.low_balance_threshold
            ));
        }

        let status = if block_height.is_none() || balance.is_none() {
            HealthStatus::Unhealthy
        } else if low_balance {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            node_connected: block_height.is_some(),
            block_height,
            wallet_reachable: balance.is_some(),
            balance: balance.unwrap_or(0.0),
            issues,
            uptime_seconds: self.uptime_seconds(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: utc_timestamp(),
        }
    }

    /// Ready when both the node and the wallet answer
    pub async fn readiness(&self) -> ReadinessReport {
        let node_connected = self.node.get_block_count().await.is_ok();
        let wallet_reachable = self.wallet.balance_snapshot().await.is_ok();

        ReadinessReport {
            ready: node_connected && wallet_reachable,
            node_connected,
            wallet_reachable,
            timestamp: utc_timestamp(),
        }
    }

    pub async fn stats(&self) -> StatsReport {
        let wallet = self.wallet.get_stats().await;
        let last_request = wallet.recent.last().map(|r| r.timestamp.clone());

        StatsReport {
            wallet,
            last_request,
            uptime_seconds: self.uptime_seconds(),
            network: self.config.chain.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Newest ledger records; `limit` is clamped to `1..=1000`
    pub async fn history(&self, limit: Option<usize>) -> HistoryReport {
        let limit = limit
            .unwrap_or(HISTORY_LIMIT_DEFAULT)
            .clamp(1, HISTORY_LIMIT_MAX);
        let transactions = self.wallet.get_transaction_history(limit).await;

        HistoryReport {
            count: transactions.len(),
            limit,
            transactions,
        }
    }

    pub async fn address(&self) -> AddressReport {
        AddressReport {
            address: self.wallet.get_address(AddressKind::Unified).await,
            balance: self.wallet.get_balance().await,
        }
    }

    /// Manual wallet synchronization
    pub async fn sync(&self) -> FaucetResult<SyncReport> {
        let outcome = self.wallet.sync_wallet(self.config.sync_attempts).await;
        let current_balance = self.wallet.get_balance().await;

        match outcome {
            SyncOutcome::Synced => Ok(SyncReport {
                success: true,
                message: "Wallet synced successfully".to_string(),
                current_balance,
            }),
            SyncOutcome::HeightMismatch => Ok(SyncReport {
                success: false,
                message: "Wallet height is ahead of the chain, retry later".to_string(),
                current_balance,
            }),
            SyncOutcome::Failed(reason) => Err(FaucetError::WalletCommand(reason)),
        }
    }

    /// Prometheus text exposition
    pub fn render_metrics(&self) -> FaucetResult<String> {
        self.metrics
            .gather()
            .map_err(|e| FaucetError::Internal(format!("Failed to encode metrics: {}", e)))
    }
}

/// `rate_limit_requests` per `rate_limit_window_secs`, fully bursty
fn ip_quota(config: &FaucetConfig) -> FaucetResult<Quota> {
    let burst = NonZeroU32::new(config.rate_limit_requests).ok_or_else(|| {
        FaucetError::Config("rate_limit_requests must be at least 1".to_string())
    })?;
    let period = config.rate_limit_duration() / burst.get();

    Quota::with_period(period)
        .map(|quota| quota.allow_burst(burst))
        .ok_or_else(|| FaucetError::Config("rate limit window must be positive".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fake_node, wallet_client, ScriptedRunner};
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    const TO: &str = "tmGWyihj4Q64yHJutdHKC5FEg2CjzSf2CJ4";
    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn funded_runner(zec: u64) -> Arc<ScriptedRunner> {
        let runner = ScriptedRunner::new();
        runner.set("sync", "{}");
        runner.set("balance", &format!(r#"{{"orchard_balance": {}}}"#, zec * 100_000_000));
        runner
    }

    fn service(config: FaucetConfig, runner: Arc<ScriptedRunner>, dir: &TempDir) -> FaucetService {
        let wallet = Arc::new(wallet_client(runner, dir.path()));
        FaucetService::new(config, wallet).unwrap()
    }

    fn request(amount: Option<f64>) -> FundingRequest {
        FundingRequest {
            address: TO.to_string(),
            amount,
            memo: None,
        }
    }

    #[tokio::test]
    async fn test_request_uses_default_amount() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        runner.push("send", Ok(r#"{"txid": "abc123"}"#.to_string()));
        let service = service(FaucetConfig::default(), runner.clone(), &dir);

        let response = service.request_funds(request(None), LOCALHOST).await.unwrap();
        assert!(response.success);
        assert_eq!(response.txid, "abc123");
        assert_eq!(response.amount, 10.0);
        assert_eq!(response.new_balance, 500.0);
        assert!(response.message.contains("abc123"));
        assert_eq!(runner.count("send"), 1);
    }

    #[tokio::test]
    async fn test_amount_bounds() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        let service = service(FaucetConfig::default(), runner.clone(), &dir);

        for amount in [0.5, 100.5, f64::INFINITY] {
            let err = service.request_funds(request(Some(amount)), LOCALHOST).await.unwrap_err();
            assert!(matches!(err, FaucetError::InvalidAmount(_)), "{} accepted", amount);
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_amount_is_reported_in_whole_zatoshis() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        runner.push("send", Ok(r#"{"txid": "fine"}"#.to_string()));
        let config = FaucetConfig {
            amount_min: 1e-9,
            ..FaucetConfig::default()
        };
        let service = service(config, runner.clone(), &dir);

        let response = service
            .request_funds(request(Some(1.234567891)), LOCALHOST)
            .await
            .unwrap();
        assert_eq!(response.amount, 1.23456789);

        let err = service.request_funds(request(Some(1e-9)), LOCALHOST).await.unwrap_err();
        assert!(matches!(err, FaucetError::InvalidAmount(_)));
        assert_eq!(runner.count("send"), 1);
    }

    #[tokio::test]
    async fn test_invalid_address_and_memo_rejected_before_wallet() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        let service = service(FaucetConfig::default(), runner.clone(), &dir);

        let bad_address = FundingRequest {
            address: "bc1qnotzcash".to_string(),
            amount: None,
            memo: None,
        };
        assert!(matches!(
            service.request_funds(bad_address, LOCALHOST).await,
            Err(FaucetError::InvalidAddress(_))
        ));

        let long_memo = FundingRequest {
            memo: Some("m".repeat(MAX_MEMO_BYTES + 1)),
            ..request(None)
        };
        assert!(matches!(
            service.request_funds(long_memo, LOCALHOST).await,
            Err(FaucetError::InvalidMemo(_))
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_balance_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let service = service(FaucetConfig::default(), funded_runner(0), &dir);

        let err = service.request_funds(request(None), LOCALHOST).await.unwrap_err();
        assert!(matches!(err, FaucetError::ZeroBalance));
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        runner.push("send", Ok(r#"{"txid": "one"}"#.to_string()));
        runner.push("send", Ok(r#"{"txid": "two"}"#.to_string()));
        runner.push("send", Ok(r#"{"txid": "three"}"#.to_string()));
        let config = FaucetConfig {
            rate_limit_requests: 2,
            ..FaucetConfig::default()
        };
        let service = service(config, runner, &dir);

        assert!(service.request_funds(request(Some(1.0)), LOCALHOST).await.is_ok());
        assert!(service.request_funds(request(Some(1.0)), LOCALHOST).await.is_ok());
        let err = service.request_funds(request(Some(1.0)), LOCALHOST).await.unwrap_err();
        assert!(matches!(err, FaucetError::RateLimitExceeded(wait) if wait >= 1));

        // a different client still has its own quota
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        assert!(service.request_funds(request(Some(1.0)), other).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        runner.set("send", r#"{"txid": "same"}"#);
        let config = FaucetConfig {
            rate_limit_enabled: false,
            rate_limit_requests: 1,
            ..FaucetConfig::default()
        };
        let service = service(config, runner, &dir);

        for _ in 0..3 {
            assert!(service.request_funds(request(Some(1.0)), LOCALHOST).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_node_address_validation() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        let config = FaucetConfig {
            rpc_url: fake_node(serde_json::json!(100), &[]).await,
            rpc_address_validation: true,
            ..FaucetConfig::default()
        };
        let service = service(config, runner.clone(), &dir);

        let err = service.request_funds(request(None), LOCALHOST).await.unwrap_err();
        assert!(matches!(err, FaucetError::InvalidAddress(m) if m.contains("node")));
        assert_eq!(runner.count("send"), 0);
    }

    #[tokio::test]
    async fn test_health_states() {
        let dir = TempDir::new().unwrap();
        let node = fake_node(serde_json::json!(200), &[]).await;
        let config = FaucetConfig {
            rpc_url: node,
            ..FaucetConfig::default()
        };

        let healthy = service(config.clone(), funded_runner(1000), &dir).health().await;
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.block_height, Some(200));
        assert_eq!(healthy.balance, 1000.0);
        assert!(healthy.issues.is_empty());

        let degraded = service(config.clone(), funded_runner(50), &dir).health().await;
        assert_eq!(degraded.status, HealthStatus::Degraded);
        assert!(degraded.issues.iter().any(|i| i.starts_with("low_balance")));

        let no_wallet = service(config, ScriptedRunner::new(), &dir).health().await;
        assert_eq!(no_wallet.status, HealthStatus::Unhealthy);
        assert!(no_wallet.issues.contains(&"wallet_unreachable".to_string()));

        let no_node = FaucetConfig {
            rpc_url: "http://127.0.0.1:1/".to_string(),
            rpc_timeout_secs: 1,
            ..FaucetConfig::default()
        };
        let report = service(no_node, funded_runner(1000), &dir).health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.node_connected);
        assert!(report.issues.contains(&"node_not_responding".to_string()));
    }

    #[tokio::test]
    async fn test_history_limit_is_clamped() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(500);
        runner.set("send", r#"{"txid": "t"}"#);
        let config = FaucetConfig {
            rate_limit_enabled: false,
            ..FaucetConfig::default()
        };
        let service = service(config, runner, &dir);
        for _ in 0..3 {
            service.request_funds(request(Some(1.0)), LOCALHOST).await.unwrap();
        }

        assert_eq!(service.history(None).await.limit, HISTORY_LIMIT_DEFAULT);
        assert_eq!(service.history(Some(5000)).await.limit, HISTORY_LIMIT_MAX);
        let one = service.history(Some(0)).await;
        assert_eq!(one.limit, 1);
        assert_eq!(one.count, 1);
        assert_eq!(service.history(Some(2)).await.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_manual_sync_reports() {
        let dir = TempDir::new().unwrap();
        let runner = funded_runner(20);
        let service = service(FaucetConfig::default(), runner.clone(), &dir);
        let report = service.sync().await.unwrap();
        assert!(report.success);
        assert_eq!(report.current_balance, 20.0);

        for _ in 0..3 {
            runner.push("sync", Err(FaucetError::ProcessFailed("lightwalletd down".into())));
        }
        assert!(matches!(service.sync().await, Err(FaucetError::WalletCommand(_))));
    }

    #[test]
    fn test_quota_requires_requests() {
        let config = FaucetConfig {
            rate_limit_requests: 0,
            ..FaucetConfig::default()
        };
        assert!(matches!(ip_quota(&config), Err(FaucetError::Config(_))));
    }
}
