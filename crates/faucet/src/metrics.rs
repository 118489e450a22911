//! Prometheus metrics for the faucet

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref FUNDING_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("faucet_funding_requests_total", "Funding workflow executions"),
        &["outcome"]  // sent | zero_balance | insufficient | failed
    ).unwrap();

    pub static ref FUNDS_SENT_TOTAL: Counter = Counter::new(
        "faucet_funds_sent_zec_total",
        "Total ZEC sent by successful funding requests"
    ).unwrap();

    pub static ref WALLET_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("faucet_wallet_command_duration_seconds", "Wallet tool invocation time")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0]),
        &["command"]
    ).unwrap();

    pub static ref SYNC_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("faucet_sync_attempts_total", "Wallet sync attempts"),
        &["result"]  // synced | height_mismatch | error
    ).unwrap();

    pub static ref WALLET_BALANCE: Gauge = Gauge::new(
        "faucet_wallet_balance_zec",
        "Last observed wallet balance"
    ).unwrap();
}

/// Metrics collector
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        registry.register(Box::new(FUNDING_REQUESTS_TOTAL.clone()))?;
        registry.register(Box::new(FUNDS_SENT_TOTAL.clone()))?;
        registry.register(Box::new(WALLET_COMMAND_DURATION.clone()))?;
        registry.register(Box::new(SYNC_ATTEMPTS_TOTAL.clone()))?;
        registry.register(Box::new(WALLET_BALANCE.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
        })
    }

    /// Gather metrics as Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}
