//! Regtest faucet service for Zcash development networks
//!
//! Drives an external wallet command line tool to hand out test funds:
//! - Sync-retry, balance check, send and record workflow
//! - Persistent JSON transaction ledger
//! - Per-IP rate limiting
//! - Health, readiness and Prometheus metrics endpoints

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod process;
pub mod rpc;
pub mod service;
pub mod wallet;

#[cfg(test)]
mod test_support;

pub use config::FaucetConfig;
pub use error::{FaucetError, FaucetResult};
pub use ledger::{TransactionLedger, TransactionRecord};
pub use process::{CommandRunner, ExecStrategy, WalletCli, WalletConfig};
pub use rpc::NodeRpcClient;
pub use service::FaucetService;
pub use wallet::{FundingOutcome, SyncOutcome, SyncPolicy, WalletClient};
