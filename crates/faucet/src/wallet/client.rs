use super::address::AddressKind;
use super::balance::BalanceSnapshot;
use super::funding::{SyncOutcome, SyncPolicy};
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::{TransactionLedger, TransactionRecord};
use crate::metrics::WALLET_BALANCE;
use crate::parser::{parse_response, wallet_error};
use crate::process::{CommandRunner, WalletConfig};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Last known unified address, kept in the wallet data directory
pub const ADDRESS_CACHE_FILE: &str = "faucet-address.txt";

/// Number of records included in stats
const STATS_RECENT: usize = 5;

/// Point-in-time view of the faucet wallet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub balance: f64,
    pub address: Option<String>,
    pub transactions_count: usize,
    pub total_sent: f64,
    pub total_requests: u64,
    pub recent: Vec<TransactionRecord>,
}

/// Handle to the external wallet, constructed once at startup and shared by
/// every request handler.
pub struct WalletClient {
    runner: Arc<dyn CommandRunner>,
    pub(super) config: WalletConfig,
    pub(super) policy: SyncPolicy,
    pub(super) ledger: RwLock<TransactionLedger>,
    /// Held for a whole funding workflow or standalone sync
    pub(super) wallet_lock: Mutex<()>,
    /// Held for each wallet process; the tool owns its data directory
    process_lock: Mutex<()>,
}

impl WalletClient {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        config: WalletConfig,
        policy: SyncPolicy,
        ledger: TransactionLedger,
    ) -> Self {
        Self {
            runner,
            config,
            policy,
            ledger: RwLock::new(ledger),
            wallet_lock: Mutex::new(()),
            process_lock: Mutex::new(()),
        }
    }

    /// Run one wallet process. Never more than one runs at a time, whether
    /// it belongs to a funding workflow or a read-only query.
    pub(super) async fn run(&self, command: &str, timeout: Duration) -> FaucetResult<String> {
        let _process = self.process_lock.lock().await;
        self.runner.run(command, timeout).await
    }

    /// Run a wallet command and decode its answer
    pub(super) async fn query(&self, command: &str, timeout: Duration) -> FaucetResult<Value> {
        let raw = self.run(command, timeout).await?;
        let value = parse_response(&raw)?;
        if let Some(message) = wallet_error(&value) {
            return Err(FaucetError::WalletCommand(message));
        }
        Ok(value)
    }

    /// Current pool balances; errors propagate
    pub async fn balance_snapshot(&self) -> FaucetResult<BalanceSnapshot> {
        let value = self.query("balance", self.config.query_timeout).await?;
        let snapshot = BalanceSnapshot::from_json(&value);
        WALLET_BALANCE.set(snapshot.total_zec());
        Ok(snapshot)
    }

    /// Total balance in ZEC. Zero when the wallet cannot be queried.
    pub async fn get_balance(&self) -> f64 {
        match self.balance_snapshot().await {
            Ok(snapshot) => snapshot.total_zec(),
            Err(e) => {
                warn!("Failed to get balance: {}", e);
                0.0
            }
        }
    }

    /// First wallet address of `kind`, falling back to the cached address
    pub async fn get_address(&self, kind: AddressKind) -> Option<String> {
        match self.query("addresses", self.config.query_timeout).await {
            Ok(value) => {
                if let Some(address) = select_address(&value, kind) {
                    if kind == AddressKind::Unified {
                        self.cache_address(&address).await;
                    }
                    return Some(address);
                }
                debug!("Wallet lists no {} address", kind);
            }
            Err(e) => warn!("Failed to list addresses: {}", e),
        }

        self.cached_address(kind).await
    }

    /// Resynchronize the wallet, retrying up to `retries` times
    pub async fn sync_wallet(&self, retries: u32) -> SyncOutcome {
        let _guard = self.wallet_lock.lock().await;
        self.sync_with_retries(retries).await
    }

    /// The newest `limit` ledger records, oldest first
    pub async fn get_transaction_history(&self, limit: usize) -> Vec<TransactionRecord> {
        self.ledger.read().await.recent(limit)
    }

    pub async fn get_stats(&self) -> StatsSnapshot {
        let balance = self.get_balance().await;
        let address = self.get_address(AddressKind::Unified).await;
        let ledger = self.ledger.read().await;

        StatsSnapshot {
            balance,
            address,
            transactions_count: ledger.len(),
            total_sent: ledger.total_sent(),
            total_requests: ledger.total_requests(),
            recent: ledger.recent(STATS_RECENT),
        }
    }

    fn address_cache_path(&self) -> PathBuf {
        self.config.data_dir.join(ADDRESS_CACHE_FILE)
    }

    async fn cache_address(&self, address: &str) {
        if let Err(e) = tokio::fs::write(self.address_cache_path(), address).await {
            debug!("Could not cache faucet address: {}", e);
        }
    }

    async fn cached_address(&self, kind: AddressKind) -> Option<String> {
        let cached = tokio::fs::read_to_string(self.address_cache_path()).await.ok()?;
        let address = cached.trim();
        (!address.is_empty() && kind.matches(address)).then(|| address.to_string())
    }
}

/// Pick the first address of `kind` from an `addresses` response.
///
/// Entries are objects with an `address` field (or bare strings); unified
/// entries may also list their `receivers`, which are searched second.
fn select_address(value: &Value, kind: AddressKind) -> Option<String> {
    let entries = value.as_array()?;

    let direct = entries.iter().find_map(|entry| {
        let address = entry
            .get("address")
            .and_then(Value::as_str)
            .or_else(|| entry.as_str())?;
        (!address.is_empty() && kind.matches(address)).then(|| address.to_string())
    });
    if direct.is_some() {
        return direct;
    }

    let key = kind.receiver_key()?;
    entries.iter().find_map(|entry| {
        let receiver = entry.get("receivers")?.get(key)?.as_str()?;
        (!receiver.is_empty()).then(|| receiver.to_string())
    })
}
