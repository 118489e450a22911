//! File-backed ledger of completed faucet sends
//!
//! The whole file is read once on open and rewritten on every append. The
//! canonical on-disk shape is an object carrying the running aggregates:
//!
//! ```json
//! { "total_sent": 20.0, "total_requests": 2, "transactions": [ ... ] }
//! ```
//!
//! A bare array of records (the older shape) is accepted on open, validated
//! and migrated; the next append writes the object shape.

use crate::error::{FaucetError, FaucetResult};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of the ledger inside the wallet data directory
pub const LEDGER_FILE_NAME: &str = "faucet-history.json";

/// Current UTC time as ISO-8601 with an explicit `Z` suffix
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// One completed send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Recipient address
    pub to_address: String,
    /// Amount accepted by the wallet (ZEC)
    pub amount: f64,
    /// Transaction id returned by the wallet
    pub txid: String,
    /// UTC timestamp, `Z` suffixed
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl TransactionRecord {
    pub fn new(to_address: String, amount: f64, txid: String, memo: Option<String>) -> Self {
        Self {
            to_address,
            amount,
            txid,
            timestamp: utc_timestamp(),
            memo,
        }
    }

    fn validate(&self) -> FaucetResult<()> {
        if self.txid.is_empty() || self.to_address.is_empty() {
            return Err(FaucetError::Internal(
                "ledger record without txid or address".to_string(),
            ));
        }
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(FaucetError::Internal(format!(
                "ledger record {} has invalid amount {}",
                self.txid, self.amount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct LedgerFile {
    total_sent: f64,
    total_requests: u64,
    transactions: Vec<TransactionRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredLedger {
    Aggregated(LedgerFile),
    Legacy(Vec<TransactionRecord>),
}

/// Append-only transaction ledger
pub struct TransactionLedger {
    file_path: PathBuf,
    state: LedgerFile,
}

impl TransactionLedger {
    /// Open the ledger stored in `data_dir`, creating an empty one in memory
    /// when the file does not exist yet.
    pub fn open(data_dir: &Path) -> FaucetResult<Self> {
        Self::open_file(data_dir.join(LEDGER_FILE_NAME))
    }

    pub fn open_file(file_path: PathBuf) -> FaucetResult<Self> {
        if !file_path.exists() {
            info!("No ledger at {}, starting empty", file_path.display());
            return Ok(Self {
                file_path,
                state: LedgerFile::default(),
            });
        }

        let content = fs::read_to_string(&file_path)
            .map_err(|e| FaucetError::Internal(format!("Failed to read ledger: {}", e)))?;

        let stored: StoredLedger = serde_json::from_str(&content)
            .map_err(|e| FaucetError::Internal(format!("Failed to parse ledger: {}", e)))?;

        let state = match stored {
            StoredLedger::Aggregated(file) => {
                for record in &file.transactions {
                    record.validate()?;
                }
                reconcile(file)
            }
            StoredLedger::Legacy(transactions) => {
                for record in &transactions {
                    record.validate()?;
                }
                warn!(
                    "Ledger {} uses the bare-array format, migrating {} records",
                    file_path.display(),
                    transactions.len()
                );
                aggregate(transactions)
            }
        };

        info!(
            "Loaded ledger with {} transactions ({} ZEC sent)",
            state.transactions.len(),
            state.total_sent
        );

        Ok(Self { file_path, state })
    }

    /// Append a record and rewrite the file.
    ///
    /// The record stays in memory even when the write fails.
    pub fn append(&mut self, record: TransactionRecord) -> FaucetResult<()> {
        self.state.total_sent += record.amount;
        self.state.total_requests += 1;
        self.state.transactions.push(record);
        self.save()
    }

    fn save(&self) -> FaucetResult<()> {
        let json = serde_json::to_string_pretty(&self.state)
            .map_err(|e| FaucetError::LedgerWrite(format!("serialize: {}", e)))?;

        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FaucetError::LedgerWrite(format!("create dir: {}", e)))?;
        }

        // Write beside the target, then rename over it
        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| FaucetError::LedgerWrite(format!("write: {}", e)))?;
        fs::rename(&tmp_path, &self.file_path)
            .map_err(|e| FaucetError::LedgerWrite(format!("rename: {}", e)))?;

        debug!("Ledger saved to {}", self.file_path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn len(&self) -> usize {
        self.state.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.transactions.is_empty()
    }

    pub fn total_sent(&self) -> f64 {
        self.state.total_sent
    }

    pub fn total_requests(&self) -> u64 {
        self.state.total_requests
    }

    pub fn all(&self) -> &[TransactionRecord] {
        &self.state.transactions
    }

    /// The newest `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<TransactionRecord> {
        let txs = &self.state.transactions;
        let start = txs.len().saturating_sub(limit);
        txs[start..].to_vec()
    }
}

fn aggregate(transactions: Vec<TransactionRecord>) -> LedgerFile {
    LedgerFile {
        total_sent: transactions.iter().map(|tx| tx.amount).sum(),
        total_requests: transactions.len() as u64,
        transactions,
    }
}

fn reconcile(file: LedgerFile) -> LedgerFile {
    let expected = aggregate(file.transactions.clone());
    let sent_matches = (expected.total_sent - file.total_sent).abs() < 1e-8;

    if file.total_requests != expected.total_requests || !sent_matches {
        warn!(
            "Ledger aggregates (sent={}, requests={}) disagree with records (sent={}, requests={}), recomputing",
            file.total_sent, file.total_requests, expected.total_sent, expected.total_requests
        );
        expected
    } else {
        file
    }
}
