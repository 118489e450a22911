//! The funding workflow: sync, verify balance, send, record, confirm.
//!
//! Executions are serialized through the client's wallet lock, so at most
//! one send is in flight and ledger appends never interleave.

use super::balance::{zatoshis_to_zec, zec_to_zatoshis};
use super::client::WalletClient;
use crate::config::FaucetConfig;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::TransactionRecord;
use crate::metrics::{FUNDING_REQUESTS_TOTAL, FUNDS_SENT_TOTAL, SYNC_ATTEMPTS_TOTAL};
use crate::parser::{parse_response, wallet_error};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Retry and timing rules around wallet synchronization
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Attempts made by the pre-send sync
    pub attempts: u32,
    pub sync_timeout: Duration,
    pub send_timeout: Duration,
    /// Wait after output reporting a wallet/chain height mismatch
    pub height_mismatch_backoff: Duration,
    /// Wait after any other sync failure
    pub error_backoff: Duration,
    /// Wait after a successful sync before using the wallet
    pub settle_delay: Duration,
    /// Case-insensitive substrings identifying a transient height mismatch
    pub height_mismatch_markers: Vec<String>,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            sync_timeout: Duration::from_secs(60),
            send_timeout: Duration::from_secs(60),
            height_mismatch_backoff: Duration::from_secs(15),
            error_backoff: Duration::from_secs(10),
            settle_delay: Duration::from_secs(5),
            height_mismatch_markers: vec![
                "wallet height".to_string(),
                "height mismatch".to_string(),
                "greater than chain height".to_string(),
            ],
        }
    }
}

impl From<&FaucetConfig> for SyncPolicy {
    fn from(config: &FaucetConfig) -> Self {
        Self {
            attempts: config.sync_attempts,
            sync_timeout: Duration::from_secs(config.sync_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            height_mismatch_backoff: Duration::from_secs(config.height_mismatch_backoff_secs),
            error_backoff: Duration::from_secs(config.sync_error_backoff_secs),
            settle_delay: Duration::from_secs(config.sync_settle_secs),
            ..Self::default()
        }
    }
}

impl SyncPolicy {
    fn is_height_mismatch(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.height_mismatch_markers
            .iter()
            .any(|marker| text.contains(&marker.to_lowercase()))
    }
}

/// Result of a sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced,
    /// Height mismatch persisted through every attempt
    HeightMismatch,
    Failed(String),
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced)
    }
}

/// Result of one funding request.
///
/// Serializes as `{success: true, transaction_id, timestamp}` or
/// `{success: false, error}`.
#[derive(Debug)]
pub enum FundingOutcome {
    Sent {
        transaction_id: String,
        timestamp: String,
    },
    Failed(FaucetError),
}

impl FundingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FundingOutcome::Sent { .. })
    }

    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            FundingOutcome::Sent { transaction_id, .. } => Some(transaction_id),
            FundingOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FaucetError> {
        match self {
            FundingOutcome::Sent { .. } => None,
            FundingOutcome::Failed(e) => Some(e),
        }
    }
}

#[derive(Serialize)]
struct OutcomeBody<'a> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Serialize for FundingOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let body = match self {
            FundingOutcome::Sent { transaction_id, timestamp } => OutcomeBody {
                success: true,
                transaction_id: Some(transaction_id),
                timestamp: Some(timestamp),
                error: None,
            },
            FundingOutcome::Failed(e) => OutcomeBody {
                success: false,
                transaction_id: None,
                timestamp: None,
                error: Some(e.to_string()),
            },
        };
        body.serialize(serializer)
    }
}

impl WalletClient {
    /// Send `amount` ZEC to `to_address`. Never fails: every error becomes
    /// `FundingOutcome::Failed`.
    pub async fn send(&self, to_address: &str, amount: f64, memo: Option<&str>) -> FundingOutcome {
        let _guard = self.wallet_lock.lock().await;
        info!(to = %to_address, amount, "Funding request started");

        match self.fund(to_address, amount, memo).await {
            Ok(record) => {
                FUNDING_REQUESTS_TOTAL.with_label_values(&["sent"]).inc();
                FUNDS_SENT_TOTAL.inc_by(record.amount);
                info!(txid = %record.txid, amount = record.amount, "Funding request completed");
                FundingOutcome::Sent {
                    transaction_id: record.txid,
                    timestamp: record.timestamp,
                }
            }
            Err(e) => {
                let label = match e {
                    FaucetError::ZeroBalance => "zero_balance",
                    FaucetError::InsufficientBalance { .. } => "insufficient",
                    _ => "failed",
                };
                FUNDING_REQUESTS_TOTAL.with_label_values(&[label]).inc();
                warn!("Funding request failed: {}", e);
                FundingOutcome::Failed(e)
            }
        }
    }

    async fn fund(
        &self,
        to_address: &str,
        amount: f64,
        memo: Option<&str>,
    ) -> FaucetResult<TransactionRecord> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(FaucetError::InvalidAmount(format!("{} is not a positive amount", amount)));
        }
        let zatoshis = zec_to_zatoshis(amount);
        if zatoshis == 0 {
            return Err(FaucetError::InvalidAmount(format!("{} ZEC is less than one zatoshi", amount)));
        }
        // what the wallet is asked to send, and what the ledger records
        let amount = zatoshis_to_zec(zatoshis);
        let memo = memo.and_then(clean_memo);

        // 1. Pre-send synchronization; never fatal
        match self.sync_with_retries(self.policy.attempts).await {
            SyncOutcome::Synced => debug!("Pre-send sync complete"),
            SyncOutcome::HeightMismatch => {
                warn!("Wallet height still mismatched after sync retries, proceeding")
            }
            SyncOutcome::Failed(reason) => {
                warn!("Pre-send sync failed ({}), proceeding", reason)
            }
        }

        // 2. Balance verification
        let balance = self.get_balance().await;
        if balance == 0.0 {
            return Err(FaucetError::ZeroBalance);
        }
        if balance < amount {
            return Err(FaucetError::InsufficientBalance {
                have: balance,
                need: amount,
            });
        }

        // 3. Send submission
        let command = send_command(to_address, zatoshis, memo.as_deref());
        let response = self.query(&command, self.policy.send_timeout).await?;
        let txid = extract_txid(&response).ok_or(FaucetError::NoTransactionId)?;
        info!(txid = %txid, "Wallet accepted send");

        // 4. Recording and confirmation
        let record = TransactionRecord::new(to_address.to_string(), amount, txid, memo);
        if let Err(e) = self.ledger.write().await.append(record.clone()) {
            error!(txid = %record.txid, "Send succeeded but was not persisted: {}", e);
        }

        if let SyncOutcome::Failed(reason) = self.sync_with_retries(1).await {
            warn!("Post-send sync failed: {}", reason);
        }

        Ok(record)
    }

    /// Sync without taking the wallet lock; callers hold it.
    pub(super) async fn sync_with_retries(&self, attempts: u32) -> SyncOutcome {
        let policy = &self.policy;

        for attempt in 1..=attempts {
            debug!(attempt, attempts, "Syncing wallet");
            let result = self.run("sync", policy.sync_timeout).await;

            let text = match &result {
                Ok(output) => output.clone(),
                Err(e) => e.to_string(),
            };
            if policy.is_height_mismatch(&text) {
                SYNC_ATTEMPTS_TOTAL.with_label_values(&["height_mismatch"]).inc();
                if attempt < attempts {
                    warn!(attempt, "Wallet height mismatch, retrying sync");
                    tokio::time::sleep(policy.height_mismatch_backoff).await;
                    continue;
                }
                warn!("Wallet height mismatch persisted after {} attempts", attempts);
                return SyncOutcome::HeightMismatch;
            }

            let result = result.and_then(|output| match parse_response(&output) {
                Ok(value) => match wallet_error(&value) {
                    Some(message) => Err(FaucetError::WalletCommand(message)),
                    None => Ok(()),
                },
                // plain or empty output still means the sync ran
                Err(_) => Ok(()),
            });

            match result {
                Ok(()) => {
                    SYNC_ATTEMPTS_TOTAL.with_label_values(&["synced"]).inc();
                    info!(attempt, "Wallet synced");
                    tokio::time::sleep(policy.settle_delay).await;
                    return SyncOutcome::Synced;
                }
                Err(e) => {
                    SYNC_ATTEMPTS_TOTAL.with_label_values(&["error"]).inc();
                    if attempt < attempts {
                        warn!(attempt, "Sync failed: {}, retrying", e);
                        tokio::time::sleep(policy.error_backoff).await;
                        continue;
                    }
                    return SyncOutcome::Failed(e.to_string());
                }
            }
        }

        SyncOutcome::Failed("no sync attempts allowed".to_string())
    }
}

/// `send <address> <zatoshis> ["memo"]`, with the memo escaped to stay
/// inside its quotes
fn send_command(to_address: &str, zatoshis: u64, memo: Option<&str>) -> String {
    let mut command = format!("send {} {}", to_address, zatoshis);
    if let Some(memo) = memo {
        let quoted = memo.replace('\\', "\\\\").replace('"', "\\\"");
        command.push_str(&format!(" \"{}\"", quoted));
    }
    command
}

/// The memo on a single trimmed line; `None` when nothing is left
fn clean_memo(memo: &str) -> Option<String> {
    let line: String = memo
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let line = line.trim();
    (!line.is_empty()).then(|| line.to_string())
}

fn extract_txid(value: &Value) -> Option<String> {
    let txid = value
        .get("txid")
        .and_then(Value::as_str)
        .or_else(|| value.get("txids")?.get(0)?.as_str())?;
    (!txid.is_empty()).then(|| txid.to_string())
}
