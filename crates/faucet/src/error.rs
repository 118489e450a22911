//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Failed to start wallet process: {0}")]
    ProcessSpawn(String),

    #[error("Wallet process timed out after {0} seconds")]
    ProcessTimeout(u64),

    #[error("Wallet process failed: {0}")]
    ProcessFailed(String),

    #[error("Malformed wallet response: {0}")]
    MalformedResponse(String),

    #[error("Wallet command rejected: {0}")]
    WalletCommand(String),

    #[error("Faucet wallet has zero balance")]
    ZeroBalance,

    #[error("Insufficient balance: have {have} ZEC, need {need} ZEC")]
    InsufficientBalance { have: f64, need: f64 },

    #[error("No transaction ID returned by wallet")]
    NoTransactionId,

    #[error("Failed to write transaction ledger: {0}")]
    LedgerWrite(String),

    #[error("Rate limit exceeded: try again in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid memo: {0}")]
    InvalidMemo(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    /// Stable machine-readable code used in JSON error bodies
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::ProcessSpawn(_) => "PROCESS_SPAWN_ERROR",
            FaucetError::ProcessTimeout(_) => "PROCESS_TIMEOUT",
            FaucetError::ProcessFailed(_) => "PROCESS_FAILED",
            FaucetError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            FaucetError::WalletCommand(_) => "WALLET_COMMAND_FAILED",
            FaucetError::ZeroBalance => "ZERO_BALANCE",
            FaucetError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FaucetError::NoTransactionId => "NO_TRANSACTION_ID",
            FaucetError::LedgerWrite(_) => "LEDGER_WRITE_ERROR",
            FaucetError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            FaucetError::InvalidAddress(_) => "INVALID_ADDRESS",
            FaucetError::InvalidAmount(_) => "INVALID_AMOUNT",
            FaucetError::InvalidMemo(_) => "INVALID_MEMO",
            FaucetError::InvalidRequest(_) => "INVALID_REQUEST",
            FaucetError::Rpc(_) => "RPC_ERROR",
            FaucetError::Config(_) => "CONFIG_ERROR",
            FaucetError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FaucetError::InvalidAddress(_)
            | FaucetError::InvalidAmount(_)
            | FaucetError::InvalidMemo(_)
            | FaucetError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            FaucetError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            FaucetError::ZeroBalance | FaucetError::InsufficientBalance { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FaucetError::Rpc(_) => StatusCode::BAD_GATEWAY,
            FaucetError::ProcessTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
            "timestamp": crate::ledger::utc_timestamp()
        }));

        (self.status_code(), body).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FaucetError::ZeroBalance.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            FaucetError::InvalidAmount("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FaucetError::RateLimitExceeded(60).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(FaucetError::NoTransactionId.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_messages_carry_amounts() {
        let err = FaucetError::InsufficientBalance { have: 5.0, need: 10.0 };
        let msg = err.to_string();
        assert!(msg.contains("Insufficient"));
        assert!(msg.contains("have 5 ZEC"));
        assert!(msg.contains("need 10 ZEC"));
        assert!(FaucetError::ZeroBalance.to_string().contains("zero balance"));
    }
}
