use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address families the faucet understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Transparent,
    Sapling,
    Unified,
}

impl AddressKind {
    /// Leading character the wallet uses for this kind
    pub fn prefix(&self) -> char {
        match self {
            AddressKind::Transparent => 't',
            AddressKind::Sapling => 'z',
            AddressKind::Unified => 'u',
        }
    }

    pub fn matches(&self, address: &str) -> bool {
        address.starts_with(self.prefix())
    }

    /// Key of this kind inside a unified address' `receivers` map
    pub(crate) fn receiver_key(&self) -> Option<&'static str> {
        match self {
            AddressKind::Transparent => Some("transparent"),
            AddressKind::Sapling => Some("sapling"),
            AddressKind::Unified => None,
        }
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AddressKind::Transparent => "transparent",
            AddressKind::Sapling => "sapling",
            AddressKind::Unified => "unified",
        };
        f.write_str(name)
    }
}

const SAPLING_PREFIXES: [&str; 2] = ["zs1", "zregtestsapling1"];
const UNIFIED_PREFIXES: [&str; 2] = ["u1", "uregtest1"];
const TRANSPARENT_LEN: usize = 35;
const SAPLING_MIN_LEN: usize = 78;
const UNIFIED_MIN_LEN: usize = 100;

/// Structural check of a recipient address; returns its kind.
pub fn validate_address(address: &str) -> FaucetResult<AddressKind> {
    if address.is_empty() {
        return Err(FaucetError::InvalidAddress("Address is required".to_string()));
    }

    if !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FaucetError::InvalidAddress(
            "Address contains invalid characters".to_string(),
        ));
    }

    if address.starts_with('t') {
        let network_ok = matches!(address.as_bytes().get(1), Some(b'1' | b'3' | b'm'));
        if !network_ok || address.len() != TRANSPARENT_LEN {
            return Err(FaucetError::InvalidAddress(
                "Invalid transparent address format".to_string(),
            ));
        }
        return Ok(AddressKind::Transparent);
    }

    if SAPLING_PREFIXES.iter().any(|p| address.starts_with(p)) {
        if address.len() < SAPLING_MIN_LEN {
            return Err(FaucetError::InvalidAddress(
                "Invalid sapling address format".to_string(),
            ));
        }
        return Ok(AddressKind::Sapling);
    }

    if UNIFIED_PREFIXES.iter().any(|p| address.starts_with(p)) {
        if address.len() < UNIFIED_MIN_LEN {
            return Err(FaucetError::InvalidAddress(
                "Invalid unified address format".to_string(),
            ));
        }
        return Ok(AddressKind::Unified);
    }

    Err(FaucetError::InvalidAddress("Unsupported address type".to_string()))
}
