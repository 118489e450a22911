//! Wallet integration: queries, synchronization and the funding workflow

pub mod address;
pub mod balance;
pub mod client;
pub mod funding;

pub use address::{validate_address, AddressKind};
pub use balance::{zatoshis_to_zec, zec_to_zatoshis, BalanceSnapshot, ZATOSHIS_PER_ZEC};
pub use client::{StatsSnapshot, WalletClient, ADDRESS_CACHE_FILE};
pub use funding::{FundingOutcome, SyncOutcome, SyncPolicy};
