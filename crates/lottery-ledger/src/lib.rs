//! # Lottery Ledger
//!
//! Solana JSON-RPC adapter behind the `LedgerClient` port: transaction and
//! signature-status lookups, balances, and signed native transfers.

pub mod client;
pub mod config;
pub mod decode;
pub mod rpc;
pub mod transaction;

pub use client::SolanaRpcClient;
pub use config::LedgerConfig;
pub use transaction::{build_transfer, SignedTransfer};
