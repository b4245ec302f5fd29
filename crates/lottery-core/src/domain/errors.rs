//! Error types for the lottery round engine

use thiserror::Error;

/// Errors surfaced to a subscriber when an entry cannot be admitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LotteryError {
    /// A winner has already been drawn for the live round
    #[error("Round has ended, wait for the next round")]
    RoundEnded,

    /// Every verification attempt failed
    #[error("Transaction verification failed after {attempts} attempts, please try again")]
    VerificationFailed { attempts: u32 },

    /// A real bet arrived without a transfer id
    #[error("Missing transfer id for bet")]
    MissingTransfer,

    /// The transfer id was already counted in this round
    #[error("Transfer {transfer_id} was already used in this round")]
    DuplicateTransfer { transfer_id: String },

    /// Request failed basic validation
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    /// No ledger is reachable, so only simulated transfers can be admitted
    #[error("Ledger unavailable, only simulated bets are accepted")]
    LedgerUnavailable,
}

/// Result type for admission operations
pub type LotteryResult<T> = Result<T, LotteryError>;

/// Failures reported by the external ledger collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Transport level failure (connect, timeout, HTTP status)
    #[error("Ledger transport error: {0}")]
    Transport(String),

    /// The ledger answered with a JSON-RPC error
    #[error("Ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The response did not have the expected shape
    #[error("Malformed ledger response: {0}")]
    Malformed(String),

    /// An address could not be decoded
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A submitted transfer was not confirmed in time
    #[error("Transfer {signature} not confirmed")]
    Unconfirmed { signature: String },

    /// A submitted transfer landed but failed on execution
    #[error("Transfer {signature} failed: {reason}")]
    TransactionFailed { signature: String, reason: String },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("Platform fee {bps} bps must be below 10000")]
    FeeTooHigh { bps: u64 },

    #[error("Invalid platform address: {0}")]
    InvalidPlatformAddress(String),
}
