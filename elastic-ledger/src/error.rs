//! Error types for the ledger

use crate::types::Account;
use primitive_types::U256;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every variant is a synchronous rejection of the whole operation. Nothing
/// is retried internally.
#[derive(Error, Debug)]
pub enum Error {
    /// No usable price exists (construction only)
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Zero-value mint/burn/deposit/withdraw
    #[error("Zero amount: {0}")]
    ZeroAmount(&'static str),

    /// Debit exceeds the account's bits
    #[error("Insufficient balance on {account}: requested {requested} bits, available {available}")]
    InsufficientBalance {
        /// Debited account
        account: Account,
        /// Bits requested
        requested: U256,
        /// Bits held
        available: U256,
    },

    /// Spender allowance too small
    #[error("Insufficient allowance: requested {requested}, allowed {allowed}")]
    InsufficientAllowance {
        /// Derived amount requested
        requested: U256,
        /// Derived amount allowed
        allowed: U256,
    },

    /// External funds movement failed for lack of funds
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// External funds movement was rejected
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    /// 256-bit arithmetic overflow
    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    /// Invariant violation (bit conservation, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<crate::funds::FundsError> for Error {
    fn from(err: crate::funds::FundsError) -> Self {
        match err {
            crate::funds::FundsError::InsufficientFunds(msg) => Error::InsufficientFunds(msg),
            crate::funds::FundsError::TransferRejected(msg) => Error::TransferRejected(msg),
        }
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
