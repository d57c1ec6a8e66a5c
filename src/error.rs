// Ledger error types

use crate::consensus::ValidationError;
use crate::core::Hash256;
use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors produced by the ledger engine
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Blockchain already exists for node {0}")]
    ChainExists(String),

    #[error("No existing blockchain found for node {0}. Create one first")]
    ChainNotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Corrupted data: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Transaction {0} is not found")]
    TransactionNotFound(Hash256),

    #[error("Block {0} is not found")]
    BlockNotFound(Hash256),

    #[error("Previous transaction {0} is missing")]
    PrevTransactionMissing(Hash256),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid transaction {id}: {reason}")]
    InvalidTransaction { id: Hash256, reason: String },

    #[error("Invalid block: {0}")]
    InvalidBlock(#[from] ValidationError),

    #[error("Block must contain at least one transaction")]
    EmptyBlock,

    #[error("Nonce space exhausted without meeting the target")]
    NonceExhausted,
}

impl LedgerError {
    /// Setup and corruption errors that leave the chain handle unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::ChainExists(_)
                | LedgerError::ChainNotFound(_)
                | LedgerError::Storage(_)
                | LedgerError::Corrupted(_)
                | LedgerError::Io(_)
                | LedgerError::Config(_)
        )
    }
}

impl From<TransactionError<LedgerError>> for LedgerError {
    fn from(err: TransactionError<LedgerError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => LedgerError::Storage(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
