// Structural block validation

use crate::consensus::ProofOfWork;
use crate::core::{Block, Hash256, Transaction};

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Block hash doesn't meet PoW target or doesn't match its contents
    InvalidProofOfWork,
    /// Block has no transactions
    NoTransactions,
    /// More than one coinbase transaction
    MultipleCoinbase,
    /// Coinbase transaction in non-first position
    CoinbaseNotFirst,
    /// Transaction has no inputs or outputs
    EmptyTransaction,
    /// Stored transaction id doesn't match its contents
    InvalidTransactionId(Hash256),
    /// Output values sum past u64::MAX
    OutputOverflow(Hash256),
    /// Parent block is not stored
    Orphan(Hash256),
    /// Height is not parent height + 1 (or 0 for genesis)
    InvalidHeight { expected: u64, got: u64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::InvalidProofOfWork => write!(f, "Invalid proof of work"),
            ValidationError::NoTransactions => write!(f, "Block has no transactions"),
            ValidationError::MultipleCoinbase => write!(f, "Multiple coinbase transactions"),
            ValidationError::CoinbaseNotFirst => write!(f, "Coinbase not in first position"),
            ValidationError::EmptyTransaction => write!(f, "Empty transaction"),
            ValidationError::InvalidTransactionId(id) => write!(f, "Transaction id {} does not match contents", id),
            ValidationError::OutputOverflow(id) => write!(f, "Outputs of transaction {} overflow", id),
            ValidationError::Orphan(parent) => write!(f, "Parent block {} is unknown", parent),
            ValidationError::InvalidHeight { expected, got } => {
                write!(f, "Invalid height: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Block validator for blocks received from outside the local miner
pub struct BlockValidator<'a> {
    pow: &'a ProofOfWork,
}

impl<'a> BlockValidator<'a> {
    pub fn new(pow: &'a ProofOfWork) -> Self {
        Self { pow }
    }

    /// Validate a complete block, without consulting chain state
    pub fn validate_block(&self, block: &Block) -> Result<(), ValidationError> {
        // Must have at least one transaction
        if block.transactions.is_empty() {
            return Err(ValidationError::NoTransactions);
        }

        if !self.pow.validate(block) {
            return Err(ValidationError::InvalidProofOfWork);
        }

        self.validate_coinbase_placement(&block.transactions)?;

        for tx in &block.transactions {
            self.validate_transaction(tx)?;
        }

        Ok(())
    }

    /// Only the first transaction can be coinbase
    pub fn validate_coinbase_placement(&self, transactions: &[Transaction]) -> Result<(), ValidationError> {
        let Some((first, rest)) = transactions.split_first() else {
            return Err(ValidationError::NoTransactions);
        };

        if rest.iter().any(|tx| tx.is_coinbase()) {
            return Err(if first.is_coinbase() {
                ValidationError::MultipleCoinbase
            } else {
                ValidationError::CoinbaseNotFirst
            });
        }
        Ok(())
    }

    /// Validate a transaction (basic checks)
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ValidationError> {
        // Must have inputs and outputs
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(ValidationError::EmptyTransaction);
        }

        if tx.hash() != tx.id {
            return Err(ValidationError::InvalidTransactionId(tx.id));
        }

        if tx.total_output_value().is_none() {
            return Err(ValidationError::OutputOverflow(tx.id));
        }

        Ok(())
    }
}
