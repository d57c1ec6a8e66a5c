// Minimal UTXO ledger: proof-of-work chain, signed transactions and a UTXO index

pub mod core;
pub mod consensus;
pub mod storage;
pub mod wallet;
pub mod config;
pub mod error;
pub mod cli;

// Re-exports for convenience
pub use core::{Block, Hash256, MerkleTree, Transaction, TxInput, TxOutput};
pub use consensus::{BlockValidator, ProofOfWork, Target, ValidationError};
pub use storage::{Blockchain, BlockchainIterator, OutPoint, Utxo, UtxoSet};
pub use wallet::{Address, KeyPair, TransactionBuilder};
pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use cli::{Cli, CliHandler};
