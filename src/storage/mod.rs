// Storage layer for blockchain and UTXO set

mod blockchain_db;
mod utxo_set;

pub use blockchain_db::{BLOCKS_TREE, Blockchain, BlockchainIterator, TIP_KEY};
pub use utxo_set::{CHAINSTATE_TREE, OutPoint, Utxo, UtxoSet};
