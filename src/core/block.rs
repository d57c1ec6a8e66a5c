// Block data structures

use crate::consensus::ProofOfWork;
use crate::core::{Hash256, MerkleTree, Serializable, Transaction};
use crate::error::{LedgerError, Result};
use std::io::{Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};
use super::serialize::{read_array, read_count, read_opt_hash, write_opt_hash, write_varint};

/// Block - header fields plus the transactions it commits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block timestamp (Unix epoch seconds)
    pub timestamp: i64,
    pub transactions: Vec<Transaction>,
    /// Hash of the parent block; `None` only for genesis
    pub prev_block_hash: Option<Hash256>,
    pub hash: Hash256,
    pub nonce: u64,
    pub height: u64,
}

impl Block {
    /// Build and seal a new block on top of `prev_block_hash`
    pub fn new(
        transactions: Vec<Transaction>,
        prev_block_hash: Option<Hash256>,
        height: u64,
        pow: &ProofOfWork,
    ) -> Result<Self> {
        if transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }

        let mut block = Self {
            timestamp: now(),
            transactions,
            prev_block_hash,
            hash: Hash256::zero(),
            nonce: 0,
            height,
        };

        let result = pow.run(&block)?;
        block.nonce = result.nonce;
        block.hash = result.hash;
        Ok(block)
    }

    /// Create the genesis block around an emission coinbase
    pub fn genesis(coinbase: Transaction, pow: &ProofOfWork) -> Result<Self> {
        Self::new(vec![coinbase], None, 0, pow)
    }

    /// Merkle root over the serialized transactions
    pub fn hash_transactions(&self) -> Hash256 {
        let leaves: Vec<Vec<u8>> = self.transactions.iter().map(|tx| tx.serialize()).collect();
        MerkleTree::new(&leaves).root()
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_none()
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl Serializable for Block {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.timestamp.to_le_bytes());

        write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.write_to(&mut buf);
        }

        write_opt_hash(&mut buf, self.prev_block_hash.as_ref());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.nonce.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());

        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let timestamp = i64::from_le_bytes(read_array(&mut cursor)?);

        let tx_count = read_count(&mut cursor)?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Transaction::from_reader(&mut cursor)?);
        }

        let prev_block_hash = read_opt_hash(&mut cursor)?;
        let hash = Hash256::new(read_array(&mut cursor)?);
        let nonce = u64::from_le_bytes(read_array(&mut cursor)?);
        let height = u64::from_le_bytes(read_array(&mut cursor)?);

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest)?;
        if !rest.is_empty() {
            return Err(LedgerError::Corrupted(format!(
                "{} trailing bytes after block",
                rest.len()
            )));
        }

        Ok(Self {
            timestamp,
            transactions,
            prev_block_hash,
            hash,
            nonce,
            height,
        })
    }
}
