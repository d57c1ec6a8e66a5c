// UTXO (Unspent Transaction Output) set management

use crate::core::{Block, Hash256, PubKeyHash, TxInput, TxOutput, corrupted, read_count, write_varint};
use crate::error::{LedgerError, Result};
use crate::storage::Blockchain;
use crate::wallet::Address;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::{Batch, Tree};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Tree holding the UTXO index, keyed by transaction id
pub const CHAINSTATE_TREE: &str = "chainstate";

/// UTXO identifier - transaction hash + output index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// Output consumed by `input`, `None` for coinbase inputs
    pub fn spent_by(input: &TxInput) -> Option<Self> {
        input.prev_tx_id.map(|txid| Self::new(txid, input.prev_index))
    }
}

/// Unspent output together with its index in the creating transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub vout: u32,
    pub output: TxOutput,
}

impl Utxo {
    pub fn new(vout: u32, output: TxOutput) -> Self {
        Self { vout, output }
    }
}

fn encode_utxos(utxos: &[Utxo]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + utxos.len() * 33);
    write_varint(&mut buf, utxos.len() as u64);
    for utxo in utxos {
        buf.extend_from_slice(&utxo.vout.to_le_bytes());
        utxo.output.write(&mut buf);
    }
    buf
}

fn decode_utxos(data: &[u8]) -> Result<Vec<Utxo>> {
    let mut cursor = Cursor::new(data);
    let count = read_count(&mut cursor)?;

    let mut utxos = Vec::with_capacity(count);
    for _ in 0..count {
        let mut vout = [0u8; 4];
        cursor.read_exact(&mut vout).map_err(corrupted)?;
        let output = TxOutput::read(&mut cursor)?;
        utxos.push(Utxo::new(u32::from_le_bytes(vout), output));
    }

    if cursor.position() as usize != data.len() {
        return Err(LedgerError::Corrupted("trailing bytes in UTXO entry".to_string()));
    }
    Ok(utxos)
}

/// Index of unspent outputs, derived from and kept in step with a chain
///
/// Lives in the same database as the chain it indexes. Rebuild with
/// `reindex`, then apply each new block with `update`.
pub struct UtxoSet<'a> {
    chain: &'a Blockchain,
    tree: Tree,
}

impl<'a> UtxoSet<'a> {
    pub fn new(chain: &'a Blockchain) -> Result<Self> {
        let tree = chain.open_tree(CHAINSTATE_TREE)?;
        Ok(Self { chain, tree })
    }

    pub fn blockchain(&self) -> &'a Blockchain {
        self.chain
    }

    /// Drop the index and rebuild it from a full chain scan
    ///
    /// Returns the number of transactions with unspent outputs.
    pub fn reindex(&self) -> Result<usize> {
        let unspent = self.chain.find_all_unspent()?;

        let mut batch = Batch::default();
        for key in self.tree.iter().keys() {
            batch.remove(key?);
        }
        for (txid, utxos) in &unspent {
            batch.insert(&txid.as_bytes()[..], encode_utxos(utxos));
        }
        self.tree.apply_batch(batch)?;
        self.tree.flush()?;

        log::info!("Reindexed UTXO set: {} transactions", unspent.len());
        Ok(unspent.len())
    }

    fn entries(&self) -> impl Iterator<Item = Result<(Hash256, Vec<Utxo>)>> + '_ {
        self.tree.iter().map(|entry| {
            let (key, value) = entry?;
            Ok((Hash256::from_slice(&key)?, decode_utxos(&value)?))
        })
    }

    /// Collect outputs locked to `pubkey_hash` until `amount` is covered
    ///
    /// Returns the accumulated value and the outpoints that make it up.
    pub fn find_spendable_outputs(
        &self,
        pubkey_hash: &PubKeyHash,
        amount: u64,
    ) -> Result<(u64, Vec<OutPoint>)> {
        let mut accumulated = 0u64;
        let mut outpoints = Vec::new();

        'scan: for entry in self.entries() {
            let (txid, utxos) = entry?;
            for utxo in utxos {
                if accumulated >= amount {
                    break 'scan;
                }
                if utxo.output.is_locked_with_key(pubkey_hash) {
                    accumulated = accumulated.saturating_add(utxo.output.value);
                    outpoints.push(OutPoint::new(txid, utxo.vout));
                }
            }
        }

        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                needed: amount,
                available: accumulated,
            });
        }
        Ok((accumulated, outpoints))
    }

    /// All unspent outputs locked to `pubkey_hash`
    pub fn find_utxo(&self, pubkey_hash: &PubKeyHash) -> Result<Vec<TxOutput>> {
        let mut outputs = Vec::new();
        for entry in self.entries() {
            let (_, utxos) = entry?;
            outputs.extend(
                utxos
                    .into_iter()
                    .map(|utxo| utxo.output)
                    .filter(|output| output.is_locked_with_key(pubkey_hash)),
            );
        }
        Ok(outputs)
    }

    /// Get balance for an address
    pub fn get_balance(&self, address: &Address) -> Result<u64> {
        let pubkey_hash = address.to_pubkey_hash()?;
        Ok(self
            .find_utxo(&pubkey_hash)?
            .iter()
            .fold(0u64, |total, output| total.saturating_add(output.value)))
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize> {
        Ok(self.tree.len())
    }

    /// Full contents of the index, ordered by transaction id
    pub fn snapshot(&self) -> Result<BTreeMap<Hash256, Vec<Utxo>>> {
        self.entries().collect()
    }

    /// Apply a newly connected block to the index
    ///
    /// Transactions are applied in block order; the whole block commits
    /// atomically.
    pub fn update(&self, block: &Block) -> Result<()> {
        let result: TransactionResult<(), LedgerError> = self.tree.transaction(|tx| {
            for transaction in &block.transactions {
                if !transaction.is_coinbase() {
                    for outpoint in transaction.inputs.iter().filter_map(OutPoint::spent_by) {
                        let key: &[u8] = outpoint.txid.as_bytes();
                        let Some(data) = tx.get(key)? else {
                            continue;
                        };

                        let mut utxos = decode_utxos(&data).map_err(ConflictableTransactionError::Abort)?;
                        utxos.retain(|utxo| utxo.vout != outpoint.vout);
                        if utxos.is_empty() {
                            tx.remove(key)?;
                        } else {
                            tx.insert(key, encode_utxos(&utxos))?;
                        }
                    }
                }

                let created: Vec<Utxo> = transaction
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(vout, output)| Utxo::new(vout as u32, output.clone()))
                    .collect();
                if !created.is_empty() {
                    tx.insert(&transaction.id.as_bytes()[..], encode_utxos(&created))?;
                }
            }
            Ok(())
        });
        result?;
        self.tree.flush()?;

        log::debug!("Applied block {} to UTXO set", block.hash);
        Ok(())
    }
}
