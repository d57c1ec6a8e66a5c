// Blockchain database using sled

use crate::config::LedgerConfig;
use crate::consensus::{BlockValidator, ProofOfWork, ValidationError};
use crate::core::{Block, Hash256, Serializable, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{OutPoint, Utxo};
use crate::wallet::Address;
use secp256k1::SecretKey;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::{Db, Tree};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock};

/// Tree holding serialized blocks keyed by hash, plus the tip pointer
pub const BLOCKS_TREE: &str = "blocks";
/// Reserved key mapping to the current tip hash
pub const TIP_KEY: &[u8] = b"l";

/// Handle over one node's persistent chain
///
/// Chain mutations (`add_block`, `mine_block`) are serialized by an internal
/// writer lock and commit through a single sled transaction, so readers see
/// either the state before or after a block, never a partial one.
pub struct Blockchain {
    db: Db,
    blocks: Tree,
    tip: RwLock<Hash256>,
    writer: Mutex<()>,
    pow: ProofOfWork,
    config: LedgerConfig,
}

impl Blockchain {
    /// Create a new chain for `config.node_id` with a genesis block paying `address`
    ///
    /// Fails with `ChainExists` if the node already has a database.
    pub fn create(address: &Address, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let path = config.db_path();
        if path.exists() {
            return Err(LedgerError::ChainExists(config.node_id.clone()));
        }

        let db = sled::open(&path)?;
        Self::init(db, address, config)
    }

    /// Create a chain in a temporary database, removed on drop
    pub fn create_temporary(address: &Address, config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let db = sled::Config::new().temporary(true).open()?;
        Self::init(db, address, config)
    }

    /// Open the existing chain for `config.node_id`
    ///
    /// Fails with `ChainNotFound` if the node has no database yet.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let path = config.db_path();
        if !path.exists() {
            return Err(LedgerError::ChainNotFound(config.node_id.clone()));
        }

        let db = sled::open(&path)?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        let tip = match blocks.get(TIP_KEY)? {
            Some(data) => Hash256::from_slice(&data)?,
            None => return Err(LedgerError::ChainNotFound(config.node_id.clone())),
        };

        log::info!("Opened blockchain for node {} at tip {}", config.node_id, tip);
        Self::from_parts(db, blocks, tip, config)
    }

    fn init(db: Db, address: &Address, config: &LedgerConfig) -> Result<Self> {
        let pow = ProofOfWork::new(config.target_bits)?;
        let coinbase = Transaction::new_coinbase(address, config.emission_value, &config.genesis_data)?;
        let genesis = Block::genesis(coinbase, &pow)?;

        let blocks = db.open_tree(BLOCKS_TREE)?;
        let encoded = genesis.serialize();
        let hash_key: &[u8] = genesis.hash.as_bytes();
        let result: TransactionResult<(), LedgerError> = blocks.transaction(|tx| {
            tx.insert(hash_key, encoded.as_slice())?;
            tx.insert(TIP_KEY, hash_key)?;
            Ok(())
        });
        result?;
        db.flush()?;

        log::info!(
            "Created blockchain for node {} with genesis block {}",
            config.node_id, genesis.hash
        );
        Self::from_parts(db, blocks, genesis.hash, config)
    }

    fn from_parts(db: Db, blocks: Tree, tip: Hash256, config: &LedgerConfig) -> Result<Self> {
        Ok(Self {
            db,
            blocks,
            tip: RwLock::new(tip),
            writer: Mutex::new(()),
            pow: ProofOfWork::new(config.target_bits)?,
            config: config.clone(),
        })
    }

    /// Hash of the current best block
    pub fn tip(&self) -> Hash256 {
        *self.tip.read().unwrap_or_else(|e| e.into_inner())
    }

    fn set_tip(&self, hash: Hash256) {
        *self.tip.write().unwrap_or_else(|e| e.into_inner()) = hash;
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn pow(&self) -> &ProofOfWork {
        &self.pow
    }

    pub(crate) fn open_tree(&self, name: &str) -> Result<Tree> {
        Ok(self.db.open_tree(name)?)
    }

    /// Walk blocks from the current tip back to genesis
    pub fn iter(&self) -> BlockchainIterator<'_> {
        BlockchainIterator {
            current: Some(self.tip()),
            blocks: &self.blocks,
        }
    }

    /// Check if a block exists
    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    /// Get a block by hash
    pub fn get_block(&self, hash: &Hash256) -> Result<Block> {
        match self.blocks.get(hash.as_bytes())? {
            Some(data) => Block::deserialize(&data),
            None => Err(LedgerError::BlockNotFound(*hash)),
        }
    }

    /// Height of the block the tip points to
    pub fn get_best_height(&self) -> Result<u64> {
        Ok(self.get_block(&self.tip())?.height)
    }

    /// Hashes of every block from tip to genesis
    pub fn get_block_hashes(&self) -> Result<Vec<Hash256>> {
        self.iter().map(|block| block.map(|b| b.hash)).collect()
    }

    /// Store a block received from elsewhere
    ///
    /// Re-adding a stored block is a no-op. The tip moves only when the new
    /// block is strictly higher than the current tip. Returns whether the tip
    /// moved.
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        if self.has_block(&block.hash)? {
            log::debug!("Block {} already stored", block.hash);
            return Ok(false);
        }

        BlockValidator::new(&self.pow).validate_block(block)?;
        match &block.prev_block_hash {
            Some(parent_hash) => {
                let parent = match self.get_block(parent_hash) {
                    Ok(parent) => parent,
                    Err(LedgerError::BlockNotFound(_)) => {
                        log::warn!("Rejecting orphan block {}", block.hash);
                        return Err(ValidationError::Orphan(*parent_hash).into());
                    }
                    Err(e) => return Err(e),
                };
                if block.height != parent.height + 1 {
                    return Err(ValidationError::InvalidHeight {
                        expected: parent.height + 1,
                        got: block.height,
                    }
                    .into());
                }
            }
            None if block.height != 0 => {
                return Err(ValidationError::InvalidHeight { expected: 0, got: block.height }.into());
            }
            None => {}
        }

        let encoded = block.serialize();
        let hash_key: &[u8] = block.hash.as_bytes();
        let result: TransactionResult<bool, LedgerError> = self.blocks.transaction(|tx| {
            if tx.get(hash_key)?.is_some() {
                return Ok(false);
            }
            tx.insert(hash_key, encoded.as_slice())?;

            let tip_hash = tx.get(TIP_KEY)?.ok_or_else(|| {
                ConflictableTransactionError::Abort(LedgerError::Corrupted("missing tip".to_string()))
            })?;
            let tip_data = tx.get(&tip_hash)?.ok_or_else(|| {
                ConflictableTransactionError::Abort(LedgerError::Corrupted("tip block missing".to_string()))
            })?;
            let tip_block = Block::deserialize(&tip_data).map_err(ConflictableTransactionError::Abort)?;

            if block.height > tip_block.height {
                tx.insert(TIP_KEY, hash_key)?;
                Ok(true)
            } else {
                Ok(false)
            }
        });
        let advanced = result?;
        self.db.flush()?;

        if advanced {
            self.set_tip(block.hash);
            log::info!("Added block {} at height {}, new tip", block.hash, block.height);
        } else {
            log::warn!(
                "Stored block {} at height {} without moving the tip",
                block.hash, block.height
            );
        }
        Ok(advanced)
    }

    /// Verify `transactions`, mine a block on top of the tip and persist it
    ///
    /// The block passes the same structural checks `add_block` applies.
    /// Nothing is stored if any transaction fails verification.
    pub fn mine_block(&self, transactions: Vec<Transaction>) -> Result<Block> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        if transactions.is_empty() {
            return Err(LedgerError::EmptyBlock);
        }

        let validator = BlockValidator::new(&self.pow);
        validator.validate_coinbase_placement(&transactions)?;
        for tx in &transactions {
            validator.validate_transaction(tx).map_err(|e| LedgerError::InvalidTransaction {
                id: tx.id,
                reason: e.to_string(),
            })?;
        }

        let mut claimed = HashSet::new();
        for tx in &transactions {
            match self.verify_transaction(tx) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("Invalid transaction {}", tx.id);
                    return Err(LedgerError::InvalidTransaction {
                        id: tx.id,
                        reason: "verification failed".to_string(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Invalid transaction {}: {}", tx.id, e);
                    return Err(LedgerError::InvalidTransaction {
                        id: tx.id,
                        reason: e.to_string(),
                    });
                }
            }

            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                if let Some(outpoint) = OutPoint::spent_by(input) {
                    if !claimed.insert(outpoint) {
                        return Err(LedgerError::InvalidTransaction {
                            id: tx.id,
                            reason: "output spent twice in one block".to_string(),
                        });
                    }
                }
            }
        }

        let last_hash = self.tip();
        let last_height = self.get_block(&last_hash)?.height;
        let block = Block::new(transactions, Some(last_hash), last_height + 1, &self.pow)?;

        let encoded = block.serialize();
        let hash_key: &[u8] = block.hash.as_bytes();
        let result: TransactionResult<(), LedgerError> = self.blocks.transaction(|tx| {
            tx.insert(hash_key, encoded.as_slice())?;
            tx.insert(TIP_KEY, hash_key)?;
            Ok(())
        });
        result?;
        self.db.flush()?;
        self.set_tip(block.hash);

        log::info!(
            "Mined block {} at height {} with {} transactions",
            block.hash,
            block.height,
            block.transactions.len()
        );
        Ok(block)
    }

    /// Find a transaction by id, scanning from tip to genesis
    pub fn find_transaction(&self, id: &Hash256) -> Result<Transaction> {
        for block in self.iter() {
            if let Some(tx) = block?.transactions.into_iter().find(|tx| tx.id == *id) {
                return Ok(tx);
            }
        }
        Err(LedgerError::TransactionNotFound(*id))
    }

    /// Transactions referenced by the inputs of `tx`
    pub fn prev_transactions(&self, tx: &Transaction) -> Result<HashMap<Hash256, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in &tx.inputs {
            let Some(prev_id) = input.prev_tx_id else { continue };
            if prev_txs.contains_key(&prev_id) {
                continue;
            }
            let prev_tx = match self.find_transaction(&prev_id) {
                Ok(prev_tx) => prev_tx,
                Err(LedgerError::TransactionNotFound(id)) => {
                    return Err(LedgerError::PrevTransactionMissing(id));
                }
                Err(e) => return Err(e),
            };
            prev_txs.insert(prev_id, prev_tx);
        }
        Ok(prev_txs)
    }

    /// Sign every input of `tx`, resolving spent outputs from the chain
    pub fn sign_transaction(&self, tx: &mut Transaction, secret_key: &SecretKey) -> Result<()> {
        let prev_txs = self.prev_transactions(tx)?;
        tx.sign(secret_key, &prev_txs)
    }

    /// Per-input digests a key holder must sign for `tx`
    ///
    /// The digests are signed outside the ledger and handed back to
    /// `sign_prepared_transaction`. Coinbase transactions need none.
    pub fn prepare_transaction_to_sign(&self, tx: &Transaction) -> Result<Vec<Hash256>> {
        if tx.is_coinbase() {
            return Ok(Vec::new());
        }

        let prev_txs = self.prev_transactions(tx)?;
        let mut digests = Vec::with_capacity(tx.inputs.len());
        for (index, input) in tx.inputs.iter().enumerate() {
            let output = input
                .prev_tx_id
                .and_then(|prev_id| prev_txs.get(&prev_id))
                .and_then(|prev| prev.outputs.get(input.prev_index as usize))
                .ok_or_else(|| LedgerError::InvalidTransaction {
                    id: tx.id,
                    reason: format!("input {} references a missing output", index),
                })?;
            digests.push(tx.signing_digest(index, &output.pubkey_hash));
        }
        Ok(digests)
    }

    /// Attach externally produced signatures, one per input, in input order
    ///
    /// `tx` is left untouched unless every signature verifies.
    pub fn sign_prepared_transaction(&self, tx: &mut Transaction, signatures: Vec<Vec<u8>>) -> Result<()> {
        if signatures.len() != tx.inputs.len() {
            return Err(LedgerError::InvalidTransaction {
                id: tx.id,
                reason: format!(
                    "expected {} signatures, got {}",
                    tx.inputs.len(),
                    signatures.len()
                ),
            });
        }

        let mut signed = tx.clone();
        for (input, signature) in signed.inputs.iter_mut().zip(signatures) {
            input.signature = signature;
        }

        let prev_txs = self.prev_transactions(&signed)?;
        if !signed.verify(&prev_txs)? {
            log::warn!("Rejected prepared signatures for transaction {}", tx.id);
            return Err(LedgerError::InvalidTransaction {
                id: tx.id,
                reason: "signature verification failed".to_string(),
            });
        }

        *tx = signed;
        Ok(())
    }

    /// Verify `tx` against the outputs visible from the current tip
    ///
    /// Beyond signatures, rejects inputs already spent in the chain and
    /// transactions paying out more than they spend.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let prev_txs = self.prev_transactions(tx)?;
        if !tx.verify(&prev_txs)? {
            return Ok(false);
        }

        let mut outpoints = HashSet::new();
        let mut input_value = 0u64;
        for input in &tx.inputs {
            let Some(outpoint) = OutPoint::spent_by(input) else {
                return Ok(false);
            };
            let Some(output) = prev_txs
                .get(&outpoint.txid)
                .and_then(|prev| prev.outputs.get(outpoint.vout as usize))
            else {
                return Ok(false);
            };
            let Some(total) = input_value.checked_add(output.value) else {
                log::warn!("Transaction {} input value overflows", tx.id);
                return Ok(false);
            };
            input_value = total;
            if !outpoints.insert(outpoint) {
                log::warn!("Transaction {} spends the same output twice", tx.id);
                return Ok(false);
            }
        }

        let Some(output_value) = tx.total_output_value() else {
            log::warn!("Transaction {} output value overflows", tx.id);
            return Ok(false);
        };
        if output_value > input_value {
            log::warn!(
                "Transaction {} pays {} from {} of inputs",
                tx.id, output_value, input_value
            );
            return Ok(false);
        }

        let spent = self.find_spent_outputs(&outpoints)?;
        if !spent.is_empty() {
            log::warn!("Transaction {} double spends {} outputs", tx.id, spent.len());
            return Ok(false);
        }

        Ok(true)
    }

    /// Which of `wanted` are consumed by some input in the chain
    pub fn find_spent_outputs(&self, wanted: &HashSet<OutPoint>) -> Result<HashSet<OutPoint>> {
        let mut spent = HashSet::new();
        for block in self.iter() {
            for tx in block?.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                for outpoint in tx.inputs.iter().filter_map(OutPoint::spent_by) {
                    if wanted.contains(&outpoint) {
                        spent.insert(outpoint);
                    }
                }
            }
        }
        Ok(spent)
    }

    /// Every unspent output in the chain, grouped by transaction id
    pub fn find_all_unspent(&self) -> Result<HashMap<Hash256, Vec<Utxo>>> {
        let mut unspent: HashMap<Hash256, Vec<Utxo>> = HashMap::new();
        let mut spent: HashSet<OutPoint> = HashSet::new();

        // newest first, so every spend is seen before the output it consumes
        for block in self.iter() {
            let block = block?;
            for tx in block.transactions.iter().filter(|tx| !tx.is_coinbase()) {
                spent.extend(tx.inputs.iter().filter_map(OutPoint::spent_by));
            }

            for tx in &block.transactions {
                for (vout, output) in tx.outputs.iter().enumerate() {
                    let vout = vout as u32;
                    if spent.contains(&OutPoint::new(tx.id, vout)) {
                        continue;
                    }
                    unspent
                        .entry(tx.id)
                        .or_default()
                        .push(Utxo::new(vout, output.clone()));
                }
            }
        }

        Ok(unspent)
    }

    /// Unspent balance of every address that holds one
    pub fn address_balances(&self) -> Result<BTreeMap<Address, u64>> {
        let mut balances = BTreeMap::new();
        for utxo in self.find_all_unspent()?.into_values().flatten() {
            let address = Address::from_pubkey_hash(&utxo.output.pubkey_hash);
            let balance = balances.entry(address).or_insert(0u64);
            *balance = balance.saturating_add(utxo.output.value);
        }
        Ok(balances)
    }
}

/// Lazy walk from a tip back to genesis
///
/// Single pass; create a new one from `Blockchain::iter` to restart.
pub struct BlockchainIterator<'a> {
    current: Option<Hash256>,
    blocks: &'a Tree,
}

impl Iterator for BlockchainIterator<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;
        let block = match self.blocks.get(hash.as_bytes()) {
            Ok(Some(data)) => Block::deserialize(&data),
            Ok(None) => Err(LedgerError::Corrupted(format!("broken chain link at {}", hash))),
            Err(e) => Err(e.into()),
        };

        if let Ok(block) = &block {
            self.current = block.prev_block_hash;
        }
        Some(block)
    }
}
