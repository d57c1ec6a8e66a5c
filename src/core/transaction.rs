// Transaction data structures

use crate::core::{Hash256, PubKeyHash, Serializable, hash160, sha256};
use crate::error::{LedgerError, Result};
use crate::wallet::{Address, sign_digest, verify_signature};
use secp256k1::SecretKey;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use super::serialize::{
    corrupted, read_array, read_count, read_opt_hash, read_var_bytes, write_opt_hash,
    write_var_bytes, write_varint,
};

/// Previous-output index carried by coinbase inputs
pub const COINBASE_INDEX: u32 = u32::MAX;

/// Transaction input - references a previous transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Id of the previous transaction; `None` for coinbase inputs
    pub prev_tx_id: Option<Hash256>,
    /// Index of the output in the previous transaction
    pub prev_index: u32,
    /// Compact ECDSA signature, or free-form data for coinbase inputs
    pub signature: Vec<u8>,
    /// Compressed public key of the spender
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// Create an unsigned input spending `prev_tx_id:prev_index`
    pub fn new(prev_tx_id: Hash256, prev_index: u32, public_key: Vec<u8>) -> Self {
        Self {
            prev_tx_id: Some(prev_tx_id),
            prev_index,
            signature: Vec::new(),
            public_key,
        }
    }

    /// Create a coinbase input carrying arbitrary data
    pub fn coinbase(data: Vec<u8>) -> Self {
        Self {
            prev_tx_id: None,
            prev_index: COINBASE_INDEX,
            signature: data,
            public_key: Vec::new(),
        }
    }

    /// Check if this is a coinbase input
    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_id.is_none()
    }

    /// Whether the embedded public key hashes to `pubkey_hash`
    pub fn uses_key(&self, pubkey_hash: &PubKeyHash) -> bool {
        hash160(&self.public_key) == *pubkey_hash
    }

    fn write(&self, buf: &mut Vec<u8>, signature: &[u8], public_key: &[u8]) {
        write_opt_hash(buf, self.prev_tx_id.as_ref());
        buf.extend_from_slice(&self.prev_index.to_le_bytes());
        write_var_bytes(buf, signature);
        write_var_bytes(buf, public_key);
    }

    fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let prev_tx_id = read_opt_hash(reader)?;
        let prev_index = u32::from_le_bytes(read_array(reader)?);
        let signature = read_var_bytes(reader).map_err(corrupted)?;
        let public_key = read_var_bytes(reader).map_err(corrupted)?;

        Ok(Self {
            prev_tx_id,
            prev_index,
            signature,
            public_key,
        })
    }
}

/// Transaction output - amount locked to a public key hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub value: u64,
    pub pubkey_hash: PubKeyHash,
}

impl TxOutput {
    pub fn new(value: u64, pubkey_hash: PubKeyHash) -> Self {
        Self { value, pubkey_hash }
    }

    /// Create an output paying `value` to `address`
    pub fn to_address(value: u64, address: &Address) -> Result<Self> {
        Ok(Self::new(value, address.to_pubkey_hash()?))
    }

    /// Check whether the output can be spent by the owner of `pubkey_hash`
    pub fn is_locked_with_key(&self, pubkey_hash: &PubKeyHash) -> bool {
        self.pubkey_hash == *pubkey_hash
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        buf.extend_from_slice(&self.pubkey_hash);
    }

    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let value = u64::from_le_bytes(read_array(reader)?);
        let pubkey_hash = read_array(reader)?;
        Ok(Self { value, pubkey_hash })
    }
}

/// Which input fields go into an encoding
#[derive(Clone, Copy)]
enum InputView<'a> {
    /// Everything, as stored
    Full,
    /// Signatures emptied (id computation)
    Unsigned,
    /// Signatures and public keys emptied, except `index` which carries `lock`
    Signing { index: usize, lock: &'a PubKeyHash },
}

/// Transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// SHA256 of the unsigned encoding
    pub id: Hash256,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Create a transaction and compute its id
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        let mut tx = Self {
            id: Hash256::zero(),
            inputs,
            outputs,
        };
        tx.id = tx.hash();
        tx
    }

    /// Create a coinbase transaction paying `value` to `to`
    ///
    /// Empty `data` is replaced with random bytes so that reward
    /// transactions to the same address never share an id.
    pub fn new_coinbase(to: &Address, value: u64, data: &str) -> Result<Self> {
        let data = if data.is_empty() {
            hex::encode(rand::random::<[u8; 20]>())
        } else {
            data.to_string()
        };

        let output = TxOutput::to_address(value, to)?;
        Ok(Self::new(vec![TxInput::coinbase(data.into_bytes())], vec![output]))
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Content hash with every signature emptied
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.write_body(&mut buf, InputView::Unsigned);
        sha256(&buf)
    }

    /// Digest signed for input `index`, given the lock hash of the output it spends
    ///
    /// All signatures and public keys are emptied, then input `index` carries
    /// `lock` in its public key field, binding the signature to that one
    /// previous output.
    pub fn signing_digest(&self, index: usize, lock: &PubKeyHash) -> Hash256 {
        let mut buf = Vec::new();
        self.write_body(&mut buf, InputView::Signing { index, lock });
        sha256(&buf)
    }

    /// Calculate total output value, `None` if it overflows u64
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |total, out| total.checked_add(out.value))
    }

    /// Sign every input with `secret_key`
    pub fn sign(
        &mut self,
        secret_key: &SecretKey,
        prev_txs: &HashMap<Hash256, Transaction>,
    ) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut signatures = Vec::with_capacity(self.inputs.len());
        for (index, input) in self.inputs.iter().enumerate() {
            let Some(prev_id) = input.prev_tx_id else {
                return Err(LedgerError::InvalidTransaction {
                    id: self.id,
                    reason: format!("input {} has no previous transaction", index),
                });
            };
            let output = match referenced_output(&prev_id, input.prev_index, prev_txs)? {
                Some(output) => output,
                None => {
                    return Err(LedgerError::InvalidTransaction {
                        id: self.id,
                        reason: format!("input {} references a missing output", index),
                    });
                }
            };
            let digest = self.signing_digest(index, &output.pubkey_hash);
            signatures.push(sign_digest(secret_key, &digest));
        }

        for (input, signature) in self.inputs.iter_mut().zip(signatures) {
            input.signature = signature;
        }
        Ok(())
    }

    /// Verify every input's signature against the outputs it spends
    ///
    /// Errors only when a previous transaction is unknown; any other
    /// mismatch yields `Ok(false)`.
    pub fn verify(&self, prev_txs: &HashMap<Hash256, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        for input in &self.inputs {
            // a coinbase-style input mixed into a regular transaction
            let Some(prev_id) = input.prev_tx_id else {
                return Ok(false);
            };
            if !prev_txs.contains_key(&prev_id) {
                return Err(LedgerError::PrevTransactionMissing(prev_id));
            }
        }

        if self.hash() != self.id {
            return Ok(false);
        }

        for (index, input) in self.inputs.iter().enumerate() {
            let Some(prev_id) = input.prev_tx_id else {
                return Ok(false);
            };
            let Some(output) = referenced_output(&prev_id, input.prev_index, prev_txs)? else {
                return Ok(false);
            };
            if !input.uses_key(&output.pubkey_hash) {
                return Ok(false);
            }
            let digest = self.signing_digest(index, &output.pubkey_hash);
            if !verify_signature(&input.public_key, &digest, &input.signature) {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn write_body(&self, buf: &mut Vec<u8>, view: InputView<'_>) {
        write_varint(buf, self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            match view {
                InputView::Full => input.write(buf, &input.signature, &input.public_key),
                InputView::Unsigned => input.write(buf, &[], &input.public_key),
                InputView::Signing { index, lock } if index == i => input.write(buf, &[], lock),
                InputView::Signing { .. } => input.write(buf, &[], &[]),
            }
        }

        write_varint(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.write(buf);
        }
    }

    /// Deserialize from a reader positioned at the start of a transaction
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let id = Hash256::new(read_array(reader)?);

        let input_count = read_count(reader)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            inputs.push(TxInput::read(reader)?);
        }

        let output_count = read_count(reader)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            outputs.push(TxOutput::read(reader)?);
        }

        Ok(Self { id, inputs, outputs })
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.id.as_bytes());
        self.write_body(buf, InputView::Full);
    }
}

/// Output `prev_id:prev_index`, `None` if the index is out of range
fn referenced_output<'a>(
    prev_id: &Hash256,
    prev_index: u32,
    prev_txs: &'a HashMap<Hash256, Transaction>,
) -> Result<Option<&'a TxOutput>> {
    let prev_tx = prev_txs
        .get(prev_id)
        .ok_or(LedgerError::PrevTransactionMissing(*prev_id))?;
    Ok(prev_tx.outputs.get(prev_index as usize))
}

impl Serializable for Transaction {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let tx = Self::from_reader(&mut cursor)?;
        if cursor.position() as usize != data.len() {
            return Err(LedgerError::Corrupted("trailing bytes after transaction".to_string()));
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::KeyPair;

    fn funded(owner: &KeyPair, value: u64) -> Transaction {
        Transaction::new_coinbase(&owner.address(), value, "funding").unwrap()
    }

    fn spend(owner: &KeyPair, prev: &Transaction, to: &KeyPair, value: u64) -> Transaction {
        let input = TxInput::new(prev.id, 0, owner.public_key_bytes());
        let output = TxOutput::new(value, to.pubkey_hash());
        Transaction::new(vec![input], vec![output])
    }

    fn prev_map(txs: &[&Transaction]) -> HashMap<Hash256, Transaction> {
        txs.iter().map(|tx| (tx.id, (*tx).clone())).collect()
    }

    #[test]
    fn test_coinbase_transaction() {
        let kp = KeyPair::generate();
        let tx = Transaction::new_coinbase(&kp.address(), 1_000_000, "genesis").unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].prev_index, COINBASE_INDEX);
        assert_eq!(tx.inputs[0].signature, b"genesis".to_vec());
        assert_eq!(tx.outputs[0].value, 1_000_000);
        assert!(tx.outputs[0].is_locked_with_key(&kp.pubkey_hash()));
        assert!(tx.verify(&HashMap::new()).unwrap());
    }

    #[test]
    fn test_coinbase_random_data_gives_distinct_ids() {
        let kp = KeyPair::generate();
        let a = Transaction::new_coinbase(&kp.address(), 10, "").unwrap();
        let b = Transaction::new_coinbase(&kp.address(), 10, "").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_transaction_serialization() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let prev = funded(&alice, 50);
        let mut tx = spend(&alice, &prev, &bob, 50);
        tx.sign(&alice.secret_key, &prev_map(&[&prev])).unwrap();

        let decoded = Transaction::deserialize(&tx.serialize()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let kp = KeyPair::generate();
        let mut data = funded(&kp, 1).serialize();
        data.push(0);
        assert!(Transaction::deserialize(&data).is_err());
    }

    #[test]
    fn test_id_ignores_signatures() {
        let alice = KeyPair::generate();
        let prev = funded(&alice, 50);
        let mut tx = spend(&alice, &prev, &alice, 50);
        let id = tx.id;
        tx.sign(&alice.secret_key, &prev_map(&[&prev])).unwrap();
        assert_eq!(tx.hash(), id);
    }

    #[test]
    fn test_signing_digest_binds_each_input() {
        let alice = KeyPair::generate();
        let prev = funded(&alice, 50);
        let mut tx = spend(&alice, &prev, &alice, 50);
        tx.inputs.push(TxInput::new(prev.id, 1, alice.public_key_bytes()));

        let lock = alice.pubkey_hash();
        assert_ne!(tx.signing_digest(0, &lock), tx.signing_digest(1, &lock));
        assert_ne!(tx.signing_digest(0, &lock), tx.signing_digest(0, &[0u8; 20]));
    }

    #[test]
    fn test_sign_and_verify() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let prev = funded(&alice, 50);
        let prevs = prev_map(&[&prev]);

        let mut tx = spend(&alice, &prev, &bob, 50);
        tx.sign(&alice.secret_key, &prevs).unwrap();
        assert!(tx.verify(&prevs).unwrap());
    }

    #[test]
    fn test_flipped_signature_bit_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let prev = funded(&alice, 50);
        let prevs = prev_map(&[&prev]);

        let mut tx = spend(&alice, &prev, &bob, 50);
        tx.sign(&alice.secret_key, &prevs).unwrap();
        tx.inputs[0].signature[10] ^= 0x01;
        assert!(!tx.verify(&prevs).unwrap());
    }

    #[test]
    fn test_tampered_output_fails() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let prev = funded(&alice, 50);
        let prevs = prev_map(&[&prev]);

        let mut tx = spend(&alice, &prev, &bob, 50);
        tx.sign(&alice.secret_key, &prevs).unwrap();
        tx.outputs[0].value = 49;
        tx.id = tx.hash();
        assert!(!tx.verify(&prevs).unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let prev = funded(&alice, 50);
        let prevs = prev_map(&[&prev]);

        // Mallory signs with Mallory's own key over Alice's output
        let mut tx = spend(&mallory, &prev, &mallory, 50);
        tx.sign(&mallory.secret_key, &prevs).unwrap();
        assert!(!tx.verify(&prevs).unwrap());
    }

    #[test]
    fn test_missing_prev_transaction() {
        let alice = KeyPair::generate();
        let prev = funded(&alice, 50);
        let tx = spend(&alice, &prev, &alice, 50);

        let err = tx.verify(&HashMap::new()).unwrap_err();
        assert!(matches!(err, LedgerError::PrevTransactionMissing(id) if id == prev.id));
    }

    #[test]
    fn test_out_of_range_output_fails_closed() {
        let alice = KeyPair::generate();
        let prev = funded(&alice, 50);
        let prevs = prev_map(&[&prev]);

        let tx = Transaction::new(
            vec![TxInput::new(prev.id, 3, alice.public_key_bytes())],
            vec![TxOutput::new(1, alice.pubkey_hash())],
        );
        assert!(!tx.verify(&prevs).unwrap());
    }

    #[test]
    fn test_total_output_value_overflow() {
        let kp = KeyPair::generate();
        let tx = Transaction::new(
            vec![TxInput::coinbase(b"data".to_vec())],
            vec![TxOutput::new(u64::MAX, kp.pubkey_hash()), TxOutput::new(2, kp.pubkey_hash())],
        );
        assert_eq!(tx.total_output_value(), None);

        let tx = funded(&kp, 50);
        assert_eq!(tx.total_output_value(), Some(50));
    }

    #[test]
    fn test_sign_rejects_coinbase_style_input() {
        let alice = KeyPair::generate();
        let prev = funded(&alice, 50);
        let mut tx = spend(&alice, &prev, &alice, 50);
        tx.inputs.push(TxInput::coinbase(b"extra".to_vec()));
        let mut tx = Transaction::new(tx.inputs, tx.outputs);
        let id = tx.id;

        let err = tx.sign(&alice.secret_key, &prev_map(&[&prev])).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransaction { id: err_id, .. } if err_id == id));
    }
}
