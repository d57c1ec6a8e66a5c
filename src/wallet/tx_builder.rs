// Transaction builder

use crate::core::{Transaction, TxInput, TxOutput};
use crate::error::{LedgerError, Result};
use crate::storage::UtxoSet;
use crate::wallet::{Address, KeyPair};

/// Builds signed payments from the outputs indexed in a UTXO set
pub struct TransactionBuilder<'a> {
    utxo_set: &'a UtxoSet<'a>,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(utxo_set: &'a UtxoSet<'a>) -> Self {
        Self { utxo_set }
    }

    /// Build a transaction paying `amount` from `from` to `to`
    ///
    /// Spends just enough of the sender's outputs to cover `amount` and
    /// returns the rest as change. No fee is taken.
    pub fn build(&self, from: &KeyPair, to: &Address, amount: u64) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let recipient = to.to_pubkey_hash()?;

        let sender = from.pubkey_hash();
        let (total_input, outpoints) = self.utxo_set.find_spendable_outputs(&sender, amount)?;

        let public_key = from.public_key_bytes();
        let inputs: Vec<TxInput> = outpoints
            .iter()
            .map(|outpoint| TxInput::new(outpoint.txid, outpoint.vout, public_key.clone()))
            .collect();

        // Payment output, then change
        let mut outputs = vec![TxOutput::new(amount, recipient)];
        if total_input > amount {
            outputs.push(TxOutput::new(total_input - amount, sender));
        }

        let mut tx = Transaction::new(inputs, outputs);
        self.utxo_set
            .blockchain()
            .sign_transaction(&mut tx, &from.secret_key)?;

        log::debug!(
            "Built transaction {} sending {} from {} to {}",
            tx.id,
            amount,
            from.address(),
            to
        );
        Ok(tx)
    }

    /// Get balance for address
    pub fn get_balance(&self, address: &Address) -> Result<u64> {
        self.utxo_set.get_balance(address)
    }
}

impl Transaction {
    /// Signed payment of `amount` from `from` to `to`, funded from `utxo_set`
    pub fn new_utxo_transaction(
        from: &KeyPair,
        to: &Address,
        amount: u64,
        utxo_set: &UtxoSet<'_>,
    ) -> Result<Transaction> {
        TransactionBuilder::new(utxo_set).build(from, to, amount)
    }
}
