// CLI commands

use crate::config::LedgerConfig;
use crate::core::{Block, Hash256, Transaction};
use crate::error::Result;
use crate::storage::{Blockchain, UtxoSet};
use crate::wallet::{Address, KeyPair};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wize-node")]
#[command(about = "Minimal UTXO ledger node", long_about = None)]
pub struct Cli {
    /// Node identifier; selects the database directory
    #[arg(long, global = true, env = "NODE_ID")]
    pub node_id: Option<String>,

    /// Directory holding node databases
    #[arg(long, global = true, env = "WIZE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a blockchain whose genesis reward goes to ADDRESS
    CreateBlockchain {
        #[arg(long)]
        address: String,
    },

    /// Generate a key pair and print its address and secret key
    NewKeypair,

    /// Get balance for an address
    Balance {
        address: String,
    },

    /// Send coins and mine the transaction immediately
    Send {
        /// Sender secret key, hex encoded
        #[arg(long)]
        from_key: String,
        /// Recipient address
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
    },

    /// Print every block from tip to genesis
    PrintChain,

    /// Get block by hash
    Block {
        hash: String,
    },

    /// Get blockchain height
    Height,

    /// List balances of every address holding unspent outputs
    Addresses,

    /// Rebuild the UTXO set from the chain
    ReindexUtxo,
}

/// CLI handler
pub struct CliHandler {
    config: LedgerConfig,
}

impl CliHandler {
    /// Resolve configuration: file first, then command line overrides
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = LedgerConfig::load(cli.config.as_deref())?;
        if let Some(node_id) = &cli.node_id {
            config.node_id = node_id.clone();
        }
        if let Some(data_dir) = &cli.data_dir {
            config.data_dir = data_dir.clone();
        }
        config.validate()?;

        Ok(Self { config })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Handle CLI command
    pub fn handle(&self, command: Commands) -> Result<()> {
        match command {
            Commands::CreateBlockchain { address } => self.create_blockchain(&address),
            Commands::NewKeypair => {
                let keypair = KeyPair::generate();
                println!("Address: {}", keypair.address());
                println!("Secret key: {}", keypair.secret_hex());
                Ok(())
            }
            Commands::Balance { address } => self.balance(&address),
            Commands::Send { from_key, to, amount } => self.send(&from_key, &to, amount),
            Commands::PrintChain => self.print_chain(),
            Commands::Block { hash } => {
                let chain = Blockchain::open(&self.config)?;
                let block = chain.get_block(&Hash256::from_hex(&hash)?)?;
                print_block(&block);
                Ok(())
            }
            Commands::Height => {
                let chain = Blockchain::open(&self.config)?;
                println!("Blockchain height: {}", chain.get_best_height()?);
                Ok(())
            }
            Commands::Addresses => {
                let chain = Blockchain::open(&self.config)?;
                for (address, balance) in chain.address_balances()? {
                    println!("{}: {}", address, balance);
                }
                Ok(())
            }
            Commands::ReindexUtxo => {
                let chain = Blockchain::open(&self.config)?;
                let count = UtxoSet::new(&chain)?.reindex()?;
                println!("Done! There are {} transactions in the UTXO set.", count);
                Ok(())
            }
        }
    }

    fn create_blockchain(&self, address: &str) -> Result<()> {
        let address: Address = address.parse()?;
        let chain = Blockchain::create(&address, &self.config)?;
        UtxoSet::new(&chain)?.reindex()?;

        println!("Genesis block: {}", chain.tip());
        println!("Done!");
        Ok(())
    }

    fn balance(&self, address: &str) -> Result<()> {
        let address: Address = address.parse()?;
        let chain = Blockchain::open(&self.config)?;
        let balance = UtxoSet::new(&chain)?.get_balance(&address)?;

        println!("Balance of '{}': {}", address, balance);
        Ok(())
    }

    fn send(&self, from_key: &str, to: &str, amount: u64) -> Result<()> {
        let from = KeyPair::from_secret_hex(from_key)?;
        let to: Address = to.parse()?;

        let chain = Blockchain::open(&self.config)?;
        let utxo_set = UtxoSet::new(&chain)?;

        let tx = Transaction::new_utxo_transaction(&from, &to, amount, &utxo_set)?;
        let reward = Transaction::new_coinbase(&from.address(), self.config.mining_reward, "")?;
        let block = chain.mine_block(vec![reward, tx])?;
        utxo_set.update(&block)?;

        println!("Sent {} from {} to {}", amount, from.address(), to);
        println!("Mined block {} at height {}", block.hash, block.height);
        Ok(())
    }

    fn print_chain(&self) -> Result<()> {
        let chain = Blockchain::open(&self.config)?;
        for block in chain.iter() {
            print_block(&block?);
            println!();
        }
        Ok(())
    }
}

/// Print block information
fn print_block(block: &Block) {
    println!("============ Block {} ============", block.hash);
    println!("Height: {}", block.height);
    match &block.prev_block_hash {
        Some(prev) => println!("Prev. block: {}", prev),
        None => println!("Prev. block: (genesis)"),
    }
    println!("Timestamp: {}", block.timestamp);
    println!("Nonce: {}", block.nonce);
    println!("Merkle root: {}", block.hash_transactions());

    for tx in &block.transactions {
        println!("--- Transaction {}:", tx.id);
        for (i, input) in tx.inputs.iter().enumerate() {
            match &input.prev_tx_id {
                Some(prev) => println!("  Input {}: {}:{}", i, prev, input.prev_index),
                None => println!("  Input {}: coinbase", i),
            }
        }
        for (i, output) in tx.outputs.iter().enumerate() {
            println!(
                "  Output {}: {} to {}",
                i,
                output.value,
                Address::from_pubkey_hash(&output.pubkey_hash)
            );
        }
    }
}
