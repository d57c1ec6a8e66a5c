// Wallet and transaction building

mod address;
mod keypair;
mod tx_builder;

pub use address::{ADDRESS_VERSION, Address, CHECKSUM_LEN};
pub use keypair::{KeyPair, sign_digest, verify_signature};
pub use tx_builder::TransactionBuilder;
