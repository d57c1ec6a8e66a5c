// Proof of Work implementation

use crate::core::{Block, Hash256, sha256};
use crate::error::{LedgerError, Result};
use std::time::{Duration, Instant};

/// Difficulty target expressed as a number of leading zero bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub bits: u32,
}

impl Target {
    /// Create a target requiring `bits` leading zero bits (1..=255)
    pub fn from_leading_zero_bits(bits: u32) -> Result<Self> {
        if !(1..=255).contains(&bits) {
            return Err(LedgerError::Config(format!(
                "target bits must be within 1..=255, got {}",
                bits
            )));
        }
        Ok(Self { bits })
    }

    /// Full 256-bit target, 2^(256 - bits), big-endian
    pub fn to_hash256(&self) -> Hash256 {
        let position = 256 - self.bits as usize;
        let mut target = [0u8; 32];
        target[31 - position / 8] = 1 << (position % 8);
        Hash256::new(target)
    }

    /// Check if a hash meets this target (hash < target)
    pub fn is_valid_hash(&self, hash: &Hash256) -> bool {
        // byte-wise comparison of big-endian arrays is numeric comparison
        hash.as_bytes() < self.to_hash256().as_bytes()
    }
}

/// Proof of Work over the block header digest
#[derive(Debug, Clone)]
pub struct ProofOfWork {
    pub target: Target,
    /// Cached target hash for fast comparison
    target_hash: Hash256,
}

impl ProofOfWork {
    /// Create a proof of work with fixed difficulty
    pub fn new(target_bits: u32) -> Result<Self> {
        let target = Target::from_leading_zero_bits(target_bits)?;
        Ok(Self {
            target,
            target_hash: target.to_hash256(),
        })
    }

    pub fn target_bits(&self) -> u32 {
        self.target.bits
    }

    /// Header bytes hashed for a given nonce
    ///
    /// prev_hash || merkle_root || timestamp || height || target_bits || nonce,
    /// integers big-endian.
    fn prepare_data(&self, block: &Block, merkle_root: &Hash256, nonce: u64) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + 32 + 8 + 8 + 4 + 8);
        if let Some(prev) = &block.prev_block_hash {
            data.extend_from_slice(prev.as_bytes());
        }
        data.extend_from_slice(merkle_root.as_bytes());
        data.extend_from_slice(&block.timestamp.to_be_bytes());
        data.extend_from_slice(&block.height.to_be_bytes());
        data.extend_from_slice(&self.target.bits.to_be_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        data
    }

    /// Digest of `block` with its stored nonce
    pub fn digest(&self, block: &Block) -> Hash256 {
        sha256(&self.prepare_data(block, &block.hash_transactions(), block.nonce))
    }

    /// Search nonces from 0 upward for the first digest below the target
    ///
    /// Blocks the calling thread until a nonce is found. The whole u64
    /// range is searched; exhausting it is reported as `NonceExhausted`.
    pub fn run(&self, block: &Block) -> Result<MiningResult> {
        let start_time = Instant::now();
        let merkle_root = block.hash_transactions();
        let mut attempts = 0u64;

        for nonce in 0..=u64::MAX {
            let hash = sha256(&self.prepare_data(block, &merkle_root, nonce));
            attempts += 1;

            if self.is_valid_hash_fast(&hash) {
                let duration = start_time.elapsed();
                log::debug!(
                    "Mined block at height {} with nonce {} after {} attempts in {:?}",
                    block.height, nonce, attempts, duration
                );
                return Ok(MiningResult {
                    nonce,
                    hash,
                    attempts,
                    duration,
                });
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!("Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }
        }

        Err(LedgerError::NonceExhausted)
    }

    #[inline]
    fn is_valid_hash_fast(&self, hash: &Hash256) -> bool {
        hash.as_bytes() < self.target_hash.as_bytes()
    }

    /// Recompute the digest with the stored nonce and check it against the target
    ///
    /// The digest must also equal the stored block hash.
    pub fn validate(&self, block: &Block) -> bool {
        let hash = self.digest(block);
        self.is_valid_hash_fast(&hash) && hash == block.hash
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: Hash256,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::KeyPair;

    fn sample_block(pow: &ProofOfWork) -> Block {
        let kp = KeyPair::generate();
        let cb = Transaction::new_coinbase(&kp.address(), 50, "pow").unwrap();
        Block::new(vec![cb], Some(Hash256::new([3; 32])), 7, pow).unwrap()
    }

    #[test]
    fn test_target_conversion() {
        let target = Target::from_leading_zero_bits(8).unwrap();
        let hash = target.to_hash256();
        assert_eq!(hash.as_bytes()[0], 1);
        assert!(hash.as_bytes()[1..].iter().all(|b| *b == 0));

        let target = Target::from_leading_zero_bits(12).unwrap();
        assert_eq!(target.to_hash256().as_bytes()[1], 0x10);
    }

    #[test]
    fn test_target_bounds() {
        assert!(Target::from_leading_zero_bits(0).is_err());
        assert!(Target::from_leading_zero_bits(256).is_err());
        assert!(Target::from_leading_zero_bits(255).is_ok());
    }

    #[test]
    fn test_target_validation() {
        let target = Target::from_leading_zero_bits(16).unwrap();

        // Zero hash should always be valid (lowest possible)
        assert!(target.is_valid_hash(&Hash256::zero()));

        // All 0xff hash should be invalid (highest possible)
        assert!(!target.is_valid_hash(&Hash256::new([0xff; 32])));

        // The target itself is not below the target
        assert!(!target.is_valid_hash(&target.to_hash256()));
    }

    #[test]
    fn test_run_and_validate_agree() {
        let pow = ProofOfWork::new(8).unwrap();
        let block = sample_block(&pow);

        assert!(pow.validate(&block));
        assert!(block.hash.as_bytes()[0] == 0);
    }

    #[test]
    fn test_other_nonce_does_not_validate() {
        let pow = ProofOfWork::new(8).unwrap();
        let mut block = sample_block(&pow);

        block.nonce = block.nonce.wrapping_add(1);
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_tampered_transactions_do_not_validate() {
        let pow = ProofOfWork::new(8).unwrap();
        let mut block = sample_block(&pow);

        block.transactions[0].outputs[0].value += 1;
        assert!(!pow.validate(&block));
    }

    #[test]
    fn test_validate_under_stricter_target() {
        let easy = ProofOfWork::new(1).unwrap();
        let hard = ProofOfWork::new(40).unwrap();
        let block = sample_block(&easy);

        // digest includes the target bits, so a stricter pow never accepts it
        assert!(!hard.validate(&block));
    }
}
