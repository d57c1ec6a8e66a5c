// Base58Check addresses

use crate::core::{PubKeyHash, double_sha256};
use crate::error::{LedgerError, Result};
use std::fmt;
use std::str::FromStr;

/// Version byte prepended to the public key hash
pub const ADDRESS_VERSION: u8 = 0x00;
/// Number of checksum bytes appended to the payload
pub const CHECKSUM_LEN: usize = 4;

/// Base58Check(version || pubkey_hash || checksum)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Create address from public key hash
    pub fn from_pubkey_hash(hash: &PubKeyHash) -> Self {
        let mut payload = Vec::with_capacity(1 + hash.len() + CHECKSUM_LEN);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(hash);
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        Self(bs58::encode(payload).into_string())
    }

    /// Get address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the public key hash, verifying version and checksum
    pub fn to_pubkey_hash(&self) -> Result<PubKeyHash> {
        decode(&self.0)
    }

    /// Whether `address` is a well-formed address with a valid checksum
    pub fn validate(address: &str) -> bool {
        decode(address).is_ok()
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = double_sha256(payload);
    let mut check = [0u8; CHECKSUM_LEN];
    check.copy_from_slice(&hash[..CHECKSUM_LEN]);
    check
}

fn decode(address: &str) -> Result<PubKeyHash> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", address, e)))?;

    if bytes.len() != 1 + 20 + CHECKSUM_LEN {
        return Err(LedgerError::InvalidAddress(format!(
            "{}: unexpected length {}",
            address,
            bytes.len()
        )));
    }

    let (payload, check) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if payload[0] != ADDRESS_VERSION {
        return Err(LedgerError::InvalidAddress(format!("{}: unknown version", address)));
    }
    if checksum(payload).as_slice() != check {
        return Err(LedgerError::InvalidAddress(format!("{}: checksum mismatch", address)));
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok(hash)
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let hash = [0x12; 20];
        let addr = Address::from_pubkey_hash(&hash);

        assert_eq!(addr.to_pubkey_hash().unwrap(), hash);
        assert!(Address::validate(addr.as_str()));
        assert_eq!(addr.as_str().parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_address_starts_with_version_prefix() {
        // version 0x00 encodes as a leading '1' in base58
        let addr = Address::from_pubkey_hash(&[0xab; 20]);
        assert!(addr.as_str().starts_with('1'));
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let addr = Address::from_pubkey_hash(&[0x34; 20]);
        let mut bytes = bs58::decode(addr.as_str()).into_vec().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let tampered = bs58::encode(bytes).into_string();

        assert!(!Address::validate(&tampered));
        assert!(matches!(
            tampered.parse::<Address>(),
            Err(LedgerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(!Address::validate("not-an-address!"));
        assert!(!Address::validate(""));
        assert!(!Address::validate("1111"));
    }
}
