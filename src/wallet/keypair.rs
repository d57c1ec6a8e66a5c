// Key management and ECDSA helpers

use crate::core::{Hash256, PubKeyHash, hash160};
use crate::error::{LedgerError, Result};
use crate::wallet::Address;
use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// secp256k1 key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = OsRng;

        let secret_key = SecretKey::new(&mut rng);
        let public_key = secret_key.public_key(&secp);

        Self {
            secret_key,
            public_key,
        }
    }

    /// Create from secret key bytes
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
        let public_key = secret_key.public_key(&secp);

        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn from_secret_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| LedgerError::InvalidKey(e.to_string()))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get compressed public key bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    /// Get pubkey hash
    pub fn pubkey_hash(&self) -> PubKeyHash {
        hash160(&self.public_key.serialize())
    }

    pub fn address(&self) -> Address {
        Address::from_pubkey_hash(&self.pubkey_hash())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish()
    }
}

/// Sign a 32-byte digest, returning the 64-byte compact signature
pub fn sign_digest(secret_key: &SecretKey, digest: &Hash256) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let message = Message::from_digest(digest.0);
    secp.sign_ecdsa(&message, secret_key)
        .serialize_compact()
        .to_vec()
}

/// Verify a compact signature over `digest`; malformed keys or signatures fail
pub fn verify_signature(public_key: &[u8], digest: &Hash256, signature: &[u8]) -> bool {
    let Ok(public_key) = PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(signature) else {
        return false;
    };

    let secp = Secp256k1::verification_only();
    let message = Message::from_digest(digest.0);
    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sha256;

    #[test]
    fn test_keypair_generation() {
        let kp = KeyPair::generate();

        assert_eq!(kp.public_key_bytes().len(), 33); // Compressed pubkey
        assert_eq!(kp.pubkey_hash().len(), 20);
        assert_eq!(kp.address().to_pubkey_hash().unwrap(), kp.pubkey_hash());
    }

    #[test]
    fn test_secret_hex_round_trip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(restored.public_key, kp.public_key);
    }

    #[test]
    fn test_invalid_secret() {
        assert!(matches!(
            KeyPair::from_secret_hex("zz"),
            Err(LedgerError::InvalidKey(_))
        ));
        assert!(KeyPair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let kp = KeyPair::generate();
        let digest = sha256(b"payload");
        let sig = sign_digest(&kp.secret_key, &digest);

        assert_eq!(sig.len(), 64);
        assert!(verify_signature(&kp.public_key_bytes(), &digest, &sig));
        assert!(!verify_signature(&kp.public_key_bytes(), &sha256(b"other"), &sig));

        let other = KeyPair::generate();
        assert!(!verify_signature(&other.public_key_bytes(), &digest, &sig));
    }

    #[test]
    fn test_malformed_inputs_fail_closed() {
        let kp = KeyPair::generate();
        let digest = sha256(b"payload");
        assert!(!verify_signature(&[1, 2, 3], &digest, &[0u8; 64]));
        assert!(!verify_signature(&kp.public_key_bytes(), &digest, &[0u8; 10]));
    }
}
