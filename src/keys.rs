//! Deterministic signing keys and aggregate signatures
//!
//! The key subsystem is an external collaborator of the protocol; this module
//! gives it the narrow shape the builders need: derive a key per index, sign a
//! message for a public key the wallet holds, and merge signatures from several
//! parties into one aggregate that the ledger verifies pairwise.

use crate::error::{ColoredCoinError, Result};
use crate::program::sha256;
use crate::script::Condition;
use crate::types::{CoinId, Hash};
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey, Verification};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One signature contribution: `signature` by `pubkey` over `message`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub pubkey: Vec<u8>,
    pub message: Hash,
    pub signature: Vec<u8>,
}

/// Aggregate signature: the set of partial signatures for one atomic bundle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSignature {
    pub parts: Vec<PartialSignature>,
}

impl AggregateSignature {
    pub fn from_parts(parts: Vec<PartialSignature>) -> Self {
        let mut aggregate = Self::default();
        for part in parts {
            aggregate.push(part);
        }
        aggregate
    }

    pub fn push(&mut self, part: PartialSignature) {
        if !self.parts.contains(&part) {
            self.parts.push(part);
        }
    }

    /// Merge another aggregate into this one
    pub fn merge(&mut self, other: AggregateSignature) {
        for part in other.parts {
            self.push(part);
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// AggregateVerify: every required (pubkey, message) pair is covered by a
    /// valid partial signature
    pub fn verify<C: Verification>(&self, secp: &Secp256k1<C>, required: &[(Vec<u8>, Hash)]) -> bool {
        required.iter().all(|(pubkey, message)| {
            self.parts.iter().any(|part| {
                &part.pubkey == pubkey && &part.message == message && verify_part(secp, part)
            })
        })
    }
}

fn verify_part<C: Verification>(secp: &Secp256k1<C>, part: &PartialSignature) -> bool {
    let pubkey = match PublicKey::from_slice(&part.pubkey) {
        Ok(pk) => pk,
        Err(_) => return false,
    };
    let signature = match Signature::from_compact(&part.signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(&part.message) {
        Ok(msg) => msg,
        Err(_) => return false,
    };
    secp.verify_ecdsa(&message, &signature, &pubkey).is_ok()
}

/// Message actually signed for a demand raised by the spend of `coin_id`
///
/// Binding the spent coin into the message keeps a signature from authorizing
/// the same conditions on any other coin locked by the same key.
pub fn coin_message(message: &Hash, coin_id: &CoinId) -> Hash {
    sha256(&[message, coin_id])
}

/// Produces signature contributions for the signature demands raised by
/// spending one coin
pub trait Signer {
    fn sign_conditions(&self, coin_id: &CoinId, conditions: &[Condition]) -> Result<AggregateSignature>;
}

/// Deterministic keychain: key `i` is derived from sha256(domain ‖ seed ‖ i)
pub struct Keychain {
    seed: [u8; 32],
    secp: Secp256k1<All>,
    issued: u32,
    index_by_pubkey: HashMap<Vec<u8>, u32>,
}

impl Keychain {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            seed,
            secp: Secp256k1::new(),
            issued: 0,
            index_by_pubkey: HashMap::new(),
        }
    }

    fn secret_key(&self, index: u32) -> Result<SecretKey> {
        let material = sha256(&[b"colored-coins/key", &self.seed, &index.to_be_bytes()]);
        Ok(SecretKey::from_slice(&material)?)
    }

    pub fn public_key(&self, index: u32) -> Result<PublicKey> {
        Ok(PublicKey::from_secret_key(&self.secp, &self.secret_key(index)?))
    }

    /// Issue the next key index
    pub fn next_public_key(&mut self) -> Result<(u32, PublicKey)> {
        let index = self.issued;
        let pubkey = self.public_key(index)?;
        self.index_by_pubkey.insert(pubkey.serialize().to_vec(), index);
        self.issued += 1;
        Ok((index, pubkey))
    }

    /// Number of key indices issued so far
    pub fn issued(&self) -> u32 {
        self.issued
    }

    /// Index of an issued key, if this keychain holds it
    pub fn index_of(&self, pubkey: &[u8]) -> Option<u32> {
        self.index_by_pubkey.get(pubkey).copied()
    }

    pub fn sign(&self, index: u32, message: &Hash) -> Result<PartialSignature> {
        let secret = self.secret_key(index)?;
        let msg = Message::from_digest_slice(message)?;
        let signature = self.secp.sign_ecdsa(&msg, &secret);
        Ok(PartialSignature {
            pubkey: PublicKey::from_secret_key(&self.secp, &secret).serialize().to_vec(),
            message: *message,
            signature: signature.serialize_compact().to_vec(),
        })
    }
}

impl Signer for Keychain {
    fn sign_conditions(&self, coin_id: &CoinId, conditions: &[Condition]) -> Result<AggregateSignature> {
        let mut aggregate = AggregateSignature::default();
        for condition in conditions {
            if let Condition::AggregateSignature { pubkey, message } = condition {
                let index = self.index_of(pubkey).ok_or_else(|| {
                    ColoredCoinError::Key(format!("no private key for {}", hex::encode(pubkey)))
                })?;
                aggregate.push(self.sign(index, &coin_message(message, coin_id))?);
            }
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let a = Keychain::from_seed([7; 32]);
        let b = Keychain::from_seed([7; 32]);
        let c = Keychain::from_seed([8; 32]);
        assert_eq!(a.public_key(3).unwrap(), b.public_key(3).unwrap());
        assert_ne!(a.public_key(3).unwrap(), c.public_key(3).unwrap());
        assert_ne!(a.public_key(3).unwrap(), a.public_key(4).unwrap());
    }

    #[test]
    fn test_issued_keys_are_indexed() {
        let mut keychain = Keychain::from_seed([1; 32]);
        let (index, pubkey) = keychain.next_public_key().unwrap();
        assert_eq!(index, 0);
        assert_eq!(keychain.issued(), 1);
        assert_eq!(keychain.index_of(&pubkey.serialize()), Some(0));
        assert_eq!(keychain.index_of(&[2u8; 33]), None);
    }

    #[test]
    fn test_sign_and_verify() {
        let mut keychain = Keychain::from_seed([2; 32]);
        let (_, pubkey) = keychain.next_public_key().unwrap();
        let message = [9u8; 32];
        let conditions = vec![Condition::AggregateSignature { pubkey: pubkey.serialize().to_vec(), message }];
        let aggregate = keychain.sign_conditions(&[4; 32], &conditions).unwrap();
        let secp = Secp256k1::verification_only();
        let pubkey = pubkey.serialize().to_vec();
        assert!(aggregate.verify(&secp, &[(pubkey.clone(), coin_message(&message, &[4; 32]))]));
        assert!(!aggregate.verify(&secp, &[(pubkey.clone(), message)]));
        assert!(!aggregate.verify(&secp, &[(pubkey, coin_message(&[8u8; 32], &[4; 32]))]));
    }

    #[test]
    fn test_sign_unknown_key_fails() {
        let keychain = Keychain::from_seed([3; 32]);
        let other = Keychain::from_seed([4; 32]).public_key(0).unwrap();
        let conditions =
            vec![Condition::AggregateSignature { pubkey: other.serialize().to_vec(), message: [0; 32] }];
        assert!(keychain.sign_conditions(&[0; 32], &conditions).is_err());
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let mut keychain = Keychain::from_seed([5; 32]);
        let (index, pubkey) = keychain.next_public_key().unwrap();
        let mut part = keychain.sign(index, &[1; 32]).unwrap();
        part.signature[10] ^= 0x01;
        let aggregate = AggregateSignature::from_parts(vec![part]);
        let secp = Secp256k1::verification_only();
        assert!(!aggregate.verify(&secp, &[(pubkey.serialize().to_vec(), [1; 32])]));
    }

    #[test]
    fn test_signature_does_not_carry_over_to_other_coin() {
        let mut keychain = Keychain::from_seed([9; 32]);
        let (_, pubkey) = keychain.next_public_key().unwrap();
        let message = [3u8; 32];
        let conditions = vec![Condition::AggregateSignature { pubkey: pubkey.serialize().to_vec(), message }];
        let first = keychain.sign_conditions(&[1; 32], &conditions).unwrap();
        let secp = Secp256k1::verification_only();
        let pubkey = pubkey.serialize().to_vec();
        assert!(first.verify(&secp, &[(pubkey.clone(), coin_message(&message, &[1; 32]))]));
        assert!(!first.verify(&secp, &[(pubkey, coin_message(&message, &[2; 32]))]));
    }

    #[test]
    fn test_merge_deduplicates() {
        let mut keychain = Keychain::from_seed([6; 32]);
        let (index, _) = keychain.next_public_key().unwrap();
        let part = keychain.sign(index, &[1; 32]).unwrap();
        let mut a = AggregateSignature::from_parts(vec![part.clone()]);
        a.merge(AggregateSignature::from_parts(vec![part]));
        assert_eq!(a.len(), 1);
    }
}
