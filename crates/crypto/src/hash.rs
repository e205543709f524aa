//! SHA2-256 hashing and the address/key derivations built on it.

use mizar_types::{Address, Hash256, ACC_ADDR_SIZE};
use sha2::{Digest, Sha256};

/// SHA2-256 of a byte sequence.
pub fn sha256(data: &[u8]) -> Hash256 {
    Hash256(Sha256::digest(data).into())
}

/// Derives an account address from a serialized public key: the
/// low-order 20 bytes of the key's SHA2-256 digest.
pub fn address_from_pubkey(pubkey: &[u8]) -> Address {
    let digest = sha256(pubkey);
    let mut addr = [0u8; ACC_ADDR_SIZE];
    addr.copy_from_slice(&digest.0[digest.0.len() - ACC_ADDR_SIZE..]);
    Address(addr)
}

/// Derives the address of a contract created by `sender` at `nonce`:
/// the low-order 20 bytes of SHA2-256 over the sender address followed
/// by the big-endian nonce.
pub fn contract_address(sender: &Address, nonce: u64) -> Address {
    let mut preimage = Vec::with_capacity(ACC_ADDR_SIZE + 8);
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    let digest = sha256(&preimage);
    let mut addr = [0u8; ACC_ADDR_SIZE];
    addr.copy_from_slice(&digest.0[digest.0.len() - ACC_ADDR_SIZE..]);
    Address(addr)
}

/// The storage key for a contract variable: SHA2-256 of its UTF-8 name.
pub fn key_hash(vname: &str) -> Hash256 {
    sha256(vname.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_derivation_is_deterministic() {
        let pk = [0x02u8; 33];
        assert_eq!(address_from_pubkey(&pk), address_from_pubkey(&pk));
        assert_ne!(address_from_pubkey(&pk), address_from_pubkey(&[0x03u8; 33]));
    }

    #[test]
    fn contract_address_injective_in_nonce() {
        let sender = Address([5u8; 20]);
        let mut seen = std::collections::HashSet::new();
        for nonce in 0..64u64 {
            assert!(seen.insert(contract_address(&sender, nonce)));
        }
    }

    #[test]
    fn key_hash_matches_plain_sha256() {
        assert_eq!(key_hash("_balance"), sha256(b"_balance"));
    }
}
