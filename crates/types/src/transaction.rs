//! User transactions and their receipts.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::primitives::{Address, Hash256};

/// A signed user transaction.
///
/// `version` packs the chain id in its high 16 bits and the transaction
/// format version in the low 16 bits.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Transaction {
    /// Packed chain id and format version.
    pub version: u32,
    /// Sender-sequence number; must follow the account nonce.
    pub nonce: u64,
    /// Recipient, or the null address for contract creation.
    pub to_addr: Address,
    /// Serialized sender public key.
    pub sender_pubkey: Vec<u8>,
    /// Amount transferred.
    pub amount: u128,
    /// Offered gas price.
    pub gas_price: u128,
    /// Gas limit.
    pub gas_limit: u64,
    /// Contract code, non-empty only for creation transactions.
    pub code: Vec<u8>,
    /// Call data or init data.
    pub data: Vec<u8>,
    /// Signature over the core-field serialization.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Serializes every field except the signature; this is the signing
    /// and identification preimage.
    pub fn core_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.version.encode_to(&mut out);
        self.nonce.encode_to(&mut out);
        self.to_addr.encode_to(&mut out);
        self.sender_pubkey.encode_to(&mut out);
        self.amount.encode_to(&mut out);
        self.gas_price.encode_to(&mut out);
        self.gas_limit.encode_to(&mut out);
        self.code.encode_to(&mut out);
        self.data.encode_to(&mut out);
        out
    }

    /// The transaction id: SHA2-256 of the core serialization.
    pub fn id(&self) -> Hash256 {
        let digest = Sha256::digest(self.core_bytes());
        Hash256(digest.into())
    }

    /// The chain id packed into the high 16 bits of `version`.
    pub fn chain_id(&self) -> u16 {
        (self.version >> 16) as u16
    }

    /// Whether this transaction creates a contract.
    pub fn is_contract_creation(&self) -> bool {
        !self.code.is_empty() && self.to_addr.is_null()
    }

    /// Whether this transaction calls an existing contract.
    pub fn is_contract_call(&self) -> bool {
        !self.data.is_empty() && !self.to_addr.is_null()
    }
}

/// Packs a chain id and format version into a transaction `version` word.
pub fn pack_version(chain_id: u16, tx_version: u16) -> u32 {
    ((chain_id as u32) << 16) | tx_version as u32
}

/// The shard an address belongs to: the address's last four bytes read
/// big-endian, reduced modulo the shard count.
pub fn shard_index(addr: &Address, num_shards: u32) -> u32 {
    if num_shards == 0 {
        return 0;
    }
    let tail: [u8; 4] = addr.0[16..20].try_into().unwrap();
    u32::from_be_bytes(tail) % num_shards
}

/// Outcome record of one applied transaction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct TransactionReceipt {
    /// Whether the transaction applied successfully.
    pub success: bool,
    /// The epoch in which the transaction was applied.
    pub epoch_num: u64,
    /// Gas consumed up to and including this transaction.
    pub cumulative_gas: u64,
}

impl TransactionReceipt {
    /// Records the epoch the transaction was applied in.
    pub fn set_epoch_num(&mut self, epoch: u64) {
        self.epoch_num = epoch;
    }

    /// Marks the receipt as applied and records the gas charged.
    pub fn set_result(&mut self, success: bool, cumulative_gas: u64) {
        self.success = success;
        self.cumulative_gas = cumulative_gas;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::NULL_ADDRESS;

    fn sample_tx() -> Transaction {
        Transaction {
            version: pack_version(2, 1),
            nonce: 1,
            to_addr: Address([7u8; 20]),
            sender_pubkey: vec![1, 2, 3],
            amount: 500,
            gas_price: 10,
            gas_limit: 1,
            code: vec![],
            data: vec![],
            signature: vec![0xaa; 64],
        }
    }

    #[test]
    fn chain_id_unpacks_from_version() {
        assert_eq!(sample_tx().chain_id(), 2);
        assert_eq!(pack_version(0xbeef, 3) >> 16, 0xbeef);
    }

    #[test]
    fn id_ignores_signature() {
        let a = sample_tx();
        let mut b = a.clone();
        b.signature = vec![0xbb; 64];
        assert_eq!(a.id(), b.id());

        let mut c = a.clone();
        c.amount += 1;
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn kind_predicates() {
        let mut tx = sample_tx();
        assert!(!tx.is_contract_creation());
        assert!(!tx.is_contract_call());

        tx.data = vec![1];
        assert!(tx.is_contract_call());

        tx.to_addr = NULL_ADDRESS;
        tx.code = vec![1];
        assert!(tx.is_contract_creation());
        assert!(!tx.is_contract_call());
    }

    #[test]
    fn shard_index_uses_address_tail() {
        let mut addr = Address([0u8; 20]);
        addr.0[19] = 9;
        assert_eq!(shard_index(&addr, 4), 1);
        assert_eq!(shard_index(&addr, 0), 0);
        // Distinct shards for distinct tails under the same modulus.
        let mut other = addr;
        other.0[19] = 10;
        assert_ne!(shard_index(&addr, 4), shard_index(&other, 4));
    }
}
