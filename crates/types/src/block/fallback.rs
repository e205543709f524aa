//! Fallback blocks and the sharding structure they are validated against.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CoSignatures, Cosigned};
use crate::primitives::{Hash256, Peer};

/// Version tag folded into the sharding-structure hash.
pub const SHARDING_STRUCTURE_VERSION: u32 = 1;

/// The partition of nodes into shards: each shard is a committee of
/// `(pubkey, peer)` members in consensus order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct ShardingStructure {
    /// The shard committees.
    pub shards: Vec<Vec<(Vec<u8>, Peer)>>,
}

impl ShardingStructure {
    /// The structure hash: SHA2-256 over the version tag and the
    /// canonical serialization.
    pub fn hash(&self) -> Hash256 {
        let mut preimage = SHARDING_STRUCTURE_VERSION.encode();
        self.encode_to(&mut preimage);
        Hash256(Sha256::digest(preimage).into())
    }
}

/// Header of a fallback block, committed by a non-DS shard when the DS
/// committee stalls.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FallbackBlockHeader {
    /// Header format version.
    pub version: u32,
    /// The DS epoch the fallback happens in; equals the number of the
    /// DS block being formed.
    pub fallback_ds_epoch: u64,
    /// Tx epoch at which the fallback was triggered.
    pub fallback_epoch: u64,
    /// Index of the shard that co-signed this block.
    pub shard_id: u32,
    /// Serialized public key of the fallback leader.
    pub leader_pubkey: Vec<u8>,
    /// Network endpoint of the fallback leader.
    pub leader_peer: Peer,
    /// State root at the time of the fallback.
    pub state_root: Hash256,
    /// Hash of the previous block in the directory chain.
    pub prev_hash: Hash256,
}

/// A co-signed fallback block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FallbackBlock {
    /// The block header.
    pub header: FallbackBlockHeader,
    /// The shard co-signatures.
    pub cosigs: CoSignatures,
}

impl Cosigned for FallbackBlock {
    fn header_bytes(&self) -> Vec<u8> {
        self.header.encode()
    }

    fn cosigs(&self) -> &CoSignatures {
        &self.cosigs
    }
}

/// A fallback block bundled with the sharding structure it was produced
/// under; the pair is what gets persisted and validated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct FallbackBlockWShards {
    /// The fallback block.
    pub block: FallbackBlock,
    /// The sharding structure in force when the block was produced.
    pub shards: ShardingStructure,
}
