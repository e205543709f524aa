//! Directory-service blocks.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{CoSignatures, Cosigned};
use crate::primitives::{Hash256, Peer};

/// Header of a directory-service block. A DS block rotates the consensus
/// committee: its PoW winners join the committee when the block is
/// accepted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DsBlockHeader {
    /// Header format version.
    pub version: u32,
    /// DS block number; consecutive within the directory chain.
    pub block_num: u64,
    /// Tx epoch at which this DS block was produced.
    pub epoch_num: u64,
    /// Minimum gas price for the epoch this block opens.
    pub gas_price: u128,
    /// Serialized public key of the committee leader.
    pub leader_pubkey: Vec<u8>,
    /// PoW winners joining the committee, in committee order.
    pub pow_winners: Vec<(Vec<u8>, Peer)>,
    /// Hash of the sharding structure for the new epoch.
    pub sharding_hash: Hash256,
    /// Hash of the previous DS block.
    pub prev_hash: Hash256,
}

/// A co-signed directory-service block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct DsBlock {
    /// The block header.
    pub header: DsBlockHeader,
    /// The committee co-signatures.
    pub cosigs: CoSignatures,
}

impl Cosigned for DsBlock {
    fn header_bytes(&self) -> Vec<u8> {
        self.header.encode()
    }

    fn cosigs(&self) -> &CoSignatures {
        &self.cosigs
    }
}
