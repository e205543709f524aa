//! Transaction blocks.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{CoSignatures, Cosigned};
use crate::primitives::Hash256;

/// Header of a transaction block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxBlockHeader {
    /// Header format version.
    pub version: u32,
    /// Tx block number.
    pub block_num: u64,
    /// The DS block number of the epoch this block belongs to.
    pub ds_block_num: u64,
    /// Number of transactions in the block.
    pub num_txs: u32,
    /// State root after applying the block.
    pub state_root: Hash256,
    /// Hash of the previous tx block's header.
    pub prev_hash: Hash256,
    /// Serialized public key of the block proposer.
    pub miner_pubkey: Vec<u8>,
}

/// A co-signed transaction block. Transaction bodies are stored
/// separately, keyed by transaction hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct TxBlock {
    /// The block header.
    pub header: TxBlockHeader,
    /// The committee co-signatures.
    pub cosigs: CoSignatures,
    /// Hashes of the transactions committed by this block.
    pub tx_hashes: Vec<Hash256>,
}

impl Cosigned for TxBlock {
    fn header_bytes(&self) -> Vec<u8> {
        self.header.encode()
    }

    fn cosigs(&self) -> &CoSignatures {
        &self.cosigs
    }
}
