//! The link chain: an append-only index over all directory blocks.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::BlockType;
use crate::primitives::Hash256;

/// One entry in the link chain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BlockLink {
    /// Position in the full directory sequence.
    pub total_index: u64,
    /// Sequence number among DS blocks only.
    pub ds_index: u64,
    /// Category of the linked block.
    pub block_type: BlockType,
    /// Hash of the linked block.
    pub block_hash: Hash256,
}

/// An append-only sequence of block links, indexed by `total_index`.
#[derive(Debug, Clone, Default)]
pub struct BlockLinkChain {
    links: Vec<BlockLink>,
}

impl BlockLinkChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a link.
    pub fn add_link(
        &mut self,
        total_index: u64,
        ds_index: u64,
        block_type: BlockType,
        block_hash: Hash256,
    ) {
        self.links.push(BlockLink {
            total_index,
            ds_index,
            block_type,
            block_hash,
        });
    }

    /// The most recent link, if any.
    pub fn latest(&self) -> Option<&BlockLink> {
        self.links.last()
    }

    /// Number of links in the chain.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// The link at `total_index`, if present.
    pub fn get(&self, total_index: u64) -> Option<&BlockLink> {
        self.links.get(total_index as usize)
    }
}
