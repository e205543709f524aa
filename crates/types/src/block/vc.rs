//! View-change blocks.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use super::{CoSignatures, Cosigned};
use crate::primitives::{Hash256, Peer};

/// Header of a view-change block, produced when a committee leader is
/// replaced within a DS epoch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct VcBlockHeader {
    /// Header format version.
    pub version: u32,
    /// The DS epoch the view change happens in; equals the number of
    /// the DS block being formed.
    pub view_change_ds_epoch: u64,
    /// Tx epoch at which the view change was triggered.
    pub view_change_epoch: u64,
    /// How many view changes have happened in this epoch so far.
    pub vc_counter: u32,
    /// Committee members ejected by this view change.
    pub faulty_leaders: Vec<(Vec<u8>, Peer)>,
    /// Serialized public key of the new leader.
    pub leader_pubkey: Vec<u8>,
    /// Network endpoint of the new leader.
    pub leader_peer: Peer,
    /// Hash of the previous block in the directory chain.
    pub prev_hash: Hash256,
}

/// A co-signed view-change block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct VcBlock {
    /// The block header.
    pub header: VcBlockHeader,
    /// The committee co-signatures.
    pub cosigs: CoSignatures,
}

impl Cosigned for VcBlock {
    fn header_bytes(&self) -> Vec<u8> {
        self.header.encode()
    }

    fn cosigs(&self) -> &CoSignatures {
        &self.cosigs
    }
}
