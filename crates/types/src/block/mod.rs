//! The block family: directory-service, view-change, fallback, and
//! transaction blocks, with their shared co-signature machinery.

mod ds;
mod fallback;
mod link;
mod tx;
mod vc;

pub use ds::{DsBlock, DsBlockHeader};
pub use fallback::{
    FallbackBlock, FallbackBlockHeader, FallbackBlockWShards, ShardingStructure,
    SHARDING_STRUCTURE_VERSION,
};
pub use link::{BlockLink, BlockLinkChain};
pub use tx::{TxBlock, TxBlockHeader};
pub use vc::{VcBlock, VcBlockHeader};

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::primitives::{pack_bit_vector, Hash256};

/// The two-round committee co-signature attached to every block: the
/// first-round aggregate `cs1` with its signer bitmap `b1`, and the
/// final aggregate `cs2` with bitmap `b2`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default, Encode, Decode)]
pub struct CoSignatures {
    /// First-round aggregated signature (48-byte compressed G1).
    pub cs1: Vec<u8>,
    /// First-round signer bitmap over the committee.
    pub b1: Vec<bool>,
    /// Final aggregated signature (48-byte compressed G1).
    pub cs2: Vec<u8>,
    /// Final signer bitmap over the committee.
    pub b2: Vec<bool>,
}

/// Block category tags, used for storage dispatch and block links.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode,
)]
pub enum BlockType {
    /// Directory-service block.
    Ds,
    /// View-change block.
    Vc,
    /// Fallback block.
    Fb,
    /// Transaction block.
    Tx,
}

/// Common surface of every co-signed block: the serialized header, the
/// attached co-signatures, and the derived hash and preimage.
pub trait Cosigned {
    /// Canonical serialization of the block header.
    fn header_bytes(&self) -> Vec<u8>;

    /// The attached co-signatures.
    fn cosigs(&self) -> &CoSignatures;

    /// The block hash: SHA2-256 of the serialized header.
    fn block_hash(&self) -> Hash256 {
        Hash256(Sha256::digest(self.header_bytes()).into())
    }

    /// The preimage the final co-signature `cs2` commits to: the
    /// serialized header, the first-round signature, and the packed
    /// first-round bitmap.
    fn cosig_preimage(&self) -> Vec<u8> {
        let mut out = self.header_bytes();
        out.extend_from_slice(&self.cosigs().cs1);
        out.extend_from_slice(&pack_bit_vector(&self.cosigs().b1));
        out
    }
}

/// A tagged entry in a directory-block sequence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum DirectoryBlock {
    /// A directory-service block.
    Ds(DsBlock),
    /// A view-change block.
    Vc(VcBlock),
    /// A fallback block together with the sharding structure it was
    /// produced under.
    Fallback(FallbackBlockWShards),
}
