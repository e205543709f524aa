//! The rolling DS committee and its rotation rules.

use std::collections::VecDeque;

use mizar_crypto::bls::BlsPublicKey;
use mizar_types::block::{DsBlock, FallbackBlock, VcBlock};
use mizar_types::error::ValidatorError;
use mizar_types::Peer;

/// A consensus committee in leader-first order.
pub type Committee = VecDeque<(BlsPublicKey, Peer)>;

/// The signer count a valid co-signature must carry for a committee of
/// `committee_size`. The formula is owned by the consensus layer; it is
/// consumed here as given.
pub fn num_for_consensus(committee_size: usize) -> usize {
    (2 * committee_size).div_ceil(3) + 1
}

fn decode_member(pubkey: &[u8], peer: &Peer) -> Result<(BlsPublicKey, Peer), ValidatorError> {
    let key = BlsPublicKey::from_bytes(pubkey)
        .map_err(|e| ValidatorError::InvalidCosig(format!("undecodable committee key: {e}")))?;
    Ok((key, *peer))
}

/// Decodes a serialized `(pubkey, peer)` roster into a [`Committee`].
pub fn decode_committee(members: &[(Vec<u8>, Peer)]) -> Result<Committee, ValidatorError> {
    members
        .iter()
        .map(|(pubkey, peer)| decode_member(pubkey, peer))
        .collect()
}

/// Rotates the committee for an accepted DS block: each PoW winner
/// enters at the front and the longest-standing member leaves the back.
pub fn update_after_ds_block(
    committee: &mut Committee,
    block: &DsBlock,
) -> Result<(), ValidatorError> {
    for (pubkey, peer) in &block.header.pow_winners {
        committee.push_front(decode_member(pubkey, peer)?);
        committee.pop_back();
    }
    Ok(())
}

/// Rotates the committee for an accepted VC block: every faulty member
/// named by the block is replaced, in place, by the view-change leader.
pub fn update_after_vc_block(
    committee: &mut Committee,
    block: &VcBlock,
) -> Result<(), ValidatorError> {
    let leader = decode_member(&block.header.leader_pubkey, &block.header.leader_peer)?;
    for (faulty_pubkey, _) in &block.header.faulty_leaders {
        let faulty = BlsPublicKey::from_bytes(faulty_pubkey)
            .map_err(|e| ValidatorError::InvalidCosig(format!("undecodable faulty key: {e}")))?;
        if let Some(member) = committee.iter_mut().find(|(key, _)| *key == faulty) {
            *member = leader;
        }
    }
    Ok(())
}

/// Rotates the committee for an accepted fallback block: the fallback
/// shard's leader joins at the front and the back member leaves.
pub fn update_after_fallback_block(
    committee: &mut Committee,
    block: &FallbackBlock,
) -> Result<(), ValidatorError> {
    committee.push_front(decode_member(
        &block.header.leader_pubkey,
        &block.header.leader_peer,
    )?);
    committee.pop_back();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_threshold_formula() {
        assert_eq!(num_for_consensus(3), 3);
        assert_eq!(num_for_consensus(6), 5);
        assert_eq!(num_for_consensus(9), 7);
        assert_eq!(num_for_consensus(10), 8);
        assert_eq!(num_for_consensus(600), 401);
    }
}
