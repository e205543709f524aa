#![forbid(unsafe_code)]

//! Transaction pre-validation and block-sequence validation.
//!
//! The validator checks incoming transactions against the account
//! store, verifies committee co-signatures, and walks directory-block
//! and tx-block sequences while maintaining the rolling DS committee
//! and the block-link chain.

pub mod committee;


use std::sync::Arc;

use log::warn;

use mizar_crypto::bls::{aggregate_public_keys, BlsSignature};
use mizar_crypto::eddsa::{Ed25519PublicKey, Ed25519Signature};
use mizar_crypto::hash::address_from_pubkey;
use mizar_state::SharedAccountStore;
use mizar_storage::BlockStorage;
use mizar_types::block::{
    BlockLink, BlockLinkChain, BlockType, Cosigned, DirectoryBlock, TxBlock,
};
use mizar_types::error::{StorageError, ValidatorError};
use mizar_types::transaction::{shard_index, Transaction, TransactionReceipt};
use mizar_types::Hash256;

pub use committee::{num_for_consensus, Committee};

/// Verdict of a tx-block sequence check. `StaleDsInfo` is not a
/// failure: it tells the caller to re-fetch directory blocks first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxBlockVerdict {
    /// The sequence is valid against the committee and link chain.
    Valid,
    /// The sequence is invalid and must be discarded.
    Invalid,
    /// The local directory info is behind the fetched blocks.
    StaleDsInfo,
}

/// Chain-level facts the validator needs per call, threaded explicitly
/// instead of read from process globals.
#[derive(Debug, Clone)]
pub struct ChainContext {
    /// The current tx epoch.
    pub current_epoch: u64,
    /// Number of transaction shards.
    pub num_shards: u32,
    /// The shard this node serves.
    pub shard_id: u32,
    /// Whether this node's DS role is idle, i.e. it runs as a plain
    /// shard node and must enforce shard placement.
    pub ds_idle: bool,
    /// Block number of the latest accepted DS block.
    pub last_ds_block_num: u64,
    /// Gas-price floor from the latest DS block.
    pub last_ds_gas_price: u128,
    /// Sharding-structure hash from the latest DS block.
    pub last_sharding_hash: Hash256,
}

/// The validator: transaction pre-conditions, co-signature checks, and
/// directory/tx block sequence validation.
pub struct Validator {
    chain_id: u16,
    store: SharedAccountStore,
    block_storage: Arc<BlockStorage>,
    link_chain: BlockLinkChain,
}

impl Validator {
    /// Builds a validator over the shared account store and block
    /// storage.
    pub fn new(chain_id: u16, store: SharedAccountStore, block_storage: Arc<BlockStorage>) -> Self {
        Self {
            chain_id,
            store,
            block_storage,
            link_chain: BlockLinkChain::new(),
        }
    }

    /// The link chain accumulated so far.
    pub fn link_chain(&self) -> &BlockLinkChain {
        &self.link_chain
    }

    /// The shared account store this validator writes through.
    pub fn store(&self) -> &SharedAccountStore {
        &self.store
    }

    /// The block storage this validator persists into.
    pub fn block_storage(&self) -> &Arc<BlockStorage> {
        &self.block_storage
    }

    /// Verifies the transaction signature over its core serialization.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<(), ValidatorError> {
        let pubkey = Ed25519PublicKey::from_bytes(&tx.sender_pubkey)
            .map_err(|_| ValidatorError::InvalidSignature)?;
        let signature = Ed25519Signature::from_bytes(&tx.signature)
            .map_err(|_| ValidatorError::InvalidSignature)?;
        pubkey
            .verify(&tx.core_bytes(), &signature)
            .map_err(|_| ValidatorError::InvalidSignature)
    }

    fn check_tx_preconditions(
        &self,
        tx: &Transaction,
        ctx: &ChainContext,
    ) -> Result<(), ValidatorError> {
        if tx.chain_id() != self.chain_id {
            warn!("chain id incorrect: {}", tx.chain_id());
            return Err(ValidatorError::WrongChainId {
                expected: self.chain_id,
                got: tx.chain_id(),
            });
        }

        let from = address_from_pubkey(&tx.sender_pubkey);
        if from.is_null() {
            warn!("invalid address for issuing transactions");
            return Err(ValidatorError::InvalidAddress);
        }

        let store = self.store.read();
        if !store.does_account_exist(&from) {
            warn!("sender not found: {from}, transaction rejected: {}", tx.id());
            return Err(ValidatorError::UnknownSender(from));
        }
        if store.get_balance(&from)? < tx.amount {
            warn!(
                "insufficient funds in source account {from} at epoch {}",
                ctx.current_epoch
            );
            return Err(ValidatorError::InsufficientBalance(from));
        }
        Ok(())
    }

    /// Validates a transaction received from consensus and applies it to
    /// the store's speculative overlay.
    pub fn check_created_transaction(
        &self,
        tx: &Transaction,
        receipt: &mut TransactionReceipt,
        ctx: &ChainContext,
    ) -> Result<(), ValidatorError> {
        self.check_tx_preconditions(tx, ctx)?;
        receipt.set_epoch_num(ctx.current_epoch);
        self.store
            .write()
            .update_accounts_temp(ctx.current_epoch, ctx.num_shards, !ctx.ds_idle, tx, receipt)
            .map_err(ValidatorError::from)
    }

    /// Validates a transaction forwarded by a lookup node: the basic
    /// pre-conditions plus shard placement, the gas-price floor, and
    /// the sender signature. Does not touch the store.
    pub fn check_created_transaction_from_lookup(
        &self,
        tx: &Transaction,
        ctx: &ChainContext,
    ) -> Result<(), ValidatorError> {
        if tx.chain_id() != self.chain_id {
            warn!("chain id incorrect: {}", tx.chain_id());
            return Err(ValidatorError::WrongChainId {
                expected: self.chain_id,
                got: tx.chain_id(),
            });
        }

        let from = address_from_pubkey(&tx.sender_pubkey);
        if from.is_null() {
            warn!("invalid address for issuing transactions");
            return Err(ValidatorError::InvalidAddress);
        }

        if ctx.ds_idle {
            let from_shard = shard_index(&from, ctx.num_shards);
            if from_shard != ctx.shard_id {
                warn!(
                    "tx not sharded to this node: sender shard {from_shard}, this shard {}",
                    ctx.shard_id
                );
                return Err(ValidatorError::WrongShard {
                    expected: from_shard,
                    got: ctx.shard_id,
                });
            }
            if tx.is_contract_call() {
                let to_shard = shard_index(&tx.to_addr, ctx.num_shards);
                if to_shard != from_shard {
                    warn!(
                        "contract call crosses shards: from {from_shard}, to {to_shard}"
                    );
                    return Err(ValidatorError::WrongShard {
                        expected: from_shard,
                        got: to_shard,
                    });
                }
            }
        }

        if tx.gas_price < ctx.last_ds_gas_price {
            warn!(
                "gas price {} lower than minimum allowable {}",
                tx.gas_price, ctx.last_ds_gas_price
            );
            return Err(ValidatorError::LowGasPrice {
                min: ctx.last_ds_gas_price,
                got: tx.gas_price,
            });
        }

        self.verify_transaction(tx)?;

        let store = self.store.read();
        if !store.does_account_exist(&from) {
            warn!("sender not found: {from}, transaction rejected: {}", tx.id());
            return Err(ValidatorError::UnknownSender(from));
        }
        if store.get_balance(&from)? < tx.amount {
            warn!("insufficient funds in source account {from}");
            return Err(ValidatorError::InsufficientBalance(from));
        }
        Ok(())
    }

    /// Verifies a block's final co-signature against a committee: the
    /// signer bitmap must cover the committee exactly, the signer count
    /// must meet the consensus threshold, and the aggregated key of the
    /// selected members must verify `cs2` over the cosig preimage.
    pub fn check_block_cosignature<B: Cosigned>(
        block: &B,
        committee: &Committee,
    ) -> Result<(), ValidatorError> {
        let cosigs = block.cosigs();
        if committee.len() != cosigs.b2.len() {
            warn!(
                "mismatch: committee size = {}, co-sig bitmap size = {}",
                committee.len(),
                cosigs.b2.len()
            );
            return Err(ValidatorError::InvalidCosig("bitmap size mismatch".into()));
        }

        let keys: Vec<_> = committee
            .iter()
            .zip(&cosigs.b2)
            .filter(|(_, signed)| **signed)
            .map(|((key, _), _)| *key)
            .collect();

        if keys.len() != num_for_consensus(cosigs.b2.len()) {
            warn!("co-sig was not generated by enough nodes: {}", keys.len());
            return Err(ValidatorError::InvalidCosig(
                "co-signature not generated by enough nodes".into(),
            ));
        }

        let aggregated = aggregate_public_keys(&keys)
            .map_err(|e| ValidatorError::InvalidCosig(format!("key aggregation failed: {e}")))?;
        let cs2 = BlsSignature::from_bytes(&cosigs.cs2)
            .map_err(|e| ValidatorError::InvalidCosig(format!("undecodable cs2: {e}")))?;
        aggregated
            .verify(&block.cosig_preimage(), &cs2)
            .map_err(|_| ValidatorError::InvalidCosig("co-sig verification failed".into()))
    }

    fn persist(&self, ok: bool, what: &str) -> Result<(), ValidatorError> {
        if ok {
            Ok(())
        } else {
            Err(ValidatorError::Storage(StorageError::Backend(format!(
                "failed to persist {what}"
            ))))
        }
    }

    /// Walks a directory-block sequence, verifying linkage and
    /// co-signatures while rotating the committee, persisting each
    /// accepted block and appending its link.
    ///
    /// On success the rotated committee is returned; on failure the
    /// partially rotated committee is dropped with the error.
    pub fn check_dir_blocks(
        &mut self,
        dir_blocks: &[DirectoryBlock],
        init_ds_comm: &Committee,
        index_num: u64,
        ctx: &ChainContext,
    ) -> Result<Committee, ValidatorError> {
        let mut mutable_ds_comm = init_ds_comm.clone();
        let mut prev_ds_block_num = ctx.last_ds_block_num;
        let mut prev_sharding_hash = ctx.last_sharding_hash;
        let mut total_index = index_num;

        for dir_block in dir_blocks {
            match dir_block {
                DirectoryBlock::Ds(ds_block) => {
                    if ds_block.header.block_num != prev_ds_block_num + 1 {
                        warn!(
                            "DS blocks not in sequence: {} after {}",
                            ds_block.header.block_num, prev_ds_block_num
                        );
                        return Err(ValidatorError::BadBlockSequence(format!(
                            "DS block {} does not follow {}",
                            ds_block.header.block_num, prev_ds_block_num
                        )));
                    }
                    Self::check_block_cosignature(ds_block, &mutable_ds_comm).map_err(|e| {
                        warn!("co-sig verification of DS block {} failed", prev_ds_block_num + 1);
                        e
                    })?;

                    prev_ds_block_num += 1;
                    prev_sharding_hash = ds_block.header.sharding_hash;
                    self.persist(
                        self.block_storage
                            .put_ds_block(ds_block.header.block_num, ds_block),
                        "DS block",
                    )?;
                    self.link_chain.add_link(
                        total_index,
                        prev_ds_block_num,
                        BlockType::Ds,
                        ds_block.block_hash(),
                    );
                    committee::update_after_ds_block(&mut mutable_ds_comm, ds_block)?;
                    total_index += 1;
                }
                DirectoryBlock::Vc(vc_block) => {
                    if vc_block.header.view_change_ds_epoch != prev_ds_block_num + 1 {
                        warn!(
                            "VC block DS epoch {} does not match the epoch being processed {}",
                            vc_block.header.view_change_ds_epoch, prev_ds_block_num
                        );
                        return Err(ValidatorError::BadBlockSequence(format!(
                            "VC block for DS epoch {} while processing {}",
                            vc_block.header.view_change_ds_epoch, prev_ds_block_num
                        )));
                    }
                    Self::check_block_cosignature(vc_block, &mutable_ds_comm).map_err(|e| {
                        warn!("co-sig verification of VC block in {} failed", prev_ds_block_num);
                        e
                    })?;

                    committee::update_after_vc_block(&mut mutable_ds_comm, vc_block)?;
                    self.persist(
                        self.block_storage
                            .put_vc_block(&vc_block.block_hash(), vc_block),
                        "VC block",
                    )?;
                    self.link_chain.add_link(
                        total_index,
                        prev_ds_block_num + 1,
                        BlockType::Vc,
                        vc_block.block_hash(),
                    );
                    total_index += 1;
                }
                DirectoryBlock::Fallback(fallback) => {
                    let block = &fallback.block;
                    if block.header.fallback_ds_epoch != prev_ds_block_num + 1 {
                        warn!(
                            "fallback block DS epoch {} does not match the epoch being processed {}",
                            block.header.fallback_ds_epoch, prev_ds_block_num
                        );
                        return Err(ValidatorError::BadBlockSequence(format!(
                            "fallback block for DS epoch {} while processing {}",
                            block.header.fallback_ds_epoch, prev_ds_block_num
                        )));
                    }

                    if fallback.shards.hash() != prev_sharding_hash {
                        warn!("sharding hash does not match");
                        return Err(ValidatorError::BadBlockSequence(
                            "sharding structure hash mismatch".into(),
                        ));
                    }

                    let shard_id = block.header.shard_id as usize;
                    let shard = fallback.shards.shards.get(shard_id).ok_or_else(|| {
                        ValidatorError::BadBlockSequence(format!(
                            "fallback names shard {shard_id} of {}",
                            fallback.shards.shards.len()
                        ))
                    })?;
                    let shard_comm = committee::decode_committee(shard)?;
                    Self::check_block_cosignature(block, &shard_comm).map_err(|e| {
                        warn!(
                            "co-sig verification of fallback block in {} failed",
                            prev_ds_block_num
                        );
                        e
                    })?;

                    committee::update_after_fallback_block(&mut mutable_ds_comm, block)?;
                    self.persist(
                        self.block_storage
                            .put_fallback_block(&block.block_hash(), fallback),
                        "fallback block",
                    )?;
                    self.link_chain.add_link(
                        total_index,
                        prev_ds_block_num + 1,
                        BlockType::Fb,
                        block.block_hash(),
                    );
                    total_index += 1;
                }
            }
        }

        Ok(mutable_ds_comm)
    }

    /// Validates a fetched tx-block sequence against the DS committee
    /// and the latest block link: the newest block must belong to the
    /// latest DS epoch and carry a valid co-signature, and every block
    /// must link to its predecessor.
    pub fn check_tx_blocks(
        tx_blocks: &[TxBlock],
        ds_comm: &Committee,
        latest_link: &BlockLink,
    ) -> TxBlockVerdict {
        let mut latest_ds_index = latest_link.ds_index;
        if latest_link.block_type != BlockType::Ds {
            if latest_ds_index == 0 {
                warn!("latest DS index is 0 and the link is not a DS block");
                return TxBlockVerdict::Invalid;
            }
            latest_ds_index -= 1;
        }

        let Some(latest_tx_block) = tx_blocks.last() else {
            warn!("empty tx block sequence");
            return TxBlockVerdict::Invalid;
        };

        if latest_tx_block.header.ds_block_num != latest_ds_index {
            if latest_ds_index > latest_tx_block.header.ds_block_num {
                warn!(
                    "latest tx block fetched is stale: {} vs {}",
                    latest_ds_index, latest_tx_block.header.ds_block_num
                );
                return TxBlockVerdict::Invalid;
            }
            warn!(
                "latest DS index {} does not match the latest tx block DS num {}, refetch",
                latest_ds_index, latest_tx_block.header.ds_block_num
            );
            return TxBlockVerdict::StaleDsInfo;
        }

        if Self::check_block_cosignature(latest_tx_block, ds_comm).is_err() {
            return TxBlockVerdict::Invalid;
        }

        if tx_blocks.len() < 2 {
            return TxBlockVerdict::Valid;
        }

        let mut prev_hash = latest_tx_block.header.prev_hash;
        for block in tx_blocks[..tx_blocks.len() - 1].iter().rev() {
            if prev_hash != block.block_hash() {
                warn!(
                    "prev hash {} does not match the hash of block {}",
                    prev_hash, block.header.block_num
                );
                return TxBlockVerdict::Invalid;
            }
            prev_hash = block.header.prev_hash;
        }

        TxBlockVerdict::Valid
    }
}
