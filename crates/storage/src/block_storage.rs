//! Persistent block, transaction-body, and metadata keyspaces.
//!
//! Each keyspace is its own redb table. DS and Tx blocks are keyed by
//! the 32-byte big-endian encoding of their block number so that range
//! scans come back in chain order; VC and fallback blocks are keyed by
//! block hash, transaction bodies by transaction hash, and metadata by
//! the decimal ASCII of its type ordinal.
//!
//! `put_*` report success as a bool and `get_*` as an `Option`; an
//! empty stored value is indistinguishable from absence and reads as
//! not-found.

use std::path::Path;
use std::sync::Arc;

use log::warn;
use mizar_types::block::{DsBlock, FallbackBlockWShards, TxBlock, VcBlock};
use mizar_types::error::StorageError;
use mizar_types::transaction::Transaction;
use mizar_types::Hash256;
use parity_scale_codec::{Decode, Encode};
use redb::{Database, ReadableTable, TableDefinition};

const DS_BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ds_blocks");
const TX_BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tx_blocks");
const VC_BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("vc_blocks");
const FALLBACK_BLOCKS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("fallback_blocks");
const TX_BODIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tx_bodies");
const METADATA: TableDefinition<&[u8], &[u8]> = TableDefinition::new("metadata");

const ALL_TABLES: [TableDefinition<'static, &[u8], &[u8]>; 6] = [
    DS_BLOCKS,
    TX_BLOCKS,
    VC_BLOCKS,
    FALLBACK_BLOCKS,
    TX_BODIES,
    METADATA,
];

/// Typed metadata slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MetaType {
    /// The last state root moved to disk by the account store.
    LatestStateRoot = 1,
    /// Marker set while a DS epoch is mid-commit.
    DsIncompleted = 2,
    /// The last fully persisted tx epoch.
    LatestEpoch = 3,
}

/// Encodes a block number the way the block keyspaces expect: a 32-byte
/// big-endian integer.
fn block_num_key(block_num: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    key[24..].copy_from_slice(&block_num.to_be_bytes());
    key
}

fn meta_key(ty: MetaType) -> Vec<u8> {
    (ty as u32).to_string().into_bytes()
}

/// Durable storage for blocks, transaction bodies, and node metadata.
pub struct BlockStorage {
    db: Arc<Database>,
}

impl BlockStorage {
    /// Opens (or creates) the block database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path).map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let w = db
                .begin_write()
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            for table in ALL_TABLES {
                w.open_table(table)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }
            w.commit().map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(Self { db: Arc::new(db) })
    }

    fn insert(
        &self,
        table: TableDefinition<'static, &[u8], &[u8]>,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StorageError> {
        let w = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        {
            let mut t = w
                .open_table(table)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            t.insert(key, value)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        w.commit().map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn lookup(
        &self,
        table: TableDefinition<'static, &[u8], &[u8]>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r
            .open_table(table)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let value = t
            .get(key)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|v| v.value().to_vec())
            .filter(|v| !v.is_empty());
        Ok(value)
    }

    fn scan(
        &self,
        table: TableDefinition<'static, &[u8], &[u8]>,
    ) -> Result<Vec<Vec<u8>>, StorageError> {
        let r = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let t = r
            .open_table(table)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let result = t
            .range::<&[u8]>(..)
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .map(|entry| {
                entry
                    .map(|(_, v)| v.value().to_vec())
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .collect();
        result
    }

    fn put_logged(&self, what: &str, result: Result<(), StorageError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("failed to persist {what}: {e}");
                false
            }
        }
    }

    fn decode_logged<T: Decode>(what: &str, bytes: &[u8]) -> Option<T> {
        match T::decode(&mut &*bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("failed to decode stored {what}: {e}");
                None
            }
        }
    }

    /// Persists a DS block under its block number.
    pub fn put_ds_block(&self, block_num: u64, block: &DsBlock) -> bool {
        self.put_logged(
            "DS block",
            self.insert(DS_BLOCKS, &block_num_key(block_num), &block.encode()),
        )
    }

    /// Reads the DS block with the given number.
    pub fn get_ds_block(&self, block_num: u64) -> Option<DsBlock> {
        let bytes = self.lookup(DS_BLOCKS, &block_num_key(block_num)).ok()??;
        Self::decode_logged("DS block", &bytes)
    }

    /// Persists a Tx block under its block number.
    pub fn put_tx_block(&self, block_num: u64, block: &TxBlock) -> bool {
        self.put_logged(
            "tx block",
            self.insert(TX_BLOCKS, &block_num_key(block_num), &block.encode()),
        )
    }

    /// Reads the Tx block with the given number.
    pub fn get_tx_block(&self, block_num: u64) -> Option<TxBlock> {
        let bytes = self.lookup(TX_BLOCKS, &block_num_key(block_num)).ok()??;
        Self::decode_logged("tx block", &bytes)
    }

    /// Persists a VC block under its block hash.
    pub fn put_vc_block(&self, block_hash: &Hash256, block: &VcBlock) -> bool {
        self.put_logged(
            "VC block",
            self.insert(VC_BLOCKS, block_hash.as_bytes(), &block.encode()),
        )
    }

    /// Reads the VC block with the given hash.
    pub fn get_vc_block(&self, block_hash: &Hash256) -> Option<VcBlock> {
        let bytes = self.lookup(VC_BLOCKS, block_hash.as_bytes()).ok()??;
        Self::decode_logged("VC block", &bytes)
    }

    /// Persists a fallback block (with its sharding structure) under the
    /// block hash.
    pub fn put_fallback_block(&self, block_hash: &Hash256, block: &FallbackBlockWShards) -> bool {
        self.put_logged(
            "fallback block",
            self.insert(FALLBACK_BLOCKS, block_hash.as_bytes(), &block.encode()),
        )
    }

    /// Reads the fallback block with the given hash.
    pub fn get_fallback_block(&self, block_hash: &Hash256) -> Option<FallbackBlockWShards> {
        let bytes = self.lookup(FALLBACK_BLOCKS, block_hash.as_bytes()).ok()??;
        Self::decode_logged("fallback block", &bytes)
    }

    /// Persists a transaction body under its transaction hash.
    pub fn put_tx_body(&self, tx_hash: &Hash256, tx: &Transaction) -> bool {
        self.put_logged(
            "tx body",
            self.insert(TX_BODIES, tx_hash.as_bytes(), &tx.encode()),
        )
    }

    /// Reads the transaction body with the given hash.
    pub fn get_tx_body(&self, tx_hash: &Hash256) -> Option<Transaction> {
        let bytes = self.lookup(TX_BODIES, tx_hash.as_bytes()).ok()??;
        Self::decode_logged("tx body", &bytes)
    }

    /// Reads every DS block, ascending by block number. Returns `None`
    /// if the scan fails or any stored value is empty or undecodable.
    pub fn get_all_ds_blocks(&self) -> Option<Vec<DsBlock>> {
        let raw = self.scan(DS_BLOCKS).ok()?;
        raw.iter()
            .map(|bytes| {
                if bytes.is_empty() {
                    None
                } else {
                    Self::decode_logged("DS block", bytes)
                }
            })
            .collect()
    }

    /// Reads every Tx block, ascending by block number. Returns `None`
    /// if the scan fails or any stored value is empty or undecodable.
    pub fn get_all_tx_blocks(&self) -> Option<Vec<TxBlock>> {
        let raw = self.scan(TX_BLOCKS).ok()?;
        raw.iter()
            .map(|bytes| {
                if bytes.is_empty() {
                    None
                } else {
                    Self::decode_logged("tx block", bytes)
                }
            })
            .collect()
    }

    /// Stores a metadata value under its type.
    pub fn put_metadata(&self, ty: MetaType, data: &[u8]) -> bool {
        self.put_logged("metadata", self.insert(METADATA, &meta_key(ty), data))
    }

    /// Reads the metadata value stored under `ty`.
    pub fn get_metadata(&self, ty: MetaType) -> Option<Vec<u8>> {
        self.lookup(METADATA, &meta_key(ty)).ok()?
    }
}
