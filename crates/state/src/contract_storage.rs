//! The two contract-state backings.
//!
//! Contract storage can live either in a trie owned by each account or
//! in one shared store keyed by `(address, key_hash)`. Both must
//! produce identical storage roots for identical inputs; the shared
//! store guarantees this by folding an address's cells through a
//! scratch trie whenever it recomputes a root.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use mizar_storage::{KvBackend, MemoryKv};
use mizar_types::error::StateError;
use mizar_types::{Address, Hash256};

use crate::trie::AuthTrie;

/// Where contract state lives for every account in a store.
#[derive(Clone)]
pub enum ContractStateBacking {
    /// Each contract account owns a trie over this backend.
    PerAccountTrie(Arc<dyn KvBackend>),
    /// All contract state goes through one shared store.
    Shared(Arc<ContractStateDb>),
}

impl ContractStateBacking {
    /// Builds the backing selected by the process-wide configuration
    /// flag: `true` selects the shared store, `false` per-account tries
    /// over `backend`.
    pub fn from_flag(shared: bool, backend: Arc<dyn KvBackend>) -> Self {
        if shared {
            ContractStateBacking::Shared(Arc::new(ContractStateDb::new()))
        } else {
            ContractStateBacking::PerAccountTrie(backend)
        }
    }
}

/// The shared contract-state store: encoded cells keyed by
/// `(address, key_hash)`.
#[derive(Default)]
pub struct ContractStateDb {
    cells: RwLock<BTreeMap<(Address, Hash256), Vec<u8>>>,
}

impl ContractStateDb {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a batch of cells for `addr` and recomputes the account's
    /// storage root over every cell the store now holds for it.
    pub fn put_contract_state(
        &self,
        addr: &Address,
        entries: &[(Hash256, Vec<u8>)],
    ) -> Result<Hash256, StateError> {
        {
            let mut cells = self
                .cells
                .write()
                .map_err(|e| StateError::Invariant(format!("contract-state lock poisoned: {e}")))?;
            for (key_hash, cell) in entries {
                cells.insert((*addr, *key_hash), cell.clone());
            }
        }
        self.storage_root(addr)
    }

    /// Recomputes the storage root for `addr` by inserting its cells
    /// into a scratch trie; byte-identical to the per-account-trie root
    /// for the same cells.
    pub fn storage_root(&self, addr: &Address) -> Result<Hash256, StateError> {
        let mut scratch = AuthTrie::new(Arc::new(MemoryKv::new()));
        for (key_hash, cell) in self.cells_for(addr)? {
            scratch.insert(key_hash.as_bytes(), &cell);
        }
        Ok(scratch.root())
    }

    /// Reads a single cell.
    pub fn get_cell(&self, addr: &Address, key_hash: &Hash256) -> Option<Vec<u8>> {
        self.cells
            .read()
            .ok()
            .and_then(|cells| cells.get(&(*addr, *key_hash)).cloned())
    }

    /// Every cell stored for `addr`, ordered by key hash.
    pub fn cells_for(&self, addr: &Address) -> Result<Vec<(Hash256, Vec<u8>)>, StateError> {
        let cells = self
            .cells
            .read()
            .map_err(|e| StateError::Invariant(format!("contract-state lock poisoned: {e}")))?;
        Ok(cells
            .range((*addr, Hash256::ZERO)..)
            .take_while(|((a, _), _)| a == addr)
            .map(|((_, k), v)| (*k, v.clone()))
            .collect())
    }

    /// The key hashes stored for `addr`.
    pub fn key_hashes(&self, addr: &Address) -> Vec<Hash256> {
        self.cells_for(addr)
            .map(|cells| cells.into_iter().map(|(k, _)| k).collect())
            .unwrap_or_default()
    }
}
