//! The account store: the authoritative address → account map, its
//! authenticated state trie, and the speculative overlay used while a
//! block's transactions are applied.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{error, warn};

use mizar_crypto::hash::contract_address;
use mizar_storage::{BlockStorage, KvBackend, MetaType};
use mizar_types::codec::{self, Reader};
use mizar_types::error::StateError;
use mizar_types::transaction::{Transaction, TransactionReceipt};
use mizar_types::{Address, Hash256};

use crate::account::Account;
use crate::contract_storage::ContractStateBacking;
use crate::trie::AuthTrie;

/// Gas charged for a plain value transfer.
const NORMAL_TRAN_GAS: u64 = 21;

/// The account store. One instance is authoritative per process; the
/// uniqueness is a construction discipline, enforced by whoever wires
/// the node together, not by a global.
pub struct AccountStore {
    accounts: HashMap<Address, Account>,
    state: AuthTrie,
    prev_root: Hash256,
    temp: Option<HashMap<Address, Account>>,
    backing: ContractStateBacking,
    metadata: Option<Arc<BlockStorage>>,
}

impl AccountStore {
    /// Builds a store over `state_backend` with the given contract
    /// backing. `metadata` is where `move_updates_to_disk` persists the
    /// state root; stores built without it keep roots in memory only.
    pub fn new(
        state_backend: Arc<dyn KvBackend>,
        backing: ContractStateBacking,
        metadata: Option<Arc<BlockStorage>>,
    ) -> Self {
        Self {
            accounts: HashMap::new(),
            state: AuthTrie::new(state_backend),
            prev_root: Hash256::ZERO,
            temp: None,
            backing,
            metadata,
        }
    }

    /// Clears the in-memory accounts and resets the state trie to the
    /// empty root.
    pub fn init(&mut self) {
        self.accounts.clear();
        self.state.init();
        self.prev_root = Hash256::ZERO;
        self.temp = None;
    }

    /// The contract-state backing this store was configured with.
    pub fn backing(&self) -> &ContractStateBacking {
        &self.backing
    }

    fn update_state_trie(&mut self, address: &Address) -> Result<(), StateError> {
        let account = self
            .accounts
            .get(address)
            .ok_or(StateError::AccountNotFound(*address))?;
        self.state.insert(address.as_bytes(), &account.serialize());
        Ok(())
    }

    /// Registers a new account. Fails if the address is taken.
    pub fn add_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
        if self.accounts.contains_key(&address) {
            return Err(StateError::AccountExists(address));
        }
        self.accounts.insert(address, account);
        self.update_state_trie(&address)
    }

    /// Looks up an account.
    pub fn get_account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    /// Whether an account exists under `address`.
    pub fn does_account_exist(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Number of registered accounts.
    pub fn num_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// The balance of `address`.
    pub fn get_balance(&self, address: &Address) -> Result<u128, StateError> {
        self.accounts
            .get(address)
            .map(Account::balance)
            .ok_or(StateError::AccountNotFound(*address))
    }

    /// The nonce of `address`.
    pub fn get_nonce(&self, address: &Address) -> Result<u64, StateError> {
        self.accounts
            .get(address)
            .map(Account::nonce)
            .ok_or(StateError::AccountNotFound(*address))
    }

    /// Credits `delta` to `address`.
    pub fn increase_balance(&mut self, address: &Address, delta: u128) -> Result<(), StateError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound(*address))?;
        if !account.increase_balance(delta) {
            return Err(StateError::ArithmeticOverflow);
        }
        self.update_state_trie(address)
    }

    /// Debits `delta` from `address`; the balance must cover it.
    pub fn decrease_balance(&mut self, address: &Address, delta: u128) -> Result<(), StateError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound(*address))?;
        if !account.decrease_balance(delta) {
            return Err(StateError::InsufficientBalance);
        }
        self.update_state_trie(address)
    }

    /// Moves `delta` from `from` to `to`, atomically over both
    /// accounts: on any failure neither balance changes and the state
    /// root is untouched.
    pub fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        delta: u128,
    ) -> Result<(), StateError> {
        let from_balance = self.get_balance(from)?;
        let to_balance = self.get_balance(to)?;
        if from_balance < delta {
            return Err(StateError::InsufficientBalance);
        }
        if from == to {
            return Ok(());
        }
        let new_to = to_balance
            .checked_add(delta)
            .ok_or(StateError::ArithmeticOverflow)?;

        if let Some(account) = self.accounts.get_mut(from) {
            account.set_balance(from_balance - delta);
        }
        if let Some(account) = self.accounts.get_mut(to) {
            account.set_balance(new_to);
        }
        self.update_state_trie(from)?;
        self.update_state_trie(to)
    }

    /// Advances the nonce of `address` by one.
    pub fn increase_nonce(&mut self, address: &Address) -> Result<(), StateError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(StateError::AccountNotFound(*address))?;
        account.increase_nonce();
        self.update_state_trie(address)
    }

    /// The current state root.
    pub fn get_state_root(&self) -> Hash256 {
        self.state.root()
    }

    fn temp_read(&self, address: &Address) -> Option<Account> {
        if let Some(temp) = &self.temp {
            if let Some(account) = temp.get(address) {
                return Some(account.clone());
            }
        }
        self.accounts.get(address).cloned()
    }

    /// Applies `tx` to the speculative overlay. The authoritative map
    /// and trie are untouched until [`AccountStore::commit_temp`].
    ///
    /// `is_ds` marks application on a DS node; shard-placement checks
    /// belong to the validator and are not repeated here.
    pub fn update_accounts_temp(
        &mut self,
        epoch: u64,
        _num_shards: u32,
        _is_ds: bool,
        tx: &Transaction,
        receipt: &mut TransactionReceipt,
    ) -> Result<(), StateError> {
        let sender_addr = mizar_crypto::hash::address_from_pubkey(&tx.sender_pubkey);
        let mut sender = self
            .temp_read(&sender_addr)
            .ok_or(StateError::AccountNotFound(sender_addr))?;

        if tx.nonce != sender.nonce() + 1 {
            return Err(StateError::NonceMismatch {
                expected: sender.nonce() + 1,
                got: tx.nonce,
            });
        }
        if sender.balance() < tx.amount {
            return Err(StateError::InsufficientBalance);
        }

        if tx.is_contract_creation() {
            let contract_addr = contract_address(&sender_addr, sender.nonce());
            if self.temp_read(&contract_addr).is_some() {
                return Err(StateError::AccountExists(contract_addr));
            }
            let mut contract = Account::new(0, 0);
            contract.set_create_block_num(epoch);
            contract.set_code(tx.code.clone(), &self.backing)?;
            contract.init_contract(&tx.data, &contract_addr, &self.backing)?;
            if !contract.increase_balance(tx.amount) {
                return Err(StateError::ArithmeticOverflow);
            }
            sender.set_balance(sender.balance() - tx.amount);
            sender.increase_nonce();

            let temp = self.temp.get_or_insert_with(HashMap::new);
            temp.insert(contract_addr, contract);
            temp.insert(sender_addr, sender);
        } else if tx.to_addr == sender_addr {
            // A self-payment moves nothing but still consumes the nonce.
            sender.increase_nonce();
            let temp = self.temp.get_or_insert_with(HashMap::new);
            temp.insert(sender_addr, sender);
        } else {
            let mut recipient = self
                .temp_read(&tx.to_addr)
                .unwrap_or_else(|| Account::new(0, 0));
            if !recipient.increase_balance(tx.amount) {
                return Err(StateError::ArithmeticOverflow);
            }
            sender.set_balance(sender.balance() - tx.amount);
            sender.increase_nonce();

            let temp = self.temp.get_or_insert_with(HashMap::new);
            temp.insert(tx.to_addr, recipient);
            temp.insert(sender_addr, sender);
        }

        receipt.set_epoch_num(epoch);
        receipt.set_result(true, NORMAL_TRAN_GAS);
        Ok(())
    }

    /// Promotes the speculative overlay into the authoritative map and
    /// state trie, then drops it.
    pub fn commit_temp(&mut self) -> Result<(), StateError> {
        let Some(temp) = self.temp.take() else {
            return Ok(());
        };
        for (address, account) in temp {
            self.accounts.insert(address, account);
            self.update_state_trie(&address)?;
        }
        Ok(())
    }

    /// Commits the state trie and every contract-storage trie, then
    /// persists the state root as metadata. On any failure the
    /// persisted root keeps its previous value and the store is rolled
    /// back to the last durable state.
    pub fn move_updates_to_disk(&mut self) -> Result<(), StateError> {
        self.commit_temp()?;
        let prior_root = self.state.committed_root();
        for account in self.accounts.values_mut() {
            if account.is_contract() {
                account.commit_storage()?;
            }
        }
        self.state.commit()?;
        if let Err(e) = self.move_root_to_disk() {
            // The prior root's nodes are still in the backend; fall
            // back to it.
            self.abort_root_persist(prior_root)?;
            return Err(e);
        }
        self.prev_root = self.state.root();
        Ok(())
    }

    fn abort_root_persist(&mut self, prior_root: Hash256) -> Result<(), StateError> {
        self.state.set_root(prior_root)?;
        self.rebuild_accounts()
    }

    fn move_root_to_disk(&self) -> Result<(), StateError> {
        let Some(metadata) = &self.metadata else {
            return Ok(());
        };
        let root = self.state.root();
        if !metadata.put_metadata(MetaType::LatestStateRoot, root.as_bytes()) {
            error!("failed to persist state root {root}");
            return Err(StateError::Storage(
                mizar_types::error::StorageError::Backend("state root persist failed".into()),
            ));
        }
        Ok(())
    }

    /// Drops the speculative overlay and rolls every dirty trie back to
    /// its previous committed root. Afterwards the store reads exactly
    /// as it did at the last commit.
    pub fn discard_unsaved_updates(&mut self) -> Result<(), StateError> {
        self.temp = None;
        self.state.discard()?;
        self.rebuild_accounts()
    }

    fn rebuild_accounts(&mut self) -> Result<(), StateError> {
        let entries: Vec<(Vec<u8>, Vec<u8>)> = self.state.iter().collect();
        self.accounts.clear();
        for (key, value) in entries {
            let address = Address::from_slice(&key)?;
            let account = Account::deserialize(&value, &address, &self.backing)?;
            self.accounts.insert(address, account);
        }
        Ok(())
    }

    /// Rebuilds the address → account map from the state trie at the
    /// root persisted in metadata.
    pub fn retrieve_from_disk(&mut self) -> Result<(), StateError> {
        let metadata = self.metadata.as_ref().ok_or_else(|| {
            StateError::Invariant("retrieve_from_disk needs a metadata store".into())
        })?;
        let root_bytes = metadata
            .get_metadata(MetaType::LatestStateRoot)
            .ok_or(StateError::Storage(
                mizar_types::error::StorageError::NotFound,
            ))?;
        let root = Hash256::from_slice(&root_bytes)?;
        self.state.set_root(root)?;
        self.prev_root = root;
        self.rebuild_accounts()
    }

    /// Compares the map reconstructed from disk against `expected`,
    /// pairwise, by canonical byte equality of the serializations.
    pub fn validate_state_from_disk(
        &mut self,
        expected: &HashMap<Address, Account>,
    ) -> Result<bool, StateError> {
        self.retrieve_from_disk()?;
        if self.accounts.len() != expected.len() {
            warn!(
                "account count mismatch: disk has {}, expected {}",
                self.accounts.len(),
                expected.len()
            );
            return Ok(false);
        }
        for (address, account) in expected {
            match self.accounts.get(address) {
                Some(restored) if restored.serialize() == account.serialize() => {}
                _ => {
                    warn!("account {address} does not match its persisted form");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Serializes the whole store as a count-prefixed list of
    /// `(address, account)` pairs.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::put_u64(&mut out, self.accounts.len() as u64);
        let mut addresses: Vec<_> = self.accounts.keys().collect();
        addresses.sort();
        for address in addresses {
            out.extend_from_slice(address.as_bytes());
            if let Some(account) = self.accounts.get(address) {
                codec::put_var_bytes(&mut out, &account.serialize());
            }
        }
        out
    }

    /// Rebuilds the store contents from [`AccountStore::serialize`]
    /// output, replacing the current map and trie.
    pub fn deserialize(&mut self, bytes: &[u8]) -> Result<(), StateError> {
        let mut r = Reader::new(bytes);
        let count = r.u64()?;
        self.accounts.clear();
        self.state.init();
        for _ in 0..count {
            let address = Address::from_slice(&r.fixed(mizar_types::ACC_ADDR_SIZE)?)?;
            let account_bytes = r.var_bytes()?;
            let account = Account::deserialize(&account_bytes, &address, &self.backing)?;
            self.accounts.insert(address, account);
            self.update_state_trie(&address)?;
        }
        r.finish()?;
        Ok(())
    }
}

/// The process-wide handle to the account store: one writer, many
/// readers, guarded by a single lock as the scheduling model requires.
#[derive(Clone)]
pub struct SharedAccountStore {
    inner: Arc<RwLock<AccountStore>>,
}

impl SharedAccountStore {
    /// Wraps a store for shared use.
    pub fn new(store: AccountStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Acquires the shared read lock.
    pub fn read(&self) -> RwLockReadGuard<'_, AccountStore> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquires the exclusive write lock.
    pub fn write(&self) -> RwLockWriteGuard<'_, AccountStore> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
