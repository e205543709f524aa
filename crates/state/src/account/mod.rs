//! Account records: balance, nonce, contract code, and contract storage.

#[cfg(test)]
mod tests;

use log::warn;
use serde_json::{json, Value};

use mizar_crypto::hash::{key_hash, sha256};
use mizar_types::codec::{self, decode_storage_cell, encode_storage_cell, Reader};
use mizar_types::error::StateError;
use mizar_types::{Address, Hash256};

use crate::contract_storage::ContractStateBacking;
use crate::trie::AuthTrie;

/// Current account record version.
pub const ACCOUNT_VERSION: u32 = 1;

/// An account record. Contract accounts additionally carry code, init
/// data, and a storage root; their storage lives behind the configured
/// [`ContractStateBacking`].
#[derive(Clone)]
pub struct Account {
    version: u32,
    balance: u128,
    nonce: u64,
    code: Vec<u8>,
    code_hash: Hash256,
    storage_root: Hash256,
    prev_root: Hash256,
    create_block_num: u64,
    init_data: Vec<u8>,
    init_params: Value,
    scilla_version: u32,
    address: Address,
    storage: Option<AuthTrie>,
}

impl Account {
    /// A fresh non-contract account.
    pub fn new(balance: u128, nonce: u64) -> Self {
        Self {
            version: ACCOUNT_VERSION,
            balance,
            nonce,
            code: Vec::new(),
            code_hash: Hash256::ZERO,
            storage_root: Hash256::ZERO,
            prev_root: Hash256::ZERO,
            create_block_num: 0,
            init_data: Vec::new(),
            init_params: json!([]),
            scilla_version: 0,
            address: Address::default(),
            storage: None,
        }
    }

    /// Whether this account carries contract code.
    pub fn is_contract(&self) -> bool {
        !self.code_hash.is_zero()
    }

    /// The record version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The current balance.
    pub fn balance(&self) -> u128 {
        self.balance
    }

    /// Overwrites the balance; transactional paths should prefer the
    /// checked increase/decrease operations.
    pub fn set_balance(&mut self, balance: u128) {
        self.balance = balance;
    }

    /// The current nonce.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Overwrites the nonce.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    /// The contract code, empty for plain accounts.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// SHA2-256 of the code, zero for plain accounts.
    pub fn code_hash(&self) -> Hash256 {
        self.code_hash
    }

    /// The contract storage root, zero for plain accounts.
    pub fn storage_root(&self) -> Hash256 {
        self.storage_root
    }

    /// The block number the contract was created at.
    pub fn create_block_num(&self) -> u64 {
        self.create_block_num
    }

    /// Records the block number the contract is created at; must be set
    /// before [`Account::init_contract`] so `_creation_block` is right.
    pub fn set_create_block_num(&mut self, block_num: u64) {
        self.create_block_num = block_num;
    }

    /// The Scilla version parsed out of the init data.
    pub fn scilla_version(&self) -> u32 {
        self.scilla_version
    }

    /// The raw init-data blob.
    pub fn init_data(&self) -> &[u8] {
        &self.init_data
    }

    /// The parsed init parameters, augmented with `_creation_block` and
    /// `_this_address`.
    pub fn init_params(&self) -> &Value {
        &self.init_params
    }

    /// Adds `delta` with checked arithmetic; on overflow returns false
    /// and leaves the balance unchanged.
    pub fn increase_balance(&mut self, delta: u128) -> bool {
        match self.balance.checked_add(delta) {
            Some(balance) => {
                self.balance = balance;
                true
            }
            None => false,
        }
    }

    /// Subtracts `delta`; returns false without changing anything if the
    /// balance does not cover it.
    pub fn decrease_balance(&mut self, delta: u128) -> bool {
        if self.balance < delta {
            return false;
        }
        self.balance -= delta;
        true
    }

    /// Applies a signed balance change, dispatching on the sign.
    pub fn change_balance(&mut self, delta: i128) -> bool {
        if delta >= 0 {
            self.increase_balance(delta as u128)
        } else {
            self.decrease_balance(delta.unsigned_abs())
        }
    }

    /// Advances the nonce by one.
    pub fn increase_nonce(&mut self) -> bool {
        self.nonce += 1;
        true
    }

    /// Advances the nonce by `delta`.
    pub fn increase_nonce_by(&mut self, delta: u64) -> bool {
        self.nonce += delta;
        true
    }

    /// Installs contract code: caches it, hashes it, and initializes the
    /// storage handle. Empty code is refused with a warning.
    pub fn set_code(
        &mut self,
        code: Vec<u8>,
        backing: &ContractStateBacking,
    ) -> Result<(), StateError> {
        if code.is_empty() {
            warn!("code for this contract is empty");
            return Ok(());
        }
        self.code_hash = sha256(&code);
        self.code = code;
        self.init_storage(backing)
    }

    fn init_storage(&mut self, backing: &ContractStateBacking) -> Result<(), StateError> {
        let ContractStateBacking::PerAccountTrie(backend) = backing else {
            return Ok(());
        };
        let mut trie = AuthTrie::new(backend.clone());
        if !self.storage_root.is_zero() {
            trie.set_root(self.storage_root)?;
            self.prev_root = self.storage_root;
        }
        self.storage = Some(trie);
        Ok(())
    }

    /// Runs the contract initialization protocol over `init_data`.
    ///
    /// The data must be a JSON array of `{vname, type, value}` records
    /// including a `_scilla_version` of type `Uint32`. Each record is
    /// stored as an immutable storage cell; `_creation_block` and
    /// `_this_address` are appended to the parsed parameter document.
    pub fn init_contract(
        &mut self,
        init_data: &[u8],
        addr: &Address,
        backing: &ContractStateBacking,
    ) -> Result<(), StateError> {
        self.init_data = init_data.to_vec();
        self.init_params = json!([]);
        if init_data.is_empty() {
            warn!("init data for the contract is empty");
            return Err(StateError::MalformedInput("empty init data".into()));
        }

        let parsed: Value = serde_json::from_slice(init_data)
            .map_err(|e| StateError::MalformedInput(format!("unparseable init data: {e}")))?;
        let records = parsed
            .as_array()
            .cloned()
            .ok_or_else(|| StateError::MalformedInput("init data is not an array".into()))?;

        let mut augmented = records.clone();
        augmented.push(json!({
            "vname": "_creation_block",
            "type": "BNum",
            "value": self.create_block_num.to_string(),
        }));
        augmented.push(json!({
            "vname": "_this_address",
            "type": "ByStr20",
            "value": format!("0x{}", addr.hex()),
        }));

        let mut has_scilla_version = false;
        let mut entries: Vec<(Hash256, Vec<u8>)> = Vec::new();

        for record in &records {
            let (Some(vname), Some(ty), Some(value)) = (
                record.get("vname").and_then(Value::as_str),
                record.get("type").and_then(Value::as_str),
                record.get("value"),
            ) else {
                warn!("a variable in the contract initialization is corrupted");
                return Err(StateError::MalformedInput(
                    "init record missing vname/type/value".into(),
                ));
            };

            if !has_scilla_version && vname == "_scilla_version" && ty == "Uint32" {
                let raw = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => String::new(),
                };
                self.scilla_version = raw.parse().map_err(|_| {
                    warn!("_scilla_version is not a number");
                    StateError::MalformedInput("_scilla_version is not a number".into())
                })?;
                has_scilla_version = true;
            }

            let blob = serde_json::to_string(value)
                .map_err(|e| StateError::MalformedInput(e.to_string()))?
                .into_bytes();
            match backing {
                ContractStateBacking::PerAccountTrie(_) => {
                    self.insert_cell(vname, false, ty, &blob)?;
                }
                ContractStateBacking::Shared(_) => {
                    entries.push((key_hash(vname), encode_storage_cell(vname, false, ty, &blob)));
                }
            }
        }

        if !has_scilla_version {
            warn!("no _scilla_version indicated");
            return Err(StateError::MalformedInput(
                "no _scilla_version indicated".into(),
            ));
        }

        if let ContractStateBacking::Shared(db) = backing {
            self.storage_root = db.put_contract_state(addr, &entries)?;
        }

        self.init_params = Value::Array(augmented);
        self.address = *addr;
        Ok(())
    }

    fn insert_cell(
        &mut self,
        vname: &str,
        is_mutable: bool,
        ty: &str,
        value: &[u8],
    ) -> Result<(), StateError> {
        if !self.is_contract() {
            return Err(StateError::NotContract);
        }
        let trie = self.storage.as_mut().ok_or(StateError::NotContract)?;
        trie.insert(
            key_hash(vname).as_bytes(),
            &encode_storage_cell(vname, is_mutable, ty, value),
        );
        let root = trie.root();
        self.storage_root = root;
        Ok(())
    }

    /// Writes one storage cell through whichever backing is configured.
    pub fn set_storage(
        &mut self,
        vname: &str,
        ty: &str,
        value: &str,
        is_mutable: bool,
        backing: &ContractStateBacking,
    ) -> Result<(), StateError> {
        if !self.is_contract() {
            return Err(StateError::NotContract);
        }
        match backing {
            ContractStateBacking::PerAccountTrie(_) => {
                self.insert_cell(vname, is_mutable, ty, value.as_bytes())
            }
            ContractStateBacking::Shared(db) => {
                let cell = encode_storage_cell(vname, is_mutable, ty, value.as_bytes());
                self.storage_root =
                    db.put_contract_state(&self.address, &[(key_hash(vname), cell)])?;
                Ok(())
            }
        }
    }

    /// Restores a raw cell under a precomputed key hash; used when
    /// rebuilding a contract account from its serialization.
    pub fn set_raw_storage(
        &mut self,
        k_hash: &Hash256,
        cell: Vec<u8>,
        backing: &ContractStateBacking,
    ) -> Result<(), StateError> {
        if !self.is_contract() {
            warn!("not a contract account, refusing raw storage write");
            return Err(StateError::NotContract);
        }
        match backing {
            ContractStateBacking::PerAccountTrie(_) => {
                let trie = self.storage.as_mut().ok_or(StateError::NotContract)?;
                trie.insert(k_hash.as_bytes(), &cell);
                let root = trie.root();
                self.storage_root = root;
                Ok(())
            }
            ContractStateBacking::Shared(db) => {
                self.storage_root = db.put_contract_state(&self.address, &[(*k_hash, cell)])?;
                Ok(())
            }
        }
    }

    /// Reads a raw cell. Plain accounts yield `None`.
    pub fn get_raw_storage(
        &self,
        k_hash: &Hash256,
        backing: &ContractStateBacking,
    ) -> Option<Vec<u8>> {
        if !self.is_contract() {
            return None;
        }
        match backing {
            ContractStateBacking::PerAccountTrie(_) => {
                self.storage.as_ref()?.at(k_hash.as_bytes())
            }
            ContractStateBacking::Shared(db) => db.get_cell(&self.address, k_hash),
        }
    }

    /// The key hashes of every stored cell.
    pub fn storage_key_hashes(&self, backing: &ContractStateBacking) -> Vec<Hash256> {
        match backing {
            ContractStateBacking::PerAccountTrie(_) => self
                .storage
                .as_ref()
                .map(|trie| {
                    trie.iter()
                        .filter_map(|(key, _)| Hash256::from_slice(&key).ok())
                        .collect()
                })
                .unwrap_or_default(),
            ContractStateBacking::Shared(db) => db.key_hashes(&self.address),
        }
    }

    /// Emits the mutable storage cells as structured records, plus a
    /// synthesized `_balance` entry. Plain accounts yield an empty
    /// array.
    pub fn get_storage_json(&self, backing: &ContractStateBacking) -> Value {
        if !self.is_contract() {
            warn!("not a contract account, no storage to render");
            return json!([]);
        }

        let cells: Vec<Vec<u8>> = match backing {
            ContractStateBacking::PerAccountTrie(_) => self
                .storage
                .as_ref()
                .map(|trie| trie.iter().map(|(_, cell)| cell).collect())
                .unwrap_or_default(),
            ContractStateBacking::Shared(db) => db
                .cells_for(&self.address)
                .map(|cells| cells.into_iter().map(|(_, cell)| cell).collect())
                .unwrap_or_default(),
        };

        let mut out = Vec::new();
        for bytes in cells {
            let cell = match decode_storage_cell(&bytes) {
                Ok(cell) => cell,
                Err(e) => {
                    warn!("undecodable storage cell skipped: {e}");
                    continue;
                }
            };
            if !cell.is_mutable {
                continue;
            }
            let text = String::from_utf8_lossy(&cell.value).to_string();
            let value = if text.starts_with('[') || text.starts_with('{') {
                match serde_json::from_str::<Value>(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("storage value failed to re-parse as a document: {e}");
                        continue;
                    }
                }
            } else {
                Value::String(text)
            };
            out.push(json!({
                "vname": cell.vname,
                "type": cell.ty,
                "value": value,
            }));
        }

        out.push(json!({
            "vname": "_balance",
            "type": "Uint128",
            "value": self.balance.to_string(),
        }));
        Value::Array(out)
    }

    /// Snapshots the storage root for a later rollback.
    pub fn commit(&mut self) {
        self.prev_root = self.storage_root;
    }

    /// Flushes the storage trie to its backend and snapshots the root.
    pub fn commit_storage(&mut self) -> Result<(), StateError> {
        if let Some(trie) = self.storage.as_mut() {
            trie.commit()?;
        }
        self.prev_root = self.storage_root;
        Ok(())
    }

    /// Restores the storage root to the last snapshot. On a plain
    /// account this is a warned no-op.
    pub fn rollback(&mut self) -> Result<(), StateError> {
        if !self.is_contract() {
            warn!("not a contract, nothing to roll back");
            return Ok(());
        }
        self.storage_root = self.prev_root;
        let root = self.storage_root;
        if let Some(trie) = self.storage.as_mut() {
            if root.is_zero() {
                trie.init();
            } else {
                trie.set_root(root)?;
            }
        }
        Ok(())
    }

    /// The canonical serialization stored in the state trie. Field
    /// order and widths are fixed; two serializations are byte-equal
    /// iff the accounts are semantically equal.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        codec::put_u32(&mut out, self.version);
        codec::put_u128(&mut out, self.balance);
        codec::put_u64(&mut out, self.nonce);
        codec::put_hash(&mut out, &self.storage_root);
        codec::put_hash(&mut out, &self.code_hash);
        codec::put_u64(&mut out, self.create_block_num);
        codec::put_u32(&mut out, self.scilla_version);
        codec::put_var_bytes(&mut out, &self.code);
        codec::put_var_bytes(&mut out, &self.init_data);
        out
    }

    /// Rebuilds an account from its canonical serialization, re-running
    /// contract initialization and checking that the declared code hash
    /// and storage root are reproduced.
    pub fn deserialize(
        bytes: &[u8],
        addr: &Address,
        backing: &ContractStateBacking,
    ) -> Result<Self, StateError> {
        let mut r = Reader::new(bytes);
        let version = r.u32()?;
        let balance = r.u128()?;
        let nonce = r.u64()?;
        let declared_root = r.hash()?;
        let declared_code_hash = r.hash()?;
        let create_block_num = r.u64()?;
        let scilla_version = r.u32()?;
        let code = r.var_bytes()?;
        let init_data = r.var_bytes()?;
        r.finish()?;

        let mut account = Account::new(balance, nonce);
        account.version = version;
        account.address = *addr;

        if code.is_empty() {
            if !declared_code_hash.is_zero() || !declared_root.is_zero() {
                return Err(StateError::MalformedInput(
                    "plain account with non-zero code hash or storage root".into(),
                ));
            }
            return Ok(account);
        }

        account.create_block_num = create_block_num;
        account.set_code(code, backing)?;
        if account.code_hash != declared_code_hash {
            warn!(
                "code hash mismatch: expected {}, got {}",
                account.code_hash, declared_code_hash
            );
            return Err(StateError::MalformedInput("code hash mismatch".into()));
        }

        if !init_data.is_empty() {
            account.init_contract(&init_data, addr, backing)?;
        }
        if account.scilla_version != scilla_version {
            return Err(StateError::MalformedInput(
                "scilla version does not match init data".into(),
            ));
        }

        if account.storage_root != declared_root {
            // Mutable cells are not part of the serialization; adopt the
            // declared root from the persisted trie when it is known.
            match backing {
                ContractStateBacking::PerAccountTrie(_) => {
                    let trie = account.storage.as_mut().ok_or(StateError::NotContract)?;
                    trie.set_root(declared_root).map_err(|_| {
                        StateError::MalformedInput(format!(
                            "storage root mismatch: expected {}, got {}",
                            declared_root, account.storage_root
                        ))
                    })?;
                    account.storage_root = declared_root;
                    account.prev_root = declared_root;
                }
                ContractStateBacking::Shared(_) => {
                    return Err(StateError::MalformedInput(format!(
                        "storage root mismatch: expected {}, got {}",
                        declared_root, account.storage_root
                    )));
                }
            }
        }

        Ok(account)
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.serialize() == other.serialize()
    }
}

impl Eq for Account {}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("version", &self.version)
            .field("balance", &self.balance)
            .field("nonce", &self.nonce)
            .field("code_len", &self.code.len())
            .field("code_hash", &self.code_hash)
            .field("storage_root", &self.storage_root)
            .field("create_block_num", &self.create_block_num)
            .field("scilla_version", &self.scilla_version)
            .finish()
    }
}
