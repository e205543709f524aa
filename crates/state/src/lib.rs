#![forbid(unsafe_code)]

//! The account-state engine: an authenticated overlay trie, account
//! records with contract storage, and the account store that ties them
//! to a state root.

pub mod account;
pub mod account_store;
pub mod contract_storage;
pub mod trie;

pub use account::{Account, ACCOUNT_VERSION};
pub use account_store::{AccountStore, SharedAccountStore};
pub use contract_storage::{ContractStateBacking, ContractStateDb};
pub use trie::AuthTrie;
