use std::collections::HashMap;
use std::sync::Arc;

use mizar_crypto::eddsa::Ed25519KeyPair;
use mizar_crypto::hash::{address_from_pubkey, contract_address};
use mizar_storage::{BlockStorage, MemoryKv};
use mizar_types::transaction::{pack_version, Transaction, TransactionReceipt};
use mizar_types::{Address, Hash256};

use super::AccountStore;
use crate::account::Account;
use crate::contract_storage::ContractStateBacking;

fn memory_store() -> AccountStore {
    AccountStore::new(
        MemoryKv::shared(),
        ContractStateBacking::from_flag(false, MemoryKv::shared()),
        None,
    )
}

fn disk_store(dir: &tempfile::TempDir) -> AccountStore {
    let blocks = Arc::new(BlockStorage::open(dir.path().join("blocks.redb")).unwrap());
    AccountStore::new(
        MemoryKv::shared(),
        ContractStateBacking::from_flag(false, MemoryKv::shared()),
        Some(blocks),
    )
}

fn addr(tag: u8) -> Address {
    Address([tag; 20])
}

fn transfer_tx(sender: &Ed25519KeyPair, to: Address, nonce: u64, amount: u128) -> Transaction {
    let mut tx = Transaction {
        version: pack_version(1, 1),
        nonce,
        to_addr: to,
        sender_pubkey: sender.public_key().to_bytes(),
        amount,
        gas_price: 10,
        gas_limit: 1,
        code: vec![],
        data: vec![],
        signature: vec![],
    };
    tx.signature = sender.sign(&tx.core_bytes()).to_bytes();
    tx
}

#[test]
fn fresh_account_add() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(100, 0)).unwrap();

    assert!(store.does_account_exist(&addr(1)));
    assert_eq!(store.get_account(&addr(1)).unwrap().balance(), 100);
    assert_ne!(store.get_state_root(), Hash256::ZERO);
    assert_eq!(store.num_accounts(), 1);
}

#[test]
fn add_account_rejects_duplicates() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(1, 0)).unwrap();
    assert!(store.add_account(addr(1), Account::new(2, 0)).is_err());
    assert_eq!(store.get_balance(&addr(1)).unwrap(), 1);
}

#[test]
fn transfer_success_moves_balance_and_root() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(100, 0)).unwrap();
    store.add_account(addr(2), Account::new(0, 0)).unwrap();
    let root_before = store.get_state_root();

    store.transfer(&addr(1), &addr(2), 30).unwrap();

    assert_eq!(store.get_balance(&addr(1)).unwrap(), 70);
    assert_eq!(store.get_balance(&addr(2)).unwrap(), 30);
    assert_ne!(store.get_state_root(), root_before);
}

#[test]
fn transfer_failure_leaves_everything_unchanged() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(100, 0)).unwrap();
    store.add_account(addr(2), Account::new(0, 0)).unwrap();
    let root_before = store.get_state_root();

    assert!(store.transfer(&addr(1), &addr(2), 200).is_err());

    assert_eq!(store.get_balance(&addr(1)).unwrap(), 100);
    assert_eq!(store.get_balance(&addr(2)).unwrap(), 0);
    assert_eq!(store.get_state_root(), root_before);
}

#[test]
fn transfer_conserves_total_balance() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(75, 0)).unwrap();
    store.add_account(addr(2), Account::new(25, 0)).unwrap();

    store.transfer(&addr(1), &addr(2), 40).unwrap();
    let total = store.get_balance(&addr(1)).unwrap() + store.get_balance(&addr(2)).unwrap();
    assert_eq!(total, 100);
}

#[test]
fn balance_and_nonce_operations_reserialize_into_the_trie() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(10, 0)).unwrap();
    let r0 = store.get_state_root();

    store.increase_balance(&addr(1), 5).unwrap();
    let r1 = store.get_state_root();
    assert_ne!(r0, r1);

    store.decrease_balance(&addr(1), 15).unwrap();
    assert_ne!(store.get_state_root(), r1);

    store.increase_nonce(&addr(1)).unwrap();
    assert_eq!(store.get_nonce(&addr(1)).unwrap(), 1);

    assert!(store.decrease_balance(&addr(1), 1).is_err());
    assert!(store.increase_balance(&addr(9), 1).is_err());
}

#[test]
fn update_accounts_temp_leaves_authoritative_state_alone() {
    let mut store = memory_store();
    let sender = Ed25519KeyPair::generate();
    let sender_addr = address_from_pubkey(&sender.public_key().to_bytes());
    store.add_account(sender_addr, Account::new(100, 0)).unwrap();
    let root_before = store.get_state_root();

    let tx = transfer_tx(&sender, addr(2), 1, 30);
    let mut receipt = TransactionReceipt::default();
    store
        .update_accounts_temp(5, 1, false, &tx, &mut receipt)
        .unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.epoch_num, 5);
    // Authoritative state unchanged until promotion.
    assert_eq!(store.get_balance(&sender_addr).unwrap(), 100);
    assert_eq!(store.get_state_root(), root_before);

    store.commit_temp().unwrap();
    assert_eq!(store.get_balance(&sender_addr).unwrap(), 70);
    assert_eq!(store.get_balance(&addr(2)).unwrap(), 30);
    assert_ne!(store.get_state_root(), root_before);
}

#[test]
fn update_accounts_temp_enforces_nonce_and_balance() {
    let mut store = memory_store();
    let sender = Ed25519KeyPair::generate();
    let sender_addr = address_from_pubkey(&sender.public_key().to_bytes());
    store.add_account(sender_addr, Account::new(10, 0)).unwrap();

    let mut receipt = TransactionReceipt::default();
    let bad_nonce = transfer_tx(&sender, addr(2), 5, 1);
    assert!(store
        .update_accounts_temp(1, 1, false, &bad_nonce, &mut receipt)
        .is_err());

    let too_big = transfer_tx(&sender, addr(2), 1, 11);
    assert!(store
        .update_accounts_temp(1, 1, false, &too_big, &mut receipt)
        .is_err());
}

#[test]
fn contract_creation_through_temp_overlay() {
    let mut store = memory_store();
    let sender = Ed25519KeyPair::generate();
    let sender_addr = address_from_pubkey(&sender.public_key().to_bytes());
    store.add_account(sender_addr, Account::new(50, 0)).unwrap();

    let mut tx = transfer_tx(&sender, Address::default(), 1, 10);
    tx.code = vec![0x11; 8];
    tx.data = br#"[{"vname":"_scilla_version","type":"Uint32","value":"0"}]"#.to_vec();

    let mut receipt = TransactionReceipt::default();
    store
        .update_accounts_temp(7, 1, false, &tx, &mut receipt)
        .unwrap();
    store.commit_temp().unwrap();

    let contract_addr = contract_address(&sender_addr, 0);
    let contract = store.get_account(&contract_addr).unwrap();
    assert!(contract.is_contract());
    assert_eq!(contract.balance(), 10);
    assert_eq!(contract.create_block_num(), 7);
    assert_eq!(store.get_balance(&sender_addr).unwrap(), 40);
    assert_eq!(store.get_nonce(&sender_addr).unwrap(), 1);
}

#[test]
fn discard_restores_root_and_accounts() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(100, 0)).unwrap();
    store.add_account(addr(2), Account::new(0, 0)).unwrap();
    store.move_updates_to_disk().unwrap();
    let r0 = store.get_state_root();

    store.transfer(&addr(1), &addr(2), 30).unwrap();
    let r1 = store.get_state_root();
    assert_ne!(r0, r1);

    store.discard_unsaved_updates().unwrap();
    assert_eq!(store.get_state_root(), r0);
    assert_eq!(store.get_balance(&addr(1)).unwrap(), 100);
    assert_eq!(store.get_balance(&addr(2)).unwrap(), 0);
}

#[test]
fn discard_drops_speculative_overlay() {
    let mut store = memory_store();
    let sender = Ed25519KeyPair::generate();
    let sender_addr = address_from_pubkey(&sender.public_key().to_bytes());
    store.add_account(sender_addr, Account::new(100, 0)).unwrap();
    store.move_updates_to_disk().unwrap();

    let tx = transfer_tx(&sender, addr(2), 1, 30);
    let mut receipt = TransactionReceipt::default();
    store
        .update_accounts_temp(1, 1, false, &tx, &mut receipt)
        .unwrap();

    store.discard_unsaved_updates().unwrap();
    store.commit_temp().unwrap();
    assert_eq!(store.get_balance(&sender_addr).unwrap(), 100);
    assert!(!store.does_account_exist(&addr(2)));
}

#[test]
fn failed_root_persist_is_recoverable() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(100, 0)).unwrap();
    store.add_account(addr(2), Account::new(0, 0)).unwrap();
    store.move_updates_to_disk().unwrap();
    let r0 = store.get_state_root();

    store.transfer(&addr(1), &addr(2), 30).unwrap();

    // Drive the abort path move_updates_to_disk takes when the
    // metadata write fails after the trie flush.
    let prior = store.state.committed_root();
    store.state.commit().unwrap();
    store.abort_root_persist(prior).unwrap();

    assert_eq!(store.get_state_root(), r0);
    assert_eq!(store.get_balance(&addr(1)).unwrap(), 100);
    assert_eq!(store.get_balance(&addr(2)).unwrap(), 0);

    // A subsequent discard still lands on the durable root.
    store.discard_unsaved_updates().unwrap();
    assert_eq!(store.get_state_root(), r0);
}

#[test]
fn retrieve_from_disk_round_trips_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = disk_store(&dir);
    store.add_account(addr(1), Account::new(100, 3)).unwrap();
    store.add_account(addr(2), Account::new(7, 0)).unwrap();
    store.move_updates_to_disk().unwrap();
    let root = store.get_state_root();

    let mut expected = HashMap::new();
    expected.insert(addr(1), Account::new(100, 3));
    expected.insert(addr(2), Account::new(7, 0));

    store.init();
    store.retrieve_from_disk().unwrap();
    assert_eq!(store.get_state_root(), root);
    assert_eq!(store.get_balance(&addr(1)).unwrap(), 100);
    assert_eq!(store.get_nonce(&addr(1)).unwrap(), 3);

    assert!(store.validate_state_from_disk(&expected).unwrap());

    expected.insert(addr(2), Account::new(8, 0));
    assert!(!store.validate_state_from_disk(&expected).unwrap());
}

#[test]
fn determinism_across_backings() {
    let tx_list: Vec<(u8, u8, u128)> = vec![(1, 2, 10), (2, 3, 4), (1, 3, 20)];

    let mut roots = Vec::new();
    for shared in [false, true] {
        let mut store = AccountStore::new(
            MemoryKv::shared(),
            ContractStateBacking::from_flag(shared, MemoryKv::shared()),
            None,
        );
        store.add_account(addr(1), Account::new(100, 0)).unwrap();
        store.add_account(addr(2), Account::new(100, 0)).unwrap();
        store.add_account(addr(3), Account::new(100, 0)).unwrap();
        for (from, to, amount) in &tx_list {
            store.transfer(&addr(*from), &addr(*to), *amount).unwrap();
        }
        roots.push(store.get_state_root());
    }
    assert_eq!(roots[0], roots[1]);
    assert_ne!(roots[0], Hash256::ZERO);
}

#[test]
fn store_serialization_round_trips() {
    let mut store = memory_store();
    store.add_account(addr(1), Account::new(5, 1)).unwrap();
    store.add_account(addr(2), Account::new(9, 2)).unwrap();
    let bytes = store.serialize();
    let root = store.get_state_root();

    let mut restored = memory_store();
    restored.deserialize(&bytes).unwrap();
    assert_eq!(restored.num_accounts(), 2);
    assert_eq!(restored.get_balance(&addr(2)).unwrap(), 9);
    assert_eq!(restored.get_state_root(), root);
}
