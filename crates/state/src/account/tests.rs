use mizar_crypto::hash::key_hash;
use mizar_storage::MemoryKv;
use mizar_types::{Address, Hash256};
use serde_json::Value;

use super::{Account, ACCOUNT_VERSION};
use crate::contract_storage::ContractStateBacking;

fn trie_backing() -> ContractStateBacking {
    ContractStateBacking::from_flag(false, MemoryKv::shared())
}

fn shared_backing() -> ContractStateBacking {
    ContractStateBacking::from_flag(true, MemoryKv::shared())
}

const SCILLA_ONLY: &[u8] =
    br#"[{"vname":"_scilla_version","type":"Uint32","value":"0"}]"#;

fn contract_at(addr: Address, backing: &ContractStateBacking) -> Account {
    let mut account = Account::new(0, 0);
    account.set_create_block_num(7);
    account.set_code(vec![0x55; 16], backing).unwrap();
    account.init_contract(SCILLA_ONLY, &addr, backing).unwrap();
    account
}

#[test]
fn fresh_account_is_plain() {
    let account = Account::new(100, 0);
    assert!(!account.is_contract());
    assert_eq!(account.version(), ACCOUNT_VERSION);
    assert_eq!(account.balance(), 100);
    assert_eq!(account.code_hash(), Hash256::ZERO);
    assert_eq!(account.storage_root(), Hash256::ZERO);
}

#[test]
fn balance_arithmetic_is_checked() {
    let mut account = Account::new(100, 0);

    assert!(account.increase_balance(50));
    assert_eq!(account.balance(), 150);

    assert!(!account.increase_balance(u128::MAX));
    assert_eq!(account.balance(), 150);

    assert!(!account.decrease_balance(151));
    assert_eq!(account.balance(), 150);

    assert!(account.decrease_balance(150));
    assert_eq!(account.balance(), 0);

    assert!(account.change_balance(30));
    assert!(account.change_balance(-10));
    assert_eq!(account.balance(), 20);
    assert!(!account.change_balance(-21));
}

#[test]
fn nonce_is_monotonic() {
    let mut account = Account::new(0, 0);
    account.increase_nonce();
    account.increase_nonce_by(3);
    assert_eq!(account.nonce(), 4);
}

#[test]
fn set_code_refuses_empty_code() {
    let backing = trie_backing();
    let mut account = Account::new(0, 0);
    account.set_code(Vec::new(), &backing).unwrap();
    assert!(!account.is_contract());
}

#[test]
fn init_contract_rejects_malformed_documents() {
    let backing = trie_backing();
    let addr = Address([1u8; 20]);

    let cases: [&[u8]; 6] = [
        b"",
        br#"[{"vname"]"#,
        br#"[{"vname":"name"}]"#,
        br#"{"vname":"x","type":"t","value":"v"}"#,
        br#"[{"vname":"name","type":"sometype","value":"somevalue"}]"#,
        br#"[{"vname":"_scilla_version","type":"Uint32","value":"abc"}]"#,
    ];
    for bad in cases {
        let mut account = Account::new(0, 0);
        account.set_code(vec![1], &backing).unwrap();
        assert!(
            account.init_contract(bad, &addr, &backing).is_err(),
            "accepted: {}",
            String::from_utf8_lossy(bad)
        );
    }
}

#[test]
fn init_contract_appends_synthesized_params() {
    let backing = trie_backing();
    let mut addr = Address([0u8; 20]);
    addr.0[19] = 1;
    let account = contract_at(addr, &backing);

    assert_eq!(account.scilla_version(), 0);
    assert!(!account.storage_root().is_zero());

    let params = account.init_params().as_array().unwrap();
    let find = |vname: &str| -> &Value {
        params
            .iter()
            .find(|p| p["vname"] == vname)
            .unwrap_or_else(|| panic!("missing {vname}"))
    };
    assert_eq!(find("_scilla_version")["value"], "0");
    assert_eq!(find("_creation_block")["value"], "7");
    assert_eq!(find("_creation_block")["type"], "BNum");
    assert_eq!(
        find("_this_address")["value"],
        format!("0x{}", addr.hex())
    );
}

#[test]
fn storage_json_emits_only_mutable_cells_plus_balance() {
    let backing = trie_backing();
    let addr = Address([2u8; 20]);
    let mut account = contract_at(addr, &backing);
    account.set_balance(42);

    // Only immutable init cells so far: expect just _balance.
    let json = account.get_storage_json(&backing);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["vname"], "_balance");
    assert_eq!(entries[0]["type"], "Uint128");
    assert_eq!(entries[0]["value"], "42");

    account
        .set_storage("counter", "Uint32", "\"5\"", true, &backing)
        .unwrap();
    account
        .set_storage("listing", "List", "[1,2]", true, &backing)
        .unwrap();

    let json = account.get_storage_json(&backing);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 3);

    let counter = entries.iter().find(|e| e["vname"] == "counter").unwrap();
    assert_eq!(counter["value"], "\"5\"");
    // Values that look like documents are re-parsed.
    let listing = entries.iter().find(|e| e["vname"] == "listing").unwrap();
    assert_eq!(listing["value"], serde_json::json!([1, 2]));
}

#[test]
fn storage_json_for_plain_account_is_empty() {
    let backing = trie_backing();
    let account = Account::new(9, 0);
    assert_eq!(account.get_storage_json(&backing), serde_json::json!([]));
}

#[test]
fn raw_storage_reads_back_cells() {
    let backing = trie_backing();
    let addr = Address([3u8; 20]);
    let account = contract_at(addr, &backing);

    let cell = account
        .get_raw_storage(&key_hash("_scilla_version"), &backing)
        .unwrap();
    let decoded = mizar_types::codec::decode_storage_cell(&cell).unwrap();
    assert_eq!(decoded.vname, "_scilla_version");
    assert!(!decoded.is_mutable);

    assert!(account
        .get_raw_storage(&key_hash("unknown"), &backing)
        .is_none());
    assert_eq!(account.storage_key_hashes(&backing).len(), 1);
}

#[test]
fn rollback_restores_previous_root() {
    let backing = trie_backing();
    let addr = Address([4u8; 20]);
    let mut account = contract_at(addr, &backing);

    account.commit();
    let committed_root = account.storage_root();

    account
        .set_storage("counter", "Uint32", "\"1\"", true, &backing)
        .unwrap();
    assert_ne!(account.storage_root(), committed_root);

    account.rollback().unwrap();
    assert_eq!(account.storage_root(), committed_root);
}

#[test]
fn rollback_on_plain_account_is_a_noop() {
    let mut account = Account::new(1, 1);
    account.rollback().unwrap();
    assert_eq!(account.balance(), 1);
}

#[test]
fn serialization_round_trips_plain_accounts() {
    let backing = trie_backing();
    let account = Account::new(12345, 42);
    let bytes = account.serialize();
    let restored = Account::deserialize(&bytes, &Address([5u8; 20]), &backing).unwrap();
    assert_eq!(account, restored);
    assert_eq!(bytes, restored.serialize());
}

#[test]
fn serialization_round_trips_contract_accounts() {
    let backing = trie_backing();
    let addr = Address([6u8; 20]);
    let mut account = contract_at(addr, &backing);
    account.set_balance(999);

    let bytes = account.serialize();
    let restored = Account::deserialize(&bytes, &addr, &backing).unwrap();
    assert_eq!(account, restored);
    assert_eq!(restored.scilla_version(), 0);
    assert_eq!(restored.storage_root(), account.storage_root());
}

#[test]
fn deserialize_rejects_tampered_code_hash() {
    let backing = trie_backing();
    let addr = Address([7u8; 20]);
    let account = contract_at(addr, &backing);

    let mut bytes = account.serialize();
    // The code hash sits after version/balance/nonce/storage_root.
    let code_hash_offset = 4 + 16 + 8 + 32;
    bytes[code_hash_offset] ^= 0xff;
    assert!(Account::deserialize(&bytes, &addr, &backing).is_err());
}

#[test]
fn code_hash_tracks_code_emptiness() {
    let backing = trie_backing();
    let mut account = Account::new(0, 0);
    assert!(account.code().is_empty() && account.code_hash().is_zero());
    account.set_code(vec![1, 2, 3], &backing).unwrap();
    assert!(!account.code().is_empty() && !account.code_hash().is_zero());
}

#[test]
fn both_backings_agree_on_storage_roots() {
    let trie = trie_backing();
    let shared = shared_backing();
    let addr = Address([8u8; 20]);

    let mut a = contract_at(addr, &trie);
    let mut b = contract_at(addr, &shared);
    assert_eq!(a.storage_root(), b.storage_root());

    a.set_storage("counter", "Uint32", "\"5\"", true, &trie).unwrap();
    b.set_storage("counter", "Uint32", "\"5\"", true, &shared)
        .unwrap();
    assert_eq!(a.storage_root(), b.storage_root());

    a.set_storage("owner", "ByStr20", "\"0xff\"", true, &trie)
        .unwrap();
    b.set_storage("owner", "ByStr20", "\"0xff\"", true, &shared)
        .unwrap();
    assert_eq!(a.storage_root(), b.storage_root());
    assert!(!a.storage_root().is_zero());
}
