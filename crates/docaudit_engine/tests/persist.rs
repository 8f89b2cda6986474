use std::collections::BTreeMap;
use std::fs;

use docaudit_engine::{ensure_state_dir, write_atomically, PersistError, SharedStorage, StateFile};
use tempfile::TempDir;

#[test]
fn creates_missing_state_dir() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("state");
    assert!(!dir.exists());
    ensure_state_dir(&dir).unwrap();
    assert!(dir.is_dir());
}

#[test]
fn atomic_write_replaces_existing_file() {
    let temp = TempDir::new().unwrap();

    let first = write_atomically(temp.path(), "chat_history.md", "hello").unwrap();
    assert_eq!(first.file_name().unwrap(), "chat_history.md");
    assert_eq!(fs::read_to_string(&first).unwrap(), "hello");

    let second = write_atomically(temp.path(), "chat_history.md", "world").unwrap();
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(&second).unwrap(), "world");
}

#[test]
fn no_partial_file_when_dir_is_a_file() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("not_a_dir");
    fs::write(&file_path, "x").unwrap();

    let result = write_atomically(&file_path, "chat_history.md", "data");
    assert!(matches!(result, Err(PersistError::StateDir(_))));
    assert!(!file_path.with_file_name("chat_history.md").exists());
}

#[test]
fn state_file_loads_default_when_missing_and_round_trips() {
    let temp = TempDir::new().unwrap();
    let file = StateFile::new(temp.path().join("storage.ron"));

    let empty: BTreeMap<String, String> = file.load().unwrap();
    assert!(empty.is_empty());

    let mut items = BTreeMap::new();
    items.insert("oidc.user:x".to_string(), "{}".to_string());
    file.save(&items).unwrap();
    let loaded: BTreeMap<String, String> = file.load().unwrap();
    assert_eq!(loaded, items);
}

#[test]
fn malformed_state_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("storage.ron");
    fs::write(&path, "{ not ron").unwrap();

    let result: Result<BTreeMap<String, String>, _> = StateFile::new(&path).load();
    assert!(matches!(result, Err(PersistError::Malformed { .. })));
}

#[test]
fn persisted_storage_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("storage.ron");
    {
        let storage = SharedStorage::open(&path).unwrap();
        storage.tab().set_item("greeting", "hi");
    }
    let storage = SharedStorage::open(&path).unwrap();
    assert_eq!(storage.tab().get_item("greeting").as_deref(), Some("hi"));
}
