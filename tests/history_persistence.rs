use pattern_sense::history::{HistoryItem, HistoryStore, HISTORY_KEY, MAX_HISTORY_ITEMS};
use pattern_sense::storage::{FileStore, KeyValueStore};
use pattern_sense::{ScriptParams, ScriptType};

fn script(n: usize) -> HistoryItem {
    let mut params = ScriptParams::new(ScriptType::Short);
    params.title = format!("Episode {n}");
    params.research_material = format!("notes for episode {n}");
    HistoryItem::new(params, format!("script {n}"))
}

#[test]
fn history_survives_a_restart() {
    let dir = tempfile::tempdir().expect("temp dir");

    let mut store = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    let first = script(1);
    let second = script(2);
    store.insert(first.clone()).expect("insert");
    store.insert(second.clone()).expect("insert");
    drop(store);

    let reopened = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    assert_eq!(reopened.items(), &[second, first]);
    assert!(dir.path().join(format!("{HISTORY_KEY}.json")).exists());
}

#[test]
fn fifty_first_insert_evicts_the_oldest_on_disk() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut store = HistoryStore::load(FileStore::new(dir.path()).expect("store"));

    let items: Vec<_> = (1..=MAX_HISTORY_ITEMS + 1).map(script).collect();
    for item in &items {
        store.insert(item.clone()).expect("insert");
    }

    let reopened = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    assert_eq!(reopened.len(), MAX_HISTORY_ITEMS);
    assert_eq!(reopened.items()[0].content, format!("script {}", MAX_HISTORY_ITEMS + 1));
    assert_eq!(reopened.items()[MAX_HISTORY_ITEMS - 1].content, "script 2");
    assert!(reopened.get(&items[0].id).is_none());
}

#[test]
fn deleting_an_unknown_id_leaves_the_file_untouched() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut store = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    store.insert(script(1)).expect("insert");

    let before = store.storage().get(HISTORY_KEY).expect("read");
    assert!(!store.remove("not-an-id").expect("remove"));
    assert_eq!(store.storage().get(HISTORY_KEY).expect("read"), before);
    assert_eq!(store.len(), 1);
}

#[test]
fn corrupt_file_starts_empty_and_is_replaced_on_next_insert() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join(format!("{HISTORY_KEY}.json")), "[{broken").expect("seed");

    let mut store = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    assert!(store.is_empty());

    store.insert(script(1)).expect("insert");
    let reopened = HistoryStore::load(FileStore::new(dir.path()).expect("store"));
    assert_eq!(reopened.len(), 1);
}
