use cogito::HybridLogStore;
use cogito::thoughts::NO_THOUGHT;
use tempfile::TempDir;

#[tokio::test]
async fn hot_tier_keeps_newest_entries_up_to_limit() {
    let tmp = TempDir::new().unwrap();
    let store = HybridLogStore::new(tmp.path().join("hot"), tmp.path().join("cold"), 3);
    for i in 0..7 {
        store.append("s", &format!("thought {i}")).await.unwrap();
    }

    let entries = store.entries("s").await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].content, "thought 6");
    assert_eq!(entries[2].content, "thought 4");
    assert!(store.read("s", 4).await.unwrap().is_none());
}

#[tokio::test]
async fn cold_tier_is_never_trimmed() {
    let tmp = TempDir::new().unwrap();
    let store = HybridLogStore::new(tmp.path().join("hot"), tmp.path().join("cold"), 1);
    store.append("a", "first").await.unwrap();
    store.append("b", NO_THOUGHT).await.unwrap();
    store.append("a", "third").await.unwrap();

    let day_files: Vec<_> = std::fs::read_dir(tmp.path().join("cold"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert!(!day_files.is_empty());
    let archived: String = day_files
        .iter()
        .map(|path| std::fs::read_to_string(path).unwrap())
        .collect();
    assert!(archived.contains("first"));
    assert!(archived.contains("[Session: b]"));
    assert!(archived.contains("third"));
}

#[tokio::test]
async fn sessions_are_isolated() {
    let tmp = TempDir::new().unwrap();
    let store = HybridLogStore::new(tmp.path().join("hot"), tmp.path().join("cold"), 5);
    store.append("qq:group:1", "one").await.unwrap();
    store.append("qq:group:2", "two").await.unwrap();

    assert_eq!(
        store.read("qq:group:1", 1).await.unwrap().unwrap().content,
        "one"
    );
    assert_eq!(store.entries("qq:group:2").await.unwrap().len(), 1);
}
