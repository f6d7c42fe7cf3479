use chrono::Utc;
use file_drop::config::IndexBackend;
use file_drop::storage::models::{FileMetadata, FileRecord, NewFile};
use file_drop::storage::{
    open_backend, FileStore, IndexPersistence, JsonSnapshot, MemoryPersistence, RedbPersistence,
};

fn sample_file(name: &str, size: u64) -> NewFile {
    NewFile {
        original_name: name.to_string(),
        mime_type: "video/mp4".to_string(),
        size,
        metadata: FileMetadata {
            width: Some(1280),
            height: Some(720),
            duration: Some(125.5),
            codec: Some("h264".to_string()),
            ..Default::default()
        },
    }
}

fn sample_record(id: &str) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        original_name: format!("{id}.txt"),
        stored_name: id.to_string(),
        mime_type: "text/plain".to_string(),
        size: 10,
        uploaded_at: Utc::now(),
        metadata: FileMetadata::default(),
        views: 1,
        downloads: 2,
    }
}

// ============================================================================
// JSON snapshot
// ============================================================================

#[test]
fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");
    let snapshot = root.join("metadata.json");

    let (a, b) = {
        let store = FileStore::open(&root, Box::new(JsonSnapshot::new(&snapshot))).unwrap();
        let a = store.create(sample_file("a.mp4", 100)).unwrap();
        let b = store.create(sample_file("b.mp4", 200)).unwrap();
        store.increment_views(&a.id);
        store.increment_downloads(&b.id);
        store.increment_downloads(&b.id);
        (a, b)
    };

    let store = FileStore::open(&root, Box::new(JsonSnapshot::new(&snapshot))).unwrap();
    let a = store.get(&a.id).expect("a should be reloaded");
    let b = store.get(&b.id).expect("b should be reloaded");
    assert_eq!(a.views, 1);
    assert_eq!(b.downloads, 2);
    assert_eq!(b.metadata.codec.as_deref(), Some("h264"));
    assert_eq!(store.stats().total_storage_used, 300);
}

#[tokio::test]
async fn test_snapshot_reflects_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");
    let snapshot = root.join("metadata.json");

    let deleted = {
        let store = FileStore::open(&root, Box::new(JsonSnapshot::new(&snapshot))).unwrap();
        let keep = store.create(sample_file("keep.mp4", 1)).unwrap();
        let drop_me = store.create(sample_file("drop.mp4", 1)).unwrap();
        assert!(store.delete(&drop_me.id).await);
        assert!(store.get(&keep.id).is_some());
        drop_me.id
    };

    let store = FileStore::open(&root, Box::new(JsonSnapshot::new(&snapshot))).unwrap();
    assert!(store.get(&deleted).is_none());
    assert_eq!(store.list().len(), 1);
}

#[test]
fn test_missing_snapshot_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = JsonSnapshot::new(dir.path().join("metadata.json"));
    assert!(snapshot.load().unwrap().is_empty());
}

#[test]
fn test_corrupt_snapshot_is_empty_and_set_aside() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join("metadata.json");
    std::fs::write(&path, b"[{\"id\": \"half-writ").unwrap();

    let store = FileStore::open(&root, Box::new(JsonSnapshot::new(&path))).unwrap();
    assert!(store.list().is_empty());
    assert!(root.join("metadata.json.corrupt").exists());
}

#[test]
fn test_snapshot_leaves_no_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    let snapshot = JsonSnapshot::new(&path);

    snapshot
        .save(&[sample_record("one"), sample_record("two")])
        .unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("metadata.json.tmp").exists());
    let loaded = snapshot.load().unwrap();
    let ids: Vec<&str> = loaded.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(ids, vec!["one", "two"]);
}

#[test]
fn test_snapshot_reads_legacy_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.json");
    std::fs::write(
        &path,
        r#"[
  {
    "id": "8f3a1c2b9d4e5f60718293a4",
    "originalName": "cat.jpg",
    "fileName": "8f3a1c2b9d4e5f60718293a4.jpg",
    "mimeType": "image/jpeg",
    "size": 52311,
    "uploadedAt": "2024-05-01T12:30:00.000Z",
    "metadata": { "width": 1920, "height": 1080, "format": "jpg" },
    "views": 4,
    "downloads": 1
  }
]"#,
    )
    .unwrap();

    let loaded = JsonSnapshot::new(&path).load().unwrap();
    assert_eq!(loaded.len(), 1);
    let file = &loaded[0];
    assert_eq!(file.original_name, "cat.jpg");
    assert_eq!(file.stored_name, "8f3a1c2b9d4e5f60718293a4.jpg");
    assert_eq!(file.metadata.width, Some(1920));
    assert_eq!(file.metadata.format.as_deref(), Some("jpg"));
    assert_eq!(file.views, 4);
}

#[test]
fn test_record_json_uses_camel_case() {
    let value = serde_json::to_value(sample_record("abc")).unwrap();
    assert_eq!(value["originalName"], "abc.txt");
    assert_eq!(value["fileName"], "abc");
    assert_eq!(value["mimeType"], "text/plain");
    assert!(value["uploadedAt"].is_string());
    assert_eq!(value["metadata"], serde_json::json!({}));
}

// ============================================================================
// redb
// ============================================================================

#[test]
fn test_redb_survives_restart_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");
    let db_path = root.join("index.redb");

    let created: Vec<String> = {
        let store =
            FileStore::open(&root, Box::new(RedbPersistence::open(&db_path).unwrap())).unwrap();
        let ids: Vec<String> = (0..4)
            .map(|i| store.create(sample_file(&format!("{i}.mp4"), i)).unwrap().id)
            .collect();
        store.increment_views(&ids[2]);
        ids
    };

    let persistence = RedbPersistence::open(&db_path).unwrap();
    let loaded: Vec<String> = persistence.load().unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(loaded, created);

    let store = FileStore::open(&root, Box::new(persistence)).unwrap();
    assert_eq!(store.get(&created[2]).unwrap().views, 1);
    assert_eq!(store.get(&created[0]).unwrap().metadata.duration, Some(125.5));
}

#[test]
fn test_redb_save_replaces_previous_contents() {
    let dir = tempfile::tempdir().unwrap();
    let persistence = RedbPersistence::open(dir.path().join("index.redb")).unwrap();

    persistence
        .save(&[sample_record("a"), sample_record("b"), sample_record("c")])
        .unwrap();
    persistence.save(&[sample_record("c")]).unwrap();

    let loaded = persistence.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "c");
}

#[test]
fn test_redb_corrupt_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.redb");
    std::fs::write(&path, vec![b'x'; 16 * 1024]).unwrap();

    let persistence = RedbPersistence::open(&path).unwrap();
    assert!(persistence.load().unwrap().is_empty());
    assert!(dir.path().join("index.redb.corrupt").exists());
}

#[test]
fn test_redb_held_database_is_not_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.redb");

    let first = RedbPersistence::open(&path).unwrap();
    first.save(&[sample_record("kept")]).unwrap();

    assert!(RedbPersistence::open(&path).is_err());
    assert!(!dir.path().join("index.redb.corrupt").exists());

    let loaded = first.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, "kept");

    drop(first);
    let reopened = RedbPersistence::open(&path).unwrap();
    assert_eq!(reopened.load().unwrap().len(), 1);
}

// ============================================================================
// Strategy selection
// ============================================================================

#[test]
fn test_memory_forgets_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("uploads");

    {
        let store = FileStore::open(&root, Box::new(MemoryPersistence)).unwrap();
        store.create(sample_file("a.mp4", 1)).unwrap();
    }

    let store = FileStore::open(&root, Box::new(MemoryPersistence)).unwrap();
    assert!(store.list().is_empty());
}

#[test]
fn test_open_backend_selects_strategy() {
    let dir = tempfile::tempdir().unwrap();

    let memory = open_backend(IndexBackend::Memory, dir.path()).unwrap();
    assert_eq!(memory.describe(), "memory");

    let snapshot = open_backend(IndexBackend::Snapshot, dir.path()).unwrap();
    assert_eq!(snapshot.describe(), "snapshot");

    let redb = open_backend(IndexBackend::Redb, dir.path()).unwrap();
    assert_eq!(redb.describe(), "redb");
    assert!(dir.path().join("index.redb").exists());
}
