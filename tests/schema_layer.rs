//! End-to-end tests for the schema layer
//!
//! Exercises registry, fields and indexes together over both engines,
//! including restarts and interrupted commits.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kv_shed::{
    Batch, Db, Error, FieldKind, IterateOptions, LogStore, MemoryStore, Store, StoreError,
    StoreResult, U64JsonIndex,
};
use rand::distributions::Alphanumeric;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PeerMetadata {
    addr: String,
}

fn open_log(path: &Path) -> Db {
    Db::open(Arc::new(LogStore::open(path).unwrap())).unwrap()
}

// =============================================================================
// Registry Properties
// =============================================================================

#[test]
fn test_random_names_get_distinct_prefixes() {
    let db = Db::memory().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
    let kinds = [
        FieldKind::Raw,
        FieldKind::String,
        FieldKind::Uint64,
        FieldKind::StructJson,
        FieldKind::Uint64Vector,
        FieldKind::Index,
    ];

    let mut names = HashSet::new();
    let mut prefixes = HashSet::new();
    while names.len() < 10_000 {
        let len = rng.gen_range(1..24);
        let name: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        if !names.insert(name.clone()) {
            continue;
        }
        let kind = kinds[rng.gen_range(0..kinds.len())];
        let prefix = db.registry().resolve(&name, kind).unwrap();
        assert!(prefixes.insert(prefix), "prefix reused for {}", name);
    }

    assert_eq!(db.registry().len(), 10_000);

    // Fixed-width prefixes: none is a prefix of another.
    let widths: HashSet<usize> = prefixes.iter().map(Vec::len).collect();
    assert_eq!(widths.len(), 1);
}

#[test]
fn test_same_name_different_kind_conflicts() {
    let db = Db::memory().unwrap();
    let counter = db.uint64_field("counter").unwrap();
    counter.put(&3).unwrap();

    match db.struct_field::<PeerMetadata>("counter") {
        Err(Error::SchemaConflict {
            name,
            registered,
            requested,
        }) => {
            assert_eq!(name, "counter");
            assert_eq!(registered, FieldKind::Uint64);
            assert_eq!(requested, FieldKind::StructJson);
        }
        other => panic!("expected SchemaConflict, got {:?}", other),
    }

    // The original declaration is untouched.
    assert_eq!(counter.get().unwrap(), 3);
}

#[test]
fn test_ids_survive_restart_and_stay_append_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");

    let (first, second, fingerprint) = {
        let db = open_log(&path);
        let a = db.registry().register("a", FieldKind::Raw).unwrap();
        let b = db.registry().register("b", FieldKind::Index).unwrap();
        let fingerprint = db.registry().fingerprint();
        db.close().unwrap();
        (a, b, fingerprint)
    };

    let db = open_log(&path);
    assert_eq!(db.registry().lookup("a").unwrap().id, first.id);
    assert_eq!(db.registry().lookup("b").unwrap().id, second.id);
    assert_eq!(db.registry().fingerprint(), fingerprint);

    let third = db.registry().register("c", FieldKind::String).unwrap();
    assert!(third.id > second.id);
}

// =============================================================================
// Field Scenarios
// =============================================================================

#[test]
fn test_struct_field_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");
    let value = PeerMetadata {
        addr: "1.2.3.4".to_string(),
    };

    {
        let db = open_log(&path);
        let field = db.struct_field::<PeerMetadata>("peer-metadata").unwrap();
        field.put(&value).unwrap();
        assert_eq!(field.get().unwrap(), value);
        db.close().unwrap();
    }

    let db = open_log(&path);
    let field = db.struct_field::<PeerMetadata>("peer-metadata").unwrap();
    assert_eq!(field.get().unwrap(), value);
}

#[test]
fn test_random_values_round_trip() {
    let db = Db::memory().unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let number = db.uint64_field("number").unwrap();
    let text = db.string_field("text").unwrap();
    let blob = db.raw_field("blob").unwrap();

    for _ in 0..200 {
        let n: u64 = rng.gen();
        number.put(&n).unwrap();
        assert_eq!(number.get().unwrap(), n);

        let len = rng.gen_range(0..40);
        let s: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        text.put(&s).unwrap();
        assert_eq!(text.get().unwrap(), s);

        let b: Vec<u8> = (0..rng.gen_range(0..64)).map(|_| rng.gen()).collect();
        blob.put(&b).unwrap();
        assert_eq!(blob.get().unwrap(), b);
    }
}

// =============================================================================
// Batch Atomicity
// =============================================================================

#[test]
fn test_batch_matches_sequential_puts() {
    let batched = Db::memory().unwrap();
    let sequential = Db::memory().unwrap();

    for db in [&batched, &sequential] {
        db.uint64_field("size").unwrap();
        db.index::<U64JsonIndex<PeerMetadata>>("peers").unwrap();
    }

    let peer = PeerMetadata {
        addr: "10.0.0.1".to_string(),
    };

    {
        let size = batched.uint64_field("size").unwrap();
        let peers = batched.index::<U64JsonIndex<PeerMetadata>>("peers").unwrap();
        let mut batch = batched.new_batch();
        size.put_in_batch(&mut batch, &1).unwrap();
        peers.put_in_batch(&mut batch, &42, &peer).unwrap();
        batched.write_batch(batch).unwrap();
    }
    {
        let size = sequential.uint64_field("size").unwrap();
        let peers = sequential.index::<U64JsonIndex<PeerMetadata>>("peers").unwrap();
        size.put(&1).unwrap();
        peers.put(&42, &peer).unwrap();
    }

    // Catalogue values carry timestamps; compare the data region only.
    let dump = |db: &Db| {
        db.store()
            .iterate(&[kv_shed::key::DATA_REGION])
            .unwrap()
            .collect::<StoreResult<Vec<_>>>()
            .unwrap()
    };
    assert_eq!(dump(&batched), dump(&sequential));
}

#[test]
fn test_uncommitted_batch_is_invisible_after_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");

    {
        let db = open_log(&path);
        let size = db.uint64_field("size").unwrap();
        size.put(&1).unwrap();

        let mut batch = db.new_batch();
        size.put_in_batch(&mut batch, &2).unwrap();
        db.raw_field("marker")
            .unwrap()
            .put_in_batch(&mut batch, &b"staged".to_vec())
            .unwrap();
        // Process stops before the batch is committed.
        drop(batch);
    }

    let db = open_log(&path);
    assert_eq!(db.uint64_field("size").unwrap().get().unwrap(), 1);
    assert!(db.raw_field("marker").unwrap().get().unwrap_err().is_not_found());
}

#[test]
fn test_batch_torn_mid_commit_is_all_or_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");

    // Build the staged writes against a scratch copy of the log so the real
    // one can receive only a partial commit.
    let scratch = dir.path().join("scratch.log");
    let committed_len;
    {
        let db = open_log(&path);
        db.uint64_field("size").unwrap().put(&1).unwrap();
        db.raw_field("marker").unwrap();
        db.close().unwrap();
        committed_len = std::fs::metadata(&path).unwrap().len();
    }
    std::fs::copy(&path, &scratch).unwrap();
    {
        let db = open_log(&scratch);
        let mut batch = db.new_batch();
        db.uint64_field("size")
            .unwrap()
            .put_in_batch(&mut batch, &2)
            .unwrap();
        db.raw_field("marker")
            .unwrap()
            .put_in_batch(&mut batch, &b"staged".to_vec())
            .unwrap();
        db.write_batch(batch).unwrap();
        db.close().unwrap();
    }

    // Append every proper prefix of the committed frame and reopen.
    let full = std::fs::read(&scratch).unwrap();
    let frame = &full[committed_len as usize..];
    for cut in [1, 7, 8, 11, 12, frame.len() / 2, frame.len() - 1] {
        std::fs::write(&path, &full[..committed_len as usize]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&frame[..cut]).unwrap();
        drop(file);

        let db = open_log(&path);
        assert_eq!(db.uint64_field("size").unwrap().get().unwrap(), 1, "cut at {}", cut);
        assert!(db.raw_field("marker").unwrap().get().unwrap_err().is_not_found());
        db.close().unwrap();
    }

    // The whole frame applies both writes.
    std::fs::write(&path, &full).unwrap();
    let db = open_log(&path);
    assert_eq!(db.uint64_field("size").unwrap().get().unwrap(), 2);
    assert_eq!(db.raw_field("marker").unwrap().get().unwrap(), b"staged".to_vec());
}

#[test]
fn test_damaged_catalogue_frame_never_reissues_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");

    {
        let db = open_log(&path);
        db.string_field("schema-name").unwrap().put(&"v1".to_string()).unwrap();
        db.uint64_field("size").unwrap().put(&3).unwrap();
        db.close().unwrap();
    }
    let before = std::fs::read(&path).unwrap();

    // The first frame registers `schema-name`; damage its length.
    let mut data = before.clone();
    data[3] ^= 0x01;
    std::fs::write(&path, &data).unwrap();

    match LogStore::open(&path) {
        Err(StoreError::Corruption { offset: 0, .. }) => {}
        Err(other) => panic!("expected corruption at offset 0, got {:?}", other),
        Ok(_) => panic!("damaged log opened"),
    }
    assert_eq!(std::fs::read(&path).unwrap().len(), before.len());

    std::fs::write(&path, &before).unwrap();
    let db = open_log(&path);
    assert_eq!(db.registry().lookup("schema-name").unwrap().id.get(), 1);
    assert_eq!(db.string_field("schema-name").unwrap().get().unwrap(), "v1");
    let fresh = db.registry().register("fresh", FieldKind::Raw).unwrap();
    assert_eq!(fresh.id.get(), 3);
}

// =============================================================================
// Index Scenarios
// =============================================================================

#[test]
fn test_index_survives_restart_in_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shed.log");

    {
        let db = open_log(&path);
        let peers = db.index::<U64JsonIndex<PeerMetadata>>("peers").unwrap();
        for id in [30u64, 10, 20] {
            peers
                .put(&id, &PeerMetadata {
                    addr: format!("10.0.0.{}", id),
                })
                .unwrap();
        }
        db.close().unwrap();
    }

    let db = open_log(&path);
    let peers = db.index::<U64JsonIndex<PeerMetadata>>("peers").unwrap();
    let ids: Vec<u64> = peers
        .iter(IterateOptions::default())
        .unwrap()
        .map(|item| item.unwrap().0)
        .collect();
    assert_eq!(ids, vec![10, 20, 30]);
    assert_eq!(peers.last(&[]).unwrap().1.addr, "10.0.0.30");
}

// =============================================================================
// Store Failures
// =============================================================================

/// Memory store whose writes can be switched off
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl Store for FlakyStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn write_batch(&self, batch: Batch) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk unavailable",
            )));
        }
        self.inner.write_batch(batch)
    }

    fn iterate(&self, prefix: &[u8]) -> StoreResult<kv_shed::store::KvIter<'_>> {
        self.inner.iterate(prefix)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }
}

#[test]
fn test_store_errors_pass_through() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::new(),
        fail_writes: AtomicBool::new(false),
    });
    let db = Db::open(store.clone()).unwrap();
    let field = db.string_field("name").unwrap();

    store.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(
        field.put(&"x".to_string()),
        Err(Error::Store(StoreError::Io(_)))
    ));

    // A registration whose commit fails leaves nothing behind.
    assert!(matches!(
        db.raw_field("new-field"),
        Err(Error::Store(StoreError::Io(_)))
    ));
    assert!(db.registry().lookup("new-field").is_none());

    store.fail_writes.store(false, Ordering::SeqCst);
    let entry = db.registry().register("new-field", FieldKind::Raw).unwrap();
    assert_eq!(entry.id, db.registry().lookup("name").unwrap().id.next().unwrap());
}
