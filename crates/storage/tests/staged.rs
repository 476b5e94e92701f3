use std::sync::Arc;

use powledger_storage::{Column, KeyValueStore, MemoryStore, StagedStore, WriteBatch};

fn seeded() -> StagedStore<Arc<MemoryStore>> {
    let base = Arc::new(MemoryStore::new());
    base.put(Column::Utxo, b"a1", b"base-a1").expect("seed");
    base.put(Column::Utxo, b"a2", b"base-a2").expect("seed");
    base.put(Column::Meta, b"a3", b"other-column").expect("seed");
    StagedStore::new(base)
}

#[test]
fn staged_writes_are_invisible_to_base_until_commit() {
    let staged = seeded();
    staged.put(Column::Utxo, b"a3", b"new").expect("put");
    staged.delete(Column::Utxo, b"a1").expect("delete");

    assert_eq!(staged.get(Column::Utxo, b"a3").expect("get"), Some(b"new".to_vec()));
    assert_eq!(staged.get(Column::Utxo, b"a1").expect("get"), None);
    assert_eq!(staged.base().get(Column::Utxo, b"a3").expect("get"), None);
    assert_eq!(
        staged.base().get(Column::Utxo, b"a1").expect("get"),
        Some(b"base-a1".to_vec())
    );

    assert_eq!(staged.commit().expect("commit"), 2);
    assert!(!staged.has_pending().expect("pending"));
    assert_eq!(
        staged.base().get(Column::Utxo, b"a3").expect("get"),
        Some(b"new".to_vec())
    );
    assert_eq!(staged.base().get(Column::Utxo, b"a1").expect("get"), None);
}

#[test]
fn rollback_discards_everything() {
    let staged = seeded();
    let mut batch = WriteBatch::new();
    batch.put(Column::Utxo, b"a9", b"x");
    batch.delete(Column::Utxo, b"a2");
    staged.write_batch(&batch).expect("batch");
    assert_eq!(staged.pending_len().expect("len"), 2);

    assert_eq!(staged.rollback().expect("rollback"), 2);
    assert_eq!(staged.get(Column::Utxo, b"a9").expect("get"), None);
    assert_eq!(
        staged.get(Column::Utxo, b"a2").expect("get"),
        Some(b"base-a2".to_vec())
    );
    assert_eq!(staged.commit().expect("commit"), 0);
}

#[test]
fn scan_merges_overlay_with_base() {
    let staged = seeded();
    staged.delete(Column::Utxo, b"a1").expect("delete");
    staged.put(Column::Utxo, b"a2", b"staged-a2").expect("put");
    staged.put(Column::Utxo, b"a0", b"staged-a0").expect("put");
    staged.put(Column::Utxo, b"b0", b"off-prefix").expect("put");

    let scanned = staged.scan_prefix(Column::Utxo, b"a").expect("scan");
    assert_eq!(
        scanned,
        vec![
            (b"a0".to_vec(), b"staged-a0".to_vec()),
            (b"a2".to_vec(), b"staged-a2".to_vec()),
        ]
    );

    let mut visited = Vec::new();
    staged
        .for_each_prefix(Column::Utxo, b"", &mut |key: &[u8], _: &[u8]| {
            visited.push(key.to_vec());
            Ok(())
        })
        .expect("visit");
    assert_eq!(visited, vec![b"a0".to_vec(), b"a2".to_vec(), b"b0".to_vec()]);
}
