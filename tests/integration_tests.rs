//! Integration tests across the label and storage crates
//!
//! These tests verify end-to-end behavior:
//! - JSON records → Labels → LabelStore → inference
//! - Memory store → export → redb store
//! - Persistence across restarts and concurrent writers
//!
//! Run with: cargo test --test integration_tests

use std::sync::Arc;

use coref_label::{CorefValue, Label};
use coref_storage::{
    open_store, BackendConfig, LabelStore, MemoryKv, OrderedKv, RedbKv, StoreConfig,
    AUTO_ANNOTATOR,
};
use tempfile::tempdir;

fn labels_from_json(json: &str) -> anyhow::Result<Vec<Label>> {
    Ok(serde_json::from_str(json)?)
}

const JUDGMENTS: &str = r#"[
    {"content_id1": "doc1", "content_id2": "doc2", "annotator_id": "alice", "value": 1, "epoch_ticks": 1000},
    {"content_id1": "doc2", "content_id2": "doc3", "annotator_id": "alice", "value": 1, "epoch_ticks": 1001},
    {"content_id1": "doc3", "content_id2": "doc4", "annotator_id": "bob", "value": -1, "epoch_ticks": 1002},
    {"content_id1": "doc1", "content_id2": "doc2", "annotator_id": "alice", "value": 0, "epoch_ticks": 900}
]"#;

// ============================================================================
// Records → Store → Inference
// ============================================================================

#[test]
fn test_json_records_through_inference() -> anyhow::Result<()> {
    let store = LabelStore::new(MemoryKv::new())?;
    store.put_all(&labels_from_json(JUDGMENTS)?)?;

    // The 900-tick unknown is older than the 1000-tick positive.
    let latest = store.get("doc2", "doc1", "alice")?;
    assert_eq!(latest.value(), CorefValue::Positive);
    assert_eq!(latest.epoch_ticks(), 1000);

    let expanded = store.expand("doc1")?;
    assert_eq!(expanded.len(), 3);
    assert!(expanded.contains(&Label::new("doc1", "doc3", "alice", CorefValue::Positive)));

    let negatives = store.negative_inference("doc4").collect::<Result<Vec<_>, _>>()?;
    for other in ["doc1", "doc2"] {
        assert!(
            negatives.contains(&Label::new("doc4", other, AUTO_ANNOTATOR, CorefValue::Negative)),
            "doc4 should differ from {other}"
        );
    }
    assert_eq!(negatives.len(), 3);
    Ok(())
}

#[test]
fn test_invalid_records_are_rejected() {
    let too_late = r#"[{"content_id1": "a", "content_id2": "b", "annotator_id": "x",
                        "value": 1, "epoch_ticks": 99999999999}]"#;
    assert!(labels_from_json(too_late).is_err());

    let bad_value = r#"[{"content_id1": "a", "content_id2": "b", "annotator_id": "x", "value": 2}]"#;
    assert!(labels_from_json(bad_value).is_err());

    let overrated = r#"[{"content_id1": "a", "content_id2": "b", "annotator_id": "x",
                        "value": 1, "rating": 16}]"#;
    assert!(labels_from_json(overrated).is_err());

    // Ratings on non-positive labels are dropped, not rejected.
    let rated_negative = r#"[{"content_id1": "a", "content_id2": "b", "annotator_id": "x",
                             "value": -1, "rating": 3}]"#;
    assert_eq!(labels_from_json(rated_negative).unwrap()[0].rating(), 0);
}

// ============================================================================
// Export / import between backends
// ============================================================================

#[test]
fn test_history_migrates_to_redb() -> anyhow::Result<()> {
    let source = LabelStore::new(MemoryKv::new())?;
    source.put_all(&labels_from_json(JUDGMENTS)?)?;
    let history = source.everything(true).collect::<Result<Vec<_>, _>>()?;
    assert_eq!(history.len(), 4);

    // Round-trip through JSON, the way an export file would.
    let exported = serde_json::to_string(&history)?;
    let imported = labels_from_json(&exported)?;

    let dir = tempdir()?;
    let target = LabelStore::new(RedbKv::open(dir.path().join("labels.redb"))?)?;
    target.put_all(&imported)?;

    let mut before = source.everything(false).collect::<Result<Vec<_>, _>>()?;
    let mut after = target.everything(false).collect::<Result<Vec<_>, _>>()?;
    before.sort_by(Label::cmp_storage);
    after.sort_by(Label::cmp_storage);
    assert_eq!(before.len(), 3);
    assert_eq!(before, after);
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.epoch_ticks(), a.epoch_ticks());
        assert_eq!(b.value(), a.value());
        assert_eq!(b.rating(), a.rating());
    }
    Ok(())
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_persistence_across_restarts() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config_path = dir.path().join("store.json");
    std::fs::write(
        &config_path,
        serde_json::json!({
            "backend": {"kind": "redb", "path": dir.path().join("db").join("labels.redb")},
            "scan_page_size": 2,
        })
        .to_string(),
    )?;
    let config = StoreConfig::from_json_file(&config_path)?;
    assert!(matches!(config.backend, BackendConfig::Redb { .. }));

    {
        let store = open_store(&config)?;
        store.put_all(&labels_from_json(JUDGMENTS)?)?;
    }
    {
        let store = open_store(&config)?;
        let component = store.connected_component("doc3").collect::<Result<Vec<_>, _>>()?;
        assert_eq!(component.len(), 2);
        store.delete_all()?;
    }

    let store = open_store(&config)?;
    assert_eq!(store.everything(true).count(), 0);
    Ok(())
}

#[test]
fn test_concurrent_writes() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let kv = Arc::new(RedbKv::open(dir.path().join("labels.redb"))?);

    std::thread::scope(|scope| -> anyhow::Result<()> {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let kv = Arc::clone(&kv);
                scope.spawn(move || -> anyhow::Result<()> {
                    let store = LabelStore::new(kv)?;
                    for i in 0..10 {
                        let label = Label::new(
                            format!("w{worker}"),
                            format!("item{i}"),
                            "annotator",
                            CorefValue::Positive,
                        );
                        store.put(&label)?;
                    }
                    Ok(())
                })
            })
            .collect();
        for handle in handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
        }
        Ok(())
    })?;

    let store = LabelStore::new(Arc::clone(&kv))?;
    assert_eq!(store.everything(false).count(), 40);
    for worker in 0..4 {
        let direct = store
            .directly_connected(format!("w{worker}"))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(direct.len(), 10);
    }
    // Each label is stored once per orientation.
    let rows = kv.scan_page(store.table(), &coref_storage::KeyRange::all(), usize::MAX)?;
    assert_eq!(rows.len(), 80);
    Ok(())
}

#[test]
fn test_empty_store() -> anyhow::Result<()> {
    let store = open_store(&StoreConfig::default())?;
    assert_eq!(store.everything(false).count(), 0);
    assert!(store.get("a", "b", "c").unwrap_err().is_not_found());
    assert!(store.expand("a")?.is_empty());
    assert_eq!(store.negative_inference("a").count(), 0);
    Ok(())
}
