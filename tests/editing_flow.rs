//! End-to-end editing flow through `EditorContext`

use retouch::config::{RetouchConfig, StorageConfig};
use retouch::EditorContext;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

fn config_at(dir: &TempDir, max_cache_bytes: u64) -> RetouchConfig {
    let mut storage = StorageConfig::rooted_at(dir.path().join("data"));
    storage.max_cache_bytes = max_cache_bytes;
    RetouchConfig {
        storage,
        ..Default::default()
    }
}

fn write_image(dir: &TempDir, name: &str, size: usize) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, vec![0xAB; size]).unwrap();
    path
}

fn cache_key(location: &Path) -> String {
    location.file_stem().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn fresh_session_has_nothing_to_undo_or_redo() {
    let dir = TempDir::new().unwrap();
    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();

    let session = ctx.start_session("orig.jpg").await;
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.cursor(), 0);
    assert!(!ctx.can_undo().await);
    assert!(!ctx.can_redo().await);
}

#[tokio::test]
async fn undo_then_edit_discards_redo_branch() {
    let dir = TempDir::new().unwrap();
    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();

    ctx.start_session("orig.jpg").await;
    ctx.record_edit(Path::new("e1.jpg"), "enhance", false).await.unwrap();
    let session = ctx.snapshot().await.unwrap();
    assert_eq!(session.cursor(), 1);
    assert!(ctx.can_undo().await);

    assert_eq!(ctx.undo().await, Some(PathBuf::from("orig.jpg")));
    assert_eq!(ctx.snapshot().await.unwrap().cursor(), 0);

    ctx.record_edit(Path::new("e2.jpg"), "crop", false).await.unwrap();
    let session = ctx.snapshot().await.unwrap();
    let locations: Vec<&Path> = session.history().iter().map(|s| s.location.as_path()).collect();
    assert_eq!(locations, vec![Path::new("orig.jpg"), Path::new("e2.jpg")]);
    assert_eq!(session.cursor(), 1);
    assert_eq!(session.tools_used(), vec!["crop"]);
    assert_eq!(ctx.redo().await, Some(PathBuf::from("e2.jpg")));
}

#[tokio::test]
async fn third_large_image_evicts_the_oldest() {
    let dir = TempDir::new().unwrap();
    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();
    let store = ctx.store();

    let mut cached = Vec::new();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        let src = write_image(&dir, name, (40 * MIB) as usize);
        cached.push(store.cache_image(&src, Some("enhance")).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = store.stats().await;
    assert_eq!(stats.entry_count, 2);
    assert!(stats.total_size_bytes <= 80 * MIB);
    assert!(!cached[0].exists());
    assert!(cached[1].exists());
    assert!(cached[2].exists());
}

#[tokio::test]
async fn externally_deleted_file_reads_as_absent() {
    let dir = TempDir::new().unwrap();
    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();
    let store = ctx.store();

    let kept = store.cache_image(&write_image(&dir, "k.jpg", 10), None).await.unwrap();
    let lost = store.cache_image(&write_image(&dir, "l.jpg", 10), None).await.unwrap();
    let before = store.stats().await.entry_count;

    std::fs::remove_file(&lost).unwrap();
    assert!(store.get_cached(&cache_key(&lost)).await.is_none());
    assert_eq!(store.stats().await.entry_count, before - 1);
    assert_eq!(store.get_cached(&cache_key(&kept)).await, Some(kept));
}

#[tokio::test]
async fn cached_edits_survive_restart() {
    let dir = TempDir::new().unwrap();

    let (edit, saved) = {
        let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();
        ctx.start_session(write_image(&dir, "orig.jpg", 64)).await;
        let edit = ctx
            .record_edit(&write_image(&dir, "e1.jpg", 128), "enhance", true)
            .await
            .unwrap();
        let saved = ctx.save_current(Some("keeper")).await.unwrap();
        assert!(ctx.end_session().await);
        assert_eq!(ctx.recent_sessions().await.len(), 1);
        (edit, saved)
    };

    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();
    let stats = ctx.store().stats().await;
    assert_eq!(stats.entry_count, 1);
    assert_eq!(stats.total_size_bytes, 128);
    assert_eq!(ctx.store().get_cached(&cache_key(&edit)).await, Some(edit));
    assert_eq!(ctx.store().list_saved_edits().await, vec![saved]);

    // Sessions are not persisted across restarts
    assert!(ctx.recent_sessions().await.is_empty());
    assert!(ctx.snapshot().await.is_none());
}

#[tokio::test]
async fn clear_cache_then_continue_editing() {
    let dir = TempDir::new().unwrap();
    let ctx = EditorContext::open(config_at(&dir, 100 * MIB)).await.unwrap();

    ctx.start_session(write_image(&dir, "orig.jpg", 8)).await;
    let first = ctx
        .record_edit(&write_image(&dir, "e1.jpg", 8), "enhance", true)
        .await
        .unwrap();
    ctx.store().clear_cache().await.unwrap();
    assert!(!first.exists());

    let second = ctx
        .record_edit(&write_image(&dir, "e2.jpg", 8), "crop", true)
        .await
        .unwrap();
    assert!(second.exists());
    assert_eq!(ctx.store().stats().await.entry_count, 1);
}
