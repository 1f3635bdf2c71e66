#![allow(clippy::unwrap_used)]

use std::time::Duration;

use super::*;

#[tokio::test]
async fn insert_and_fetch_certificate() {
    let store = GatewayStore::open_in_memory().await.unwrap();

    let raw = vec![1u8, 2, 3, 4];
    let cert_id = [7u8; 32];
    let id = store
        .insert_certificate(&raw, r#"{"network_id":1}"#, &cert_id)
        .await
        .unwrap();
    assert!(id > 0);

    let record = store.get_by_cert_id(&cert_id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.raw_request, raw);
    assert!(record.processed_at.is_none());

    assert!(store.get_by_cert_id(&[0u8; 32]).await.unwrap().is_none());
}

#[tokio::test]
async fn mark_processed_is_one_shot() {
    let store = GatewayStore::open_in_memory().await.unwrap();
    let id = store
        .insert_certificate(&[1], "{}", &[9u8; 32])
        .await
        .unwrap();

    assert!(store.mark_processed(id).await.unwrap());
    let record = store.get_by_cert_id(&[9u8; 32]).await.unwrap().unwrap();
    let first = record.processed_at.unwrap();

    // Second call must not move the timestamp.
    assert!(!store.mark_processed(id).await.unwrap());
    let record = store.get_by_cert_id(&[9u8; 32]).await.unwrap().unwrap();
    assert_eq!(record.processed_at.unwrap(), first);
}

#[tokio::test]
async fn list_eligible_respects_delay_and_order() {
    let store = GatewayStore::open_in_memory().await.unwrap();
    let a = store.insert_certificate(&[1], "{}", &[1u8; 32]).await.unwrap();
    let b = store.insert_certificate(&[2], "{}", &[2u8; 32]).await.unwrap();

    let now = unix_timestamp_ms();

    // Nothing eligible while the hold has not elapsed.
    let eligible = store.list_eligible(now, 3600).await.unwrap();
    assert!(eligible.is_empty());

    // With a zero delay both are eligible, in id order.
    let eligible = store.list_eligible(now, 0).await.unwrap();
    assert_eq!(eligible.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);

    // Processed records drop out of the snapshot.
    store.mark_processed(a).await.unwrap();
    let eligible = store.list_eligible(now, 0).await.unwrap();
    assert_eq!(eligible.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b]);
}

#[tokio::test]
async fn list_unprocessed_excludes_processed() {
    let store = GatewayStore::open_in_memory().await.unwrap();
    let a = store.insert_certificate(&[1], "{}", &[1u8; 32]).await.unwrap();
    store.insert_certificate(&[2], "{}", &[2u8; 32]).await.unwrap();

    store.mark_processed(a).await.unwrap();

    let unprocessed = store.list_unprocessed().await.unwrap();
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(store.list_all_descending().await.unwrap().len(), 2);
}

#[tokio::test]
async fn config_defaults_seeded() {
    let store = GatewayStore::open_in_memory().await.unwrap();

    assert_eq!(store.get_config("delay_seconds").await.unwrap(), "172800");
    assert_eq!(store.get_config("delayed_chains").await.unwrap(), "1,137");
    // Absent keys read as empty, not as an error.
    assert_eq!(store.get_config("no_such_key").await.unwrap(), "");
    assert_eq!(store.get_credential("no_such_key").await.unwrap(), "");
}

#[tokio::test]
async fn legacy_delay_hours_migrates_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gateway.db");

    {
        let store = GatewayStore::open(&path).await.unwrap();
        store.set_config("delay_hours", "2").await.unwrap();
        sqlx::query("DELETE FROM configuration WHERE key = 'delay_seconds'")
            .execute(store.pool())
            .await
            .unwrap();
    }

    let store = GatewayStore::open(&path).await.unwrap();
    assert_eq!(store.get_config("delay_seconds").await.unwrap(), "7200");
    assert_eq!(store.get_config("delay_hours").await.unwrap(), "");
}

#[tokio::test]
async fn scheduler_flag_round_trip() {
    let store = GatewayStore::open_in_memory().await.unwrap();

    assert!(store.get_scheduler_flag().await.unwrap());
    store.set_scheduler_flag(false).await.unwrap();
    assert!(!store.get_scheduler_flag().await.unwrap());
    store.set_scheduler_flag(true).await.unwrap();
    assert!(store.get_scheduler_flag().await.unwrap());
}

#[tokio::test]
async fn attempts_counted_within_window_and_pruned() {
    let store = GatewayStore::open_in_memory().await.unwrap();

    store.record_attempt("kill").await.unwrap();
    store.record_attempt("kill").await.unwrap();
    store.record_attempt("restart").await.unwrap();

    let kills = store
        .count_recent_attempts("kill", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(kills, 2);

    let restarts = store
        .count_recent_attempts("restart", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(restarts, 1);

    // Pruning with a zero retention drops everything already recorded.
    let dropped = store.prune_attempts(Duration::from_secs(0)).await.unwrap();
    assert_eq!(dropped, 3);
    let kills = store
        .count_recent_attempts("kill", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(kills, 0);
}
