//! Behaviour of the Moka-backed shared store.

use std::time::Duration;

use bytes::Bytes;
use fleetcache_backend::{DeleteStatus, LockStatus, SharedStore};
use fleetcache_moka::{EvictionPolicy, MokaStore, MokaStoreBuilder};

#[tokio::test]
async fn test_set_get_delete() {
    let store = MokaStore::new();

    assert_eq!(store.get("a").await.unwrap(), None);
    store.set("a", Bytes::from_static(b"1"), None).await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"1")));

    store.set("a", Bytes::from_static(b"2"), None).await.unwrap();
    assert_eq!(store.get("a").await.unwrap(), Some(Bytes::from_static(b"2")));

    assert_eq!(store.delete("a").await.unwrap(), DeleteStatus::Deleted(1));
    assert_eq!(store.delete("a").await.unwrap(), DeleteStatus::Missing);
    assert_eq!(store.get("a").await.unwrap(), None);
}

#[tokio::test]
async fn test_ttl_expires_entry() {
    let store = MokaStore::new();
    store
        .set("short", Bytes::from_static(b"x"), Some(Duration::from_millis(50)))
        .await
        .unwrap();
    store.set("forever", Bytes::from_static(b"y"), None).await.unwrap();

    assert!(store.get("short").await.unwrap().is_some());
    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(store.get("short").await.unwrap(), None);
    assert!(store.get("forever").await.unwrap().is_some());
}

#[tokio::test]
async fn test_set_if_absent_is_exclusive() {
    let store = MokaStore::new();
    let ttl = Duration::from_secs(5);

    assert_eq!(
        store.set_if_absent("lock", Bytes::from_static(b"t1"), ttl).await.unwrap(),
        LockStatus::Acquired
    );
    assert_eq!(
        store.set_if_absent("lock", Bytes::from_static(b"t2"), ttl).await.unwrap(),
        LockStatus::Locked
    );
    assert_eq!(store.peek("lock").await, Some(Bytes::from_static(b"t1")));
}

#[tokio::test]
async fn test_set_if_absent_takes_over_expired_entry() {
    let store = MokaStore::new();

    store
        .set_if_absent("lock", Bytes::from_static(b"t1"), Duration::from_millis(40))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        store
            .set_if_absent("lock", Bytes::from_static(b"t2"), Duration::from_secs(5))
            .await
            .unwrap(),
        LockStatus::Acquired
    );
    assert_eq!(store.peek("lock").await, Some(Bytes::from_static(b"t2")));
}

#[tokio::test]
async fn test_concurrent_set_if_absent_has_one_winner() {
    let store = MokaStore::new();

    let attempts = (0..16).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .set_if_absent("lock", Bytes::from(format!("t{i}")), Duration::from_secs(5))
                .await
                .unwrap()
        })
    });
    let results = futures::future::join_all(attempts).await;

    let winners = results
        .into_iter()
        .filter(|status| matches!(status, Ok(LockStatus::Acquired)))
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_delete_if_equals_checks_value() {
    let store = MokaStore::new();
    store
        .set_if_absent("lock", Bytes::from_static(b"mine"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(
        store.delete_if_equals("lock", b"theirs").await.unwrap(),
        DeleteStatus::Missing
    );
    assert!(store.peek("lock").await.is_some());

    assert_eq!(
        store.delete_if_equals("lock", b"mine").await.unwrap(),
        DeleteStatus::Deleted(1)
    );
    assert_eq!(store.peek("lock").await, None);
    assert_eq!(
        store.delete_if_equals("lock", b"mine").await.unwrap(),
        DeleteStatus::Missing
    );
}

#[tokio::test]
async fn test_delete_prefix() {
    let store = MokaStore::new();
    for key in ["app:cache:users:1", "app:cache:users:2", "app:cache:orders:1"] {
        store.set(key, Bytes::from_static(b"v"), None).await.unwrap();
    }

    assert_eq!(
        store.delete_prefix("app:cache:users:").await.unwrap(),
        DeleteStatus::Deleted(2)
    );
    assert_eq!(store.get("app:cache:users:1").await.unwrap(), None);
    assert!(store.get("app:cache:orders:1").await.unwrap().is_some());
    assert_eq!(
        store.delete_prefix("app:cache:users:").await.unwrap(),
        DeleteStatus::Missing
    );
}

#[tokio::test]
async fn test_clones_share_data() {
    let store = MokaStore::new();
    let other = store.clone();

    store.set("k", Bytes::from_static(b"v"), None).await.unwrap();
    assert_eq!(other.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
}

#[tokio::test]
async fn test_max_entries_bounds_store() {
    let store = MokaStoreBuilder::default()
        .max_entries(3)
        .eviction_policy(EvictionPolicy::lru())
        .build();

    for i in 0..10 {
        store
            .set(&format!("k{i}"), Bytes::from_static(b"v"), None)
            .await
            .unwrap();
    }

    assert!(store.entry_count().await <= 3);
}

#[tokio::test]
async fn test_label_is_store_name() {
    let store = MokaStore::builder().label("sessions").build();
    assert_eq!(store.name(), "sessions");
    assert_eq!(MokaStore::new().name(), "moka");
}
