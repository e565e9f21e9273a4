//! Memoizer behaviour with several instances sharing one store, each
//! instance standing in for a process.

mod common;

use std::sync::Arc;
use std::time::Duration;

use fleetcache::{BackoffConfig, LockManager, MemoizeConfig, MemoizeError, Memoizer};
use fleetcache_backend::SharedStore;
use fleetcache_moka::MokaStore;
use futures::future::join_all;

use common::{Counter, FlakyStore, init_tracing};

fn fast_config() -> MemoizeConfig {
    MemoizeConfig::default()
        .lock_ttl(Duration::from_secs(5))
        .wait_timeout(Duration::from_secs(5))
        .backoff(BackoffConfig {
            initial: Duration::from_millis(5),
            max: Duration::from_millis(50),
            ..BackoffConfig::default()
        })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fleet_computes_once() {
    init_tracing();
    let store: Arc<dyn SharedStore> = Arc::new(MokaStore::new());
    let counter = Counter::new();

    let tasks = (0..5).map(|i| {
        let memoizer = Memoizer::with_config(Arc::clone(&store), fast_config());
        let compute = counter.compute(Duration::from_millis(100), format!("computed by {i}"));
        tokio::spawn(async move {
            memoizer
                .memoize("nightly", Duration::from_secs(60), compute)
                .await
        })
    });
    let values: Vec<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(counter.get(), 1);
    assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_in_process_callers_share_one_call() {
    let store = MokaStore::new();
    let memoizer = Memoizer::with_config(Arc::new(store), fast_config());
    let counter = Counter::new();

    let calls = (0..8).map(|_| {
        memoizer.memoize(
            "totals",
            Duration::from_secs(60),
            counter.compute(Duration::from_millis(50), 99_u64),
        )
    });
    for result in join_all(calls).await {
        assert_eq!(result.unwrap(), 99);
    }
    assert_eq!(counter.get(), 1);
}

#[tokio::test]
async fn test_record_is_reused_within_window() {
    let store: Arc<dyn SharedStore> = Arc::new(MokaStore::new());
    let first = Memoizer::with_config(Arc::clone(&store), fast_config());
    let second = Memoizer::with_config(store, fast_config());
    let counter = Counter::new();

    let a = first
        .memoize(
            "greeting",
            Duration::from_secs(60),
            counter.compute(Duration::ZERO, "hello".to_owned()),
        )
        .await
        .unwrap();
    let b = second
        .memoize(
            "greeting",
            Duration::from_secs(60),
            counter.compute(Duration::ZERO, "bye".to_owned()),
        )
        .await
        .unwrap();

    assert_eq!(a, "hello");
    assert_eq!(b, "hello");
    assert_eq!(counter.get(), 1);
    assert_eq!(second.peek::<String>("greeting").await.unwrap().as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_window_expiry_recomputes() {
    let memoizer = Memoizer::with_config(Arc::new(MokaStore::new()), fast_config());
    let counter = Counter::new();
    let window = Duration::from_millis(50);

    let first = memoizer
        .memoize("tick", window, counter.compute(Duration::ZERO, 1_u32))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    let second = memoizer
        .memoize("tick", window, counter.compute(Duration::ZERO, 2_u32))
        .await
        .unwrap();

    assert_eq!((first, second), (1, 2));
    assert_eq!(counter.get(), 2);
}

#[tokio::test]
async fn test_failure_leaves_nothing_behind() {
    let store = MokaStore::new();
    let memoizer = Memoizer::with_config(Arc::new(store.clone()), fast_config());
    let counter = Counter::new();

    let result = memoizer
        .memoize::<u32, _, _, _>("flaky", Duration::from_secs(60), counter.failing())
        .await;
    assert!(matches!(result, Err(MemoizeError::Compute(_))));
    assert_eq!(store.peek(&memoizer.lock_key("flaky")).await, None);
    assert_eq!(store.peek(&memoizer.storage_key("flaky")).await, None);

    let value = memoizer
        .memoize("flaky", Duration::from_secs(60), counter.compute(Duration::ZERO, 5_u32))
        .await
        .unwrap();
    assert_eq!(value, 5);
    assert_eq!(counter.get(), 2);
}

#[tokio::test]
async fn test_waiter_times_out_while_lock_is_held() {
    let store: Arc<dyn SharedStore> = Arc::new(MokaStore::new());
    let memoizer = Memoizer::with_config(
        Arc::clone(&store),
        fast_config().wait_timeout(Duration::from_millis(150)),
    );
    let counter = Counter::new();

    // Someone else is computing and never finishes within the wait.
    let held = LockManager::new(store)
        .try_acquire(&memoizer.lock_key("stuck"), Duration::from_secs(10))
        .await
        .unwrap();

    let result = memoizer
        .memoize("stuck", Duration::from_secs(60), counter.compute(Duration::ZERO, 1_u8))
        .await;
    match result {
        Err(MemoizeError::LockTimeout { name, waited }) => {
            assert_eq!(name, "stuck");
            assert!(waited >= Duration::from_millis(150));
        }
        other => panic!("expected a lock timeout, got {other:?}"),
    }
    assert_eq!(counter.get(), 0);
    held.release().await.unwrap();
}

#[tokio::test]
async fn test_waiter_takes_over_abandoned_lock() {
    let store: Arc<dyn SharedStore> = Arc::new(MokaStore::new());
    let memoizer = Memoizer::with_config(Arc::clone(&store), fast_config());
    let counter = Counter::new();

    // A crashed computer: its lock expires and no record is ever written.
    let crashed = LockManager::new(store)
        .try_acquire(&memoizer.lock_key("orphan"), Duration::from_millis(50))
        .await
        .unwrap();
    std::mem::forget(crashed);

    let value = memoizer
        .memoize("orphan", Duration::from_secs(60), counter.compute(Duration::ZERO, 42_u32))
        .await
        .unwrap();
    assert_eq!(value, 42);
    assert_eq!(counter.get(), 1);
}

#[tokio::test]
async fn test_store_outage_is_reported() {
    let store = FlakyStore::new();
    let memoizer = Memoizer::with_config(Arc::new(store.clone()), fast_config());
    let counter = Counter::new();

    store.fail_reads(true);
    let result = memoizer
        .memoize("report", Duration::from_secs(60), counter.compute(Duration::ZERO, 1_u32))
        .await;
    match result {
        Err(err @ MemoizeError::StoreUnavailable(_)) => assert!(err.is_transient()),
        other => panic!("expected store unavailable, got {other:?}"),
    }
    assert_eq!(counter.get(), 0);
}

#[tokio::test]
async fn test_keys_and_forget() {
    let memoizer = Memoizer::with_config(Arc::new(MokaStore::new()), fast_config());
    assert_ne!(memoizer.storage_key("hello"), memoizer.lock_key("hello"));
    assert_eq!(memoizer.peek::<u32>("hello").await.unwrap(), None);

    let counter = Counter::new();
    memoizer
        .memoize("hello", Duration::from_secs(60), counter.compute(Duration::ZERO, 1_u32))
        .await
        .unwrap();
    assert_eq!(memoizer.peek::<u32>("hello").await.unwrap(), Some(1));

    assert!(memoizer.forget("hello").await.unwrap().is_deleted());
    assert_eq!(memoizer.peek::<u32>("hello").await.unwrap(), None);
    memoizer
        .memoize("hello", Duration::from_secs(60), counter.compute(Duration::ZERO, 2_u32))
        .await
        .unwrap();
    assert_eq!(counter.get(), 2);
}

#[tokio::test]
async fn test_bincode_records() {
    let config = fast_config().format(fleetcache::ValueFormat::Bincode);
    let memoizer = Memoizer::with_config(Arc::new(MokaStore::new()), config);
    let counter = Counter::new();

    let value = memoizer
        .memoize(
            "pairs",
            Duration::from_secs(60),
            counter.compute(Duration::ZERO, vec![(1_u8, "a".to_owned())]),
        )
        .await
        .unwrap();
    assert_eq!(memoizer.peek::<Vec<(u8, String)>>("pairs").await.unwrap(), Some(value));
}

#[tokio::test]
async fn test_unbounded_waits_do_not_overflow() {
    let config = fast_config().lock_wait(Duration::MAX).wait_timeout(Duration::MAX);
    let memoizer = Memoizer::with_config(Arc::new(MokaStore::new()), config);
    let counter = Counter::new();

    let value = memoizer
        .memoize("forever", Duration::from_secs(60), counter.compute(Duration::ZERO, 7_u32))
        .await
        .unwrap();
    assert_eq!(value, 7);
}
