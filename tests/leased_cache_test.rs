mod common;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::ScriptedExtractor;
use oslo_events::apis::Extractor;
use oslo_events::cache::{
    CacheStore, CachedEventSet, DeliveryOrigin, EventProvider, LeasedCacheManager, LeasedSettings,
    MemoryStore, SqliteStore,
};
use oslo_events::constants::{EVENTS_CACHE_KEY, EVENTS_LEASE_KEY};
use oslo_events::delivery::collect_events;
use oslo_events::error::{Result, ScraperError};
use oslo_events::pipeline::ScrapeCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn settings() -> LeasedSettings {
    LeasedSettings {
        ttl: Duration::from_secs(3600),
        lease_ttl: Duration::from_secs(600),
        join_wait: Duration::from_secs(10),
        join_poll_interval: Duration::from_millis(500),
        retention: Duration::from_secs(24 * 3600),
    }
}

fn leased(extractors: Vec<Arc<dyn Extractor>>, store: Arc<dyn CacheStore>) -> LeasedCacheManager {
    LeasedCacheManager::new(ScrapeCoordinator::new(extractors, None), store, settings())
}

async fn seed(store: &dyn CacheStore, age: ChronoDuration, events: usize) -> CachedEventSet {
    let record = CachedEventSet {
        events: (0..events).map(|n| common::event("rockefeller", n)).collect(),
        refreshed_at: Utc::now() - age,
    };
    let raw = serde_json::to_string(&record).unwrap();
    store.set(EVENTS_CACHE_KEY, &raw, Duration::from_secs(86_400)).await.unwrap();
    record
}

#[tokio::test]
async fn test_miss_scrapes_and_writes_record() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedExtractor::new("billetto", 3, Duration::ZERO));
    let manager = leased(vec![source.clone()], store.clone());

    let (events, delivery) = collect_events(&manager).await;
    assert_eq!(delivery.origin, DeliveryOrigin::Scrape);
    assert_eq!(events.len(), 3);
    assert_eq!(manager.read_record().await.unwrap().events.len(), 3);

    // Lease was released, and the fresh record is served without another run
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "probe", Duration::from_secs(1)).await.unwrap());
    let (again, delivery) = collect_events(&manager).await;
    assert_eq!(delivery.origin, DeliveryOrigin::Cache);
    assert_eq!(again, events);
    assert_eq!(source.runs(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lease_held_elsewhere_serves_stale_after_bounded_wait() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), ChronoDuration::hours(2), 2).await;
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "other-process", Duration::from_secs(600)).await.unwrap());

    let source = Arc::new(ScriptedExtractor::new("billetto", 1, Duration::ZERO));
    let manager = leased(vec![source.clone()], store);

    let started = tokio::time::Instant::now();
    let (events, delivery) = collect_events(&manager).await;

    assert_eq!(delivery.origin, DeliveryOrigin::BestEffort);
    assert_eq!(events.len(), 2);
    assert_eq!(source.runs(), 0);
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_lease_held_and_no_data_delivers_empty() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "other-process", Duration::from_secs(600)).await.unwrap());
    let manager = leased(vec![Arc::new(ScriptedExtractor::new("billetto", 1, Duration::ZERO))], store);

    let (events, delivery) = collect_events(&manager).await;
    assert!(events.is_empty());
    assert_eq!(delivery.origin, DeliveryOrigin::Empty);
}

#[tokio::test(start_paused = true)]
async fn test_waiting_caller_picks_up_peer_record() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let old = seed(store.as_ref(), ChronoDuration::hours(2), 1).await;
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "other-process", Duration::from_secs(600)).await.unwrap());

    // The other process finishes its cycle a few seconds in
    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let record = CachedEventSet {
                events: (0..4).map(|n| common::event("billetto", n)).collect(),
                refreshed_at: old.refreshed_at + ChronoDuration::hours(2),
            };
            let raw = serde_json::to_string(&record).unwrap();
            store.set(EVENTS_CACHE_KEY, &raw, Duration::from_secs(86_400)).await.unwrap();
        })
    };

    let manager = leased(vec![Arc::new(ScriptedExtractor::new("billetto", 1, Duration::ZERO))], store);
    let (events, delivery) = collect_events(&manager).await;
    writer.await.unwrap();

    assert_eq!(delivery.origin, DeliveryOrigin::Joined);
    assert_eq!(events.len(), 4);
}

#[tokio::test]
async fn test_failed_cycle_leaves_record_untouched() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let old = seed(store.as_ref(), ChronoDuration::hours(2), 2).await;
    let manager = leased(
        vec![Arc::new(ScriptedExtractor::failing("rockefeller", 0, Duration::ZERO))],
        store.clone(),
    );

    let (events, delivery) = collect_events(&manager).await;

    assert_eq!(delivery.origin, DeliveryOrigin::BestEffort);
    assert_eq!(events.len(), 2);
    assert_eq!(manager.read_record().await.unwrap().refreshed_at, old.refreshed_at);
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "next", Duration::from_secs(1)).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_caller_going_away_does_not_abandon_the_cycle() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedExtractor::new("billetto", 3, Duration::from_secs(5)));
    let manager = leased(vec![source.clone()], store.clone());

    let gone = tokio::time::timeout(Duration::from_secs(2), collect_events(&manager)).await;
    assert!(gone.is_err());

    tokio::time::sleep(Duration::from_secs(30)).await;
    let record = manager.read_record().await.expect("cycle finished without its caller");
    assert_eq!(record.events.len(), 3);
    assert!(store.try_acquire_lease(EVENTS_LEASE_KEY, "next", Duration::from_secs(1)).await.unwrap());
    store.release_lease(EVENTS_LEASE_KEY, "next").await.unwrap();

    let (events, delivery) = collect_events(&manager).await;
    assert_eq!(delivery.origin, DeliveryOrigin::Cache);
    assert_eq!(events.len(), 3);
    assert_eq!(source.runs(), 1);
    assert_eq!(manager.cycles_started(), 1);
}

/// Another process commits and releases just as this one takes the lease
struct LateWinnerStore {
    inner: MemoryStore,
}

#[async_trait]
impl CacheStore for LateWinnerStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let acquired = self.inner.try_acquire_lease(name, holder, ttl).await?;
        if acquired {
            seed(&self.inner, ChronoDuration::zero(), 4).await;
        }
        Ok(acquired)
    }

    async fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        self.inner.release_lease(name, holder).await
    }
}

#[tokio::test]
async fn test_record_is_rechecked_after_winning_the_lease() {
    let store = Arc::new(LateWinnerStore { inner: MemoryStore::new() });
    seed(&store.inner, ChronoDuration::hours(2), 1).await;
    let source = Arc::new(ScriptedExtractor::new("billetto", 2, Duration::ZERO));
    let manager = leased(vec![source.clone()], store.clone());

    let (events, delivery) = collect_events(&manager).await;

    assert_eq!(delivery.origin, DeliveryOrigin::Cache);
    assert_eq!(events.len(), 4);
    assert_eq!(source.runs(), 0);
    assert_eq!(manager.cycles_started(), 0);
    assert!(store.inner.try_acquire_lease(EVENTS_LEASE_KEY, "next", Duration::from_secs(1)).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_across_processes_scrape_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let first_store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let second_store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).unwrap());
    seed(first_store.as_ref(), ChronoDuration::hours(2), 1).await;

    let first_source = Arc::new(ScriptedExtractor::new("rockefeller", 3, Duration::from_millis(50)));
    let second_source = Arc::new(ScriptedExtractor::new("rockefeller", 3, Duration::from_millis(50)));
    let first = leased(vec![first_source.clone()], first_store);
    let second = leased(vec![second_source.clone()], second_store);

    let mut handles = Vec::new();
    for n in 0..5 {
        let manager = if n % 2 == 0 { first.clone() } else { second.clone() };
        handles.push(tokio::spawn(async move { collect_events(&manager).await }));
    }
    for handle in handles {
        let (events, delivery) = handle.await.unwrap();
        assert_eq!(events.len(), 3, "origin {}", delivery.origin);
    }

    assert_eq!(first_source.runs() + second_source.runs(), 1);
    assert_eq!(first.cycles_started() + second.cycles_started(), 1);
}

/// A store that is down for everything
struct BrokenStore;

#[async_trait]
impl CacheStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(ScraperError::Store("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(ScraperError::Store("connection refused".into()))
    }

    async fn try_acquire_lease(&self, _name: &str, _holder: &str, _ttl: Duration) -> Result<bool> {
        Err(ScraperError::Store("connection refused".into()))
    }

    async fn release_lease(&self, _name: &str, _holder: &str) -> Result<()> {
        Err(ScraperError::Store("connection refused".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_degrades_to_empty() {
    let source = Arc::new(ScriptedExtractor::new("billetto", 1, Duration::ZERO));
    let manager = leased(vec![source.clone()], Arc::new(BrokenStore));

    let (events, delivery) = collect_events(&manager).await;

    assert!(events.is_empty());
    assert_eq!(delivery.origin, DeliveryOrigin::Empty);
    assert_eq!(source.runs(), 0);
}

#[tokio::test]
async fn test_two_processes_on_one_sqlite_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.db");
    let first_store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).unwrap());
    let second_store: Arc<dyn CacheStore> = Arc::new(SqliteStore::open(&path).unwrap());

    let first_source = Arc::new(ScriptedExtractor::new("rockefeller", 2, Duration::ZERO));
    let second_source = Arc::new(ScriptedExtractor::new("rockefeller", 2, Duration::ZERO));
    let first = leased(vec![first_source.clone()], first_store);
    let second = leased(vec![second_source.clone()], second_store);

    let (events, delivery) = collect_events(&first).await;
    assert_eq!(delivery.origin, DeliveryOrigin::Scrape);

    let (shared, delivery) = collect_events(&second).await;
    assert_eq!(delivery.origin, DeliveryOrigin::Cache);
    assert_eq!(shared, events);
    assert_eq!(second_source.runs(), 0);
    assert_eq!(second.status().await.events, 2);
}
