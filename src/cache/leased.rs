use crate::cache::store::CacheStore;
use crate::cache::{CacheStatus, Delivery, DeliveryCounter, DeliveryOrigin, EventProvider, ProviderStatus};
use crate::config::CacheConfig;
use crate::constants::{EVENTS_CACHE_KEY, EVENTS_LEASE_KEY};
use crate::observability::metrics;
use crate::pipeline::ScrapeCoordinator;
use crate::types::{Event, SourceBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// The record kept in the shared store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedEventSet {
    pub events: Vec<Event>,
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LeasedSettings {
    pub ttl: Duration,
    pub lease_ttl: Duration,
    pub join_wait: Duration,
    pub join_poll_interval: Duration,
    pub retention: Duration,
}

impl LeasedSettings {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            lease_ttl: config.lease_ttl(),
            join_wait: config.join_wait(),
            join_poll_interval: config.join_poll_interval(),
            retention: config.retention(),
        }
    }
}

enum Feed {
    Batch(Vec<Event>),
    /// The cycle produced nothing usable; previous set instead
    Fallback(Vec<Event>),
}

struct Shared {
    coordinator: ScrapeCoordinator,
    store: Arc<dyn CacheStore>,
    settings: LeasedSettings,
    cycles_started: AtomicU64,
}

impl Shared {
    async fn read_record(&self) -> Option<CachedEventSet> {
        let raw = match self.store.get(EVENTS_CACHE_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read failed, treating as miss: {}", e);
                metrics::cache::store_error("read");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Cached event set is unreadable, ignoring it: {}", e);
                None
            }
        }
    }

    fn is_fresh(&self, record: &CachedEventSet) -> bool {
        match (Utc::now() - record.refreshed_at).to_std() {
            Ok(age) => age < self.settings.ttl,
            // refreshed_at in the future: another host's clock is ahead
            Err(_) => true,
        }
    }

    async fn write_record(&self, record: &CachedEventSet) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not encode event set: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .store
            .set(EVENTS_CACHE_KEY, &raw, self.settings.retention)
            .await
        {
            warn!("Cache write failed, callers already have their data: {}", e);
            metrics::cache::store_error("write");
        }
    }

    async fn release_lease(&self, holder: &str) {
        if let Err(e) = self.store.release_lease(EVENTS_LEASE_KEY, holder).await {
            warn!("Could not release lease, it will expire on its own: {}", e);
            metrics::cache::store_error("lease");
        }
    }

    /// Run one cycle as lease holder. The record is written before the lease
    /// is released, and the feed closes only after both.
    async fn refresh(&self, holder: String, previous: Option<CachedEventSet>, tx: mpsc::UnboundedSender<Feed>) {
        info!("Lease acquired, starting scrape cycle");
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        metrics::cycle::started();
        let report = self
            .coordinator
            .run_cycle(&mut |batch: &SourceBatch| {
                let _ = tx.send(Feed::Batch(batch.events.clone()));
            })
            .await;

        let committed = report.is_committable();
        if committed {
            info!(
                timed_out = report.timed_out,
                "Cycle committed {} events ({} of {} sources failed)",
                report.events.len(),
                report.failed_sources(),
                report.sources.len()
            );
            let record = CachedEventSet {
                events: report.events.clone(),
                refreshed_at: report.finished_at,
            };
            self.write_record(&record).await;
        } else {
            warn!(timed_out = report.timed_out, "Cycle discarded, keeping previous set");
            if let Some(previous) = previous.filter(|_| report.events.is_empty()) {
                let _ = tx.send(Feed::Fallback(previous.events));
            }
        }
        metrics::cycle::finished(committed, report.duration_secs());

        self.release_lease(&holder).await;
        drop(tx);
    }
}

/// Cache shared by several processes through a [`CacheStore`].
///
/// The lease only prevents duplicate scraping. A caller that loses the lease
/// waits a bounded time for the winner's record and otherwise gets the
/// previous set, or nothing. The winner's cycle runs on its own task, so it
/// commits and releases the lease even if the caller goes away.
#[derive(Clone)]
pub struct LeasedCacheManager {
    shared: Arc<Shared>,
}

impl LeasedCacheManager {
    pub fn new(coordinator: ScrapeCoordinator, store: Arc<dyn CacheStore>, settings: LeasedSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                coordinator,
                store,
                settings,
                cycles_started: AtomicU64::new(0),
            }),
        }
    }

    pub fn cycles_started(&self) -> u64 {
        self.shared.cycles_started.load(Ordering::Relaxed)
    }

    /// Current record, if any. Store and decode faults count as a miss.
    pub async fn read_record(&self) -> Option<CachedEventSet> {
        self.shared.read_record().await
    }

    fn spawn_refresh(&self, holder: String, previous: Option<CachedEventSet>) -> mpsc::UnboundedReceiver<Feed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = self.shared.clone();
        let span = info_span!("leased_refresh", holder = %holder);
        tokio::spawn(async move { shared.refresh(holder, previous, tx).await }.instrument(span));
        rx
    }

    async fn follow_refresh(&self, mut feed: mpsc::UnboundedReceiver<Feed>, mut counter: DeliveryCounter<'_>) -> Delivery {
        let mut origin = DeliveryOrigin::Scrape;
        while let Some(item) = feed.recv().await {
            match item {
                Feed::Batch(events) => counter.deliver(events),
                Feed::Fallback(events) => {
                    metrics::cache::best_effort();
                    origin = DeliveryOrigin::BestEffort;
                    counter.deliver(events);
                }
            }
        }
        let delivery = counter.finish(origin);
        if delivery.origin == DeliveryOrigin::Empty {
            metrics::cache::empty();
        }
        delivery
    }

    /// Someone else is scraping: poll for their record, then fall back
    async fn wait_for_peer(
        &self,
        previous: Option<CachedEventSet>,
        mut counter: DeliveryCounter<'_>,
    ) -> Delivery {
        let seen = previous.as_ref().map(|r| r.refreshed_at);
        let deadline = Instant::now() + self.shared.settings.join_wait;
        while Instant::now() < deadline {
            tokio::time::sleep(self.shared.settings.join_poll_interval).await;
            if let Some(record) = self.read_record().await {
                if seen.map_or(true, |seen| record.refreshed_at > seen) {
                    debug!("Picked up event set written by another process");
                    metrics::cache::joined();
                    counter.deliver(record.events);
                    return counter.finish(DeliveryOrigin::Joined);
                }
            }
        }

        match previous {
            Some(record) => {
                debug!("No newer event set within join wait, serving previous one");
                metrics::cache::best_effort();
                counter.deliver(record.events);
                counter.finish(DeliveryOrigin::BestEffort)
            }
            None => {
                metrics::cache::empty();
                counter.finish(DeliveryOrigin::Empty)
            }
        }
    }
}

#[async_trait]
impl EventProvider for LeasedCacheManager {
    async fn get_events(&self, sink: &mut (dyn FnMut(Vec<Event>) + Send)) -> Delivery {
        let mut counter = DeliveryCounter::new(sink);
        let previous = self.read_record().await;
        if let Some(record) = previous.as_ref().filter(|r| self.shared.is_fresh(r)) {
            debug!("Serving {} cached events", record.events.len());
            metrics::cache::hit();
            counter.deliver(record.events.clone());
            return counter.finish(DeliveryOrigin::Cache);
        }

        let holder = Uuid::new_v4().to_string();
        match self
            .shared
            .store
            .try_acquire_lease(EVENTS_LEASE_KEY, &holder, self.shared.settings.lease_ttl)
            .await
        {
            Ok(true) => {
                // A peer may have committed and released between our read and the acquire
                if let Some(record) = self.read_record().await.filter(|r| self.shared.is_fresh(r)) {
                    debug!("Event set refreshed by another process, giving the lease back");
                    self.shared.release_lease(&holder).await;
                    metrics::cache::hit();
                    counter.deliver(record.events);
                    return counter.finish(DeliveryOrigin::Cache);
                }
                let feed = self.spawn_refresh(holder, previous);
                self.follow_refresh(feed, counter).await
            }
            Ok(false) => {
                debug!("Another process holds the scrape lease");
                self.wait_for_peer(previous, counter).await
            }
            Err(e) => {
                warn!("Lease acquisition failed, treating as held: {}", e);
                metrics::cache::store_error("lease");
                self.wait_for_peer(previous, counter).await
            }
        }
    }

    async fn status(&self) -> ProviderStatus {
        let record = self.read_record().await;
        let state = match record.as_ref() {
            Some(r) if self.shared.is_fresh(r) => CacheStatus::IdleFresh,
            _ => CacheStatus::IdleStale,
        };
        ProviderStatus {
            mode: "sqlite",
            state: Some(state),
            events: record.as_ref().map_or(0, |r| r.events.len()),
            refreshed_at: record.as_ref().map(|r| r.refreshed_at),
            age_secs: record
                .as_ref()
                .and_then(|r| (Utc::now() - r.refreshed_at).to_std().ok())
                .map(|age| age.as_secs()),
            cycles_started: self.cycles_started(),
        }
    }
}
