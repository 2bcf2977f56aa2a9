use crate::cache::{Delivery, DeliveryCounter, DeliveryOrigin, EventProvider, ProviderStatus};
use crate::observability::metrics;
use crate::pipeline::ScrapeCoordinator;
use crate::types::{CycleReport, Event, SourceBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    IdleFresh,
    IdleStale,
    Refreshing,
}

/// Read-only view of the cached set
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub events: Arc<Vec<Event>>,
    pub refreshed_at: DateTime<Utc>,
    pub age: Duration,
}

struct CachedSet {
    events: Arc<Vec<Event>>,
    refreshed_at: DateTime<Utc>,
    stored_at: Instant,
}

enum Feed {
    Batch(Vec<Event>),
    /// The cycle produced nothing usable; previous set instead
    Fallback(Arc<Vec<Event>>),
}

/// The in-flight cycle marker. Dropping it closes every attached caller's feed.
#[derive(Default)]
struct InFlight {
    replay: Vec<Vec<Event>>,
    subscribers: Vec<mpsc::UnboundedSender<Feed>>,
}

impl InFlight {
    fn attach(&mut self) -> mpsc::UnboundedReceiver<Feed> {
        let (tx, rx) = mpsc::unbounded_channel();
        for batch in &self.replay {
            let _ = tx.send(Feed::Batch(batch.clone()));
        }
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, events: &[Event]) {
        self.subscribers
            .retain(|tx| tx.send(Feed::Batch(events.to_vec())).is_ok());
        self.replay.push(events.to_vec());
    }
}

#[derive(Default)]
struct State {
    cached: Option<CachedSet>,
    in_flight: Option<InFlight>,
    cycles_started: u64,
}

struct Shared {
    coordinator: ScrapeCoordinator,
    ttl: Duration,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_fresh(&self, cached: &CachedSet) -> bool {
        cached.stored_at.elapsed() < self.ttl
    }

    fn publish(&self, batch: &SourceBatch) {
        if let Some(in_flight) = self.lock().in_flight.as_mut() {
            in_flight.publish(&batch.events);
        }
    }

    /// Commit or discard the cycle's output and release the marker
    fn complete(&self, report: CycleReport) {
        let committed = report.is_committable();
        let secs = report.duration_secs();
        let mut state = self.lock();
        let in_flight = state.in_flight.take();

        if committed {
            info!(
                timed_out = report.timed_out,
                "Cycle committed {} events ({} of {} sources failed)",
                report.events.len(),
                report.failed_sources(),
                report.sources.len()
            );
            state.cached = Some(CachedSet {
                events: Arc::new(report.events),
                refreshed_at: report.finished_at,
                stored_at: Instant::now(),
            });
        } else {
            warn!(
                timed_out = report.timed_out,
                "Cycle discarded, all {} sources failed; keeping previous set",
                report.failed_sources()
            );
            if let (Some(in_flight), Some(previous)) = (in_flight.as_ref(), state.cached.as_ref()) {
                if in_flight.replay.is_empty() {
                    for tx in &in_flight.subscribers {
                        let _ = tx.send(Feed::Fallback(previous.events.clone()));
                    }
                }
            }
        }
        metrics::cycle::finished(committed, secs);
    }
}

/// Releases the marker if the cycle task ends without completing
struct CycleGuard {
    shared: Arc<Shared>,
    armed: bool,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if self.armed && self.shared.lock().in_flight.take().is_some() {
            warn!("Scrape cycle ended abnormally, marker released");
        }
    }
}

/// In-process cache with single-flight refresh.
///
/// While a cycle runs, every caller is attached to it: batches produced so far
/// are replayed, the rest arrive live. All callers see the same batches.
#[derive(Clone)]
pub struct CacheManager {
    shared: Arc<Shared>,
}

impl CacheManager {
    pub fn new(coordinator: ScrapeCoordinator, ttl: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                coordinator,
                ttl,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn status(&self) -> CacheStatus {
        let state = self.shared.lock();
        if state.in_flight.is_some() {
            CacheStatus::Refreshing
        } else if state.cached.as_ref().is_some_and(|c| self.shared.is_fresh(c)) {
            CacheStatus::IdleFresh
        } else {
            CacheStatus::IdleStale
        }
    }

    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        self.shared.lock().cached.as_ref().map(|c| CacheSnapshot {
            events: c.events.clone(),
            refreshed_at: c.refreshed_at,
            age: c.stored_at.elapsed(),
        })
    }

    pub fn cycles_started(&self) -> u64 {
        self.shared.lock().cycles_started
    }

    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }

    fn spawn_cycle(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut guard = CycleGuard {
                shared: shared.clone(),
                armed: true,
            };
            metrics::cycle::started();
            let publisher = shared.clone();
            let report = shared
                .coordinator
                .run_cycle(&mut |batch: &SourceBatch| publisher.publish(batch))
                .await;
            shared.complete(report);
            guard.armed = false;
        });
    }
}

enum Plan {
    Fresh(Arc<Vec<Event>>),
    Attach {
        feed: mpsc::UnboundedReceiver<Feed>,
        started: bool,
    },
}

#[async_trait]
impl EventProvider for CacheManager {
    async fn get_events(&self, sink: &mut (dyn FnMut(Vec<Event>) + Send)) -> Delivery {
        let plan = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            let fresh = state
                .cached
                .as_ref()
                .filter(|c| self.shared.is_fresh(c))
                .map(|c| c.events.clone());
            if let Some(in_flight) = state.in_flight.as_mut() {
                Plan::Attach {
                    feed: in_flight.attach(),
                    started: false,
                }
            } else if let Some(events) = fresh {
                Plan::Fresh(events)
            } else {
                let mut in_flight = InFlight::default();
                let feed = in_flight.attach();
                state.in_flight = Some(in_flight);
                state.cycles_started += 1;
                Plan::Attach {
                    feed,
                    started: true,
                }
            }
        };

        let mut counter = DeliveryCounter::new(sink);
        match plan {
            Plan::Fresh(events) => {
                debug!("Serving {} cached events", events.len());
                metrics::cache::hit();
                counter.deliver(events.as_ref().clone());
                counter.finish(DeliveryOrigin::Cache)
            }
            Plan::Attach { mut feed, started } => {
                if started {
                    info!("Cache stale, starting scrape cycle");
                    self.spawn_cycle();
                } else {
                    debug!("Attaching to in-flight scrape cycle");
                    metrics::cache::joined();
                }
                let mut origin = if started {
                    DeliveryOrigin::Scrape
                } else {
                    DeliveryOrigin::Joined
                };
                while let Some(item) = feed.recv().await {
                    match item {
                        Feed::Batch(events) => counter.deliver(events),
                        Feed::Fallback(events) => {
                            metrics::cache::best_effort();
                            origin = DeliveryOrigin::BestEffort;
                            counter.deliver(events.as_ref().clone());
                        }
                    }
                }
                let delivery = counter.finish(origin);
                if delivery.origin == DeliveryOrigin::Empty {
                    metrics::cache::empty();
                }
                delivery
            }
        }
    }

    async fn status(&self) -> ProviderStatus {
        let snapshot = self.snapshot();
        ProviderStatus {
            mode: "memory",
            state: Some(self.status()),
            events: snapshot.as_ref().map_or(0, |s| s.events.len()),
            refreshed_at: snapshot.as_ref().map(|s| s.refreshed_at),
            age_secs: snapshot.as_ref().map(|s| s.age.as_secs()),
            cycles_started: self.cycles_started(),
        }
    }
}
