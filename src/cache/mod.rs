//! Cached event sets in front of the scrape coordinator.
//!
//! [`CacheManager`] serves a single process and fans one in-flight cycle out
//! to every concurrent caller. [`LeasedCacheManager`] coordinates several
//! processes through a shared [`CacheStore`] and a lease, so late callers only
//! get best-effort data.

pub mod leased;
pub mod manager;
pub mod sqlite;
pub mod store;

use crate::types::Event;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

pub use leased::{CachedEventSet, LeasedCacheManager, LeasedSettings};
pub use manager::{CacheManager, CacheSnapshot, CacheStatus};
pub use sqlite::SqliteStore;
pub use store::{CacheStore, MemoryStore};

/// Where the events handed to one caller came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOrigin {
    /// Fresh cached set
    Cache,
    /// A cycle started by this caller
    Scrape,
    /// Attached to a cycle another caller started, or picked up its result
    Joined,
    /// Previous (possibly stale) set because no fresh data was available
    BestEffort,
    /// Nothing at all
    Empty,
}

impl DeliveryOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOrigin::Cache => "cache",
            DeliveryOrigin::Scrape => "scrape",
            DeliveryOrigin::Joined => "joined",
            DeliveryOrigin::BestEffort => "best_effort",
            DeliveryOrigin::Empty => "empty",
        }
    }
}

impl fmt::Display for DeliveryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `get_events` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub origin: DeliveryOrigin,
    pub batches: usize,
    pub events: usize,
}

impl Delivery {
    pub fn empty() -> Self {
        Self {
            origin: DeliveryOrigin::Empty,
            batches: 0,
            events: 0,
        }
    }
}

/// Tracks what has been handed to a caller's sink
pub(crate) struct DeliveryCounter<'a> {
    sink: &'a mut (dyn FnMut(Vec<Event>) + Send),
    batches: usize,
    events: usize,
}

impl<'a> DeliveryCounter<'a> {
    pub(crate) fn new(sink: &'a mut (dyn FnMut(Vec<Event>) + Send)) -> Self {
        Self {
            sink,
            batches: 0,
            events: 0,
        }
    }

    pub(crate) fn deliver(&mut self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        self.batches += 1;
        self.events += events.len();
        (self.sink)(events);
    }

    pub(crate) fn finish(self, origin: DeliveryOrigin) -> Delivery {
        let origin = if self.batches == 0 { DeliveryOrigin::Empty } else { origin };
        Delivery {
            origin,
            batches: self.batches,
            events: self.events,
        }
    }
}

/// Point-in-time view of a provider, for the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProviderStatus {
    pub mode: &'static str,
    pub state: Option<CacheStatus>,
    pub events: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    /// Cycles started by this process
    pub cycles_started: u64,
}

/// Anything that can hand out the current event set, streamed in batches.
///
/// Implementations never fail: faults are logged and degrade to stale or
/// empty data. The call returns once everything for this caller was delivered.
#[async_trait]
pub trait EventProvider: Send + Sync {
    async fn get_events(&self, sink: &mut (dyn FnMut(Vec<Event>) + Send)) -> Delivery;

    async fn status(&self) -> ProviderStatus {
        ProviderStatus::default()
    }
}
