//! Metrics for the scrape/cache service
//!
//! Recording goes through the `metrics` facade; when no recorder is installed
//! (CLI runs, tests) every call is a no-op. `init()` installs a Prometheus
//! recorder whose handle backs the `/metrics` endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// All metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Cache
    CacheHits,
    CacheJoined,
    CacheBestEffort,
    CacheEmpty,
    CacheStoreErrors,

    // Cycles
    CyclesStarted,
    CyclesCommitted,
    CyclesDiscarded,
    CycleDuration,

    // Sources
    SourceOutcomes,
    SourceEvents,
    SourceDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CacheHits => "oslo_events_cache_hits_total",
            MetricName::CacheJoined => "oslo_events_cache_joined_total",
            MetricName::CacheBestEffort => "oslo_events_cache_best_effort_total",
            MetricName::CacheEmpty => "oslo_events_cache_empty_total",
            MetricName::CacheStoreErrors => "oslo_events_cache_store_errors_total",
            MetricName::CyclesStarted => "oslo_events_cycles_started_total",
            MetricName::CyclesCommitted => "oslo_events_cycles_committed_total",
            MetricName::CyclesDiscarded => "oslo_events_cycles_discarded_total",
            MetricName::CycleDuration => "oslo_events_cycle_duration_seconds",
            MetricName::SourceOutcomes => "oslo_events_source_outcomes_total",
            MetricName::SourceEvents => "oslo_events_source_events_total",
            MetricName::SourceDuration => "oslo_events_source_duration_seconds",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            MetricName::CacheHits => "Requests served from a fresh cache entry",
            MetricName::CacheJoined => "Requests attached to a cycle started by another caller",
            MetricName::CacheBestEffort => "Requests served stale data while another process held the lease",
            MetricName::CacheEmpty => "Requests that ended with no data at all",
            MetricName::CacheStoreErrors => "Failed reads/writes/lease calls against the shared store",
            MetricName::CyclesStarted => "Scrape cycles started",
            MetricName::CyclesCommitted => "Scrape cycles whose output replaced the cached set",
            MetricName::CyclesDiscarded => "Scrape cycles whose output was discarded",
            MetricName::CycleDuration => "Wall-clock duration of scrape cycles",
            MetricName::SourceOutcomes => "Terminal status of each source per cycle",
            MetricName::SourceEvents => "Events extracted per source",
            MetricName::SourceDuration => "Wall-clock duration of each source run",
        }
    }

    pub fn is_histogram(&self) -> bool {
        matches!(self, MetricName::CycleDuration | MetricName::SourceDuration)
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        [
            MetricName::CacheHits,
            MetricName::CacheJoined,
            MetricName::CacheBestEffort,
            MetricName::CacheEmpty,
            MetricName::CacheStoreErrors,
            MetricName::CyclesStarted,
            MetricName::CyclesCommitted,
            MetricName::CyclesDiscarded,
            MetricName::CycleDuration,
            MetricName::SourceOutcomes,
            MetricName::SourceEvents,
            MetricName::SourceDuration,
        ]
        .into_iter()
    }
}

/// Install the Prometheus recorder. Idempotent.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Prometheus handle already stored");
            }
            for name in MetricName::all_metrics() {
                if name.is_histogram() {
                    ::metrics::describe_histogram!(name.as_str(), name.help());
                } else {
                    ::metrics::describe_counter!(name.as_str(), name.help());
                }
            }
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Render the current metrics in Prometheus text format, if the recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Cache Metrics
// ============================================================================

pub mod cache {
    use super::MetricName;

    pub fn hit() {
        ::metrics::counter!(MetricName::CacheHits.as_str()).increment(1);
    }

    pub fn joined() {
        ::metrics::counter!(MetricName::CacheJoined.as_str()).increment(1);
    }

    pub fn best_effort() {
        ::metrics::counter!(MetricName::CacheBestEffort.as_str()).increment(1);
    }

    pub fn empty() {
        ::metrics::counter!(MetricName::CacheEmpty.as_str()).increment(1);
    }

    /// `op` is one of read, write, lease
    pub fn store_error(op: &'static str) {
        ::metrics::counter!(MetricName::CacheStoreErrors.as_str(), "op" => op).increment(1);
    }
}

// ============================================================================
// Cycle Metrics
// ============================================================================

pub mod cycle {
    use super::MetricName;

    pub fn started() {
        ::metrics::counter!(MetricName::CyclesStarted.as_str()).increment(1);
    }

    pub fn finished(committed: bool, secs: f64) {
        let name = if committed {
            MetricName::CyclesCommitted
        } else {
            MetricName::CyclesDiscarded
        };
        ::metrics::counter!(name.as_str()).increment(1);
        ::metrics::histogram!(MetricName::CycleDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Source Metrics
// ============================================================================

pub mod sources {
    use super::MetricName;
    use crate::types::SourceReport;

    pub fn outcome(report: &SourceReport) {
        ::metrics::counter!(
            MetricName::SourceOutcomes.as_str(),
            "source" => report.source.clone(),
            "status" => report.status.label()
        )
        .increment(1);
        ::metrics::counter!(MetricName::SourceEvents.as_str(), "source" => report.source.clone())
            .increment(report.events as u64);
        ::metrics::histogram!(MetricName::SourceDuration.as_str(), "source" => report.source.clone())
            .record(report.elapsed.as_secs_f64());
    }
}
