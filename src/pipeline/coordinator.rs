use crate::apis::Extractor;
use crate::observability::metrics;
use crate::pipeline::sink::{BatchSink, CycleMessage};
use crate::types::{CycleReport, SourceBatch, SourceReport, SourceStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

const ABORTED: &str = "extractor task aborted";

/// Runs all configured extractors concurrently and merges their batches.
pub struct ScrapeCoordinator {
    extractors: Vec<Arc<dyn Extractor>>,
    cycle_timeout: Option<Duration>,
}

impl ScrapeCoordinator {
    pub fn new(extractors: Vec<Arc<dyn Extractor>>, cycle_timeout: Option<Duration>) -> Self {
        Self {
            extractors,
            cycle_timeout,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.source().to_string()).collect()
    }

    /// One scrape cycle. Every batch is handed to `on_batch` as it arrives.
    ///
    /// Extractor failures are absorbed into the per-source reports. When the
    /// cycle timeout fires, unfinished sources are reported `TimedOut` and
    /// keep running detached until they close their own sessions.
    pub async fn run_cycle(&self, on_batch: &mut (dyn FnMut(&SourceBatch) + Send)) -> CycleReport {
        let started_at = Utc::now();
        let cycle_start = Instant::now();
        let deadline = self.cycle_timeout.map(|t| cycle_start + t);
        info!("Starting scrape cycle for {} sources", self.extractors.len());

        let (tx, mut rx) = mpsc::unbounded_channel();
        for extractor in &self.extractors {
            let extractor = extractor.clone();
            let sink = BatchSink::new(extractor.source(), tx.clone());
            tokio::spawn(async move {
                let start = Instant::now();
                let status = extractor.run(&sink).await;
                sink.finish(SourceReport {
                    source: sink.source().to_string(),
                    status,
                    batches: sink.batches_pushed(),
                    events: sink.events_pushed(),
                    elapsed: start.elapsed(),
                });
            });
        }
        drop(tx);

        let mut events = Vec::new();
        let mut finished: HashMap<String, SourceReport> = HashMap::new();
        let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
        let mut timed_out = false;

        loop {
            let message = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(message) => message,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                },
                None => rx.recv().await,
            };
            match message {
                Some(CycleMessage::Batch(batch)) => {
                    let counts = seen.entry(batch.source.clone()).or_default();
                    counts.0 += 1;
                    counts.1 += batch.events.len();
                    on_batch(&batch);
                    events.extend(batch.events);
                }
                Some(CycleMessage::Finished(report)) => {
                    finished.insert(report.source.clone(), report);
                }
                None => break,
            }
        }
        drop(rx);

        let elapsed = cycle_start.elapsed();
        let sources: Vec<SourceReport> = self
            .source_names()
            .into_iter()
            .map(|source| {
                if let Some(report) = finished.remove(&source) {
                    return report;
                }
                let (batches, count) = seen.get(&source).copied().unwrap_or_default();
                let status = if timed_out {
                    warn!(source = %source, "Source still running at cycle timeout");
                    SourceStatus::TimedOut
                } else {
                    warn!(source = %source, "Extractor task ended without a report");
                    SourceStatus::Failed(ABORTED.to_string())
                };
                SourceReport {
                    source,
                    status,
                    batches,
                    events: count,
                    elapsed,
                }
            })
            .collect();

        for report in &sources {
            metrics::sources::outcome(report);
            info!(
                source = %report.source,
                status = report.status.label(),
                "{} events in {} batches ({:.1}s)",
                report.events,
                report.batches,
                report.elapsed.as_secs_f64()
            );
        }

        CycleReport {
            events,
            sources,
            started_at,
            finished_at: Utc::now(),
            timed_out,
        }
    }
}
