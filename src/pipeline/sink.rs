use crate::types::{Event, SourceBatch, SourceReport};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages flowing from extractor tasks back to the coordinator
#[derive(Debug)]
pub enum CycleMessage {
    Batch(SourceBatch),
    Finished(SourceReport),
}

/// Where an extractor pushes its batches. One sink per source per cycle.
///
/// Listings without a title or URL are dropped here, so nothing downstream
/// ever sees them. Empty batches are not forwarded.
pub struct BatchSink {
    source: String,
    tx: mpsc::UnboundedSender<CycleMessage>,
    batches: AtomicUsize,
    events: AtomicUsize,
}

impl BatchSink {
    pub fn new(source: impl Into<String>, tx: mpsc::UnboundedSender<CycleMessage>) -> Self {
        Self {
            source: source.into(),
            tx,
            batches: AtomicUsize::new(0),
            events: AtomicUsize::new(0),
        }
    }

    /// A sink plus the receiving end, for running an extractor on its own
    pub fn channel(source: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<CycleMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(source, tx), rx)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Forward a batch. Returns how many events were accepted.
    pub fn push(&self, events: Vec<Event>) -> usize {
        let total = events.len();
        let events: Vec<Event> = events.into_iter().filter(Event::is_valid).collect();
        if events.len() < total {
            debug!(
                source = %self.source,
                "Dropped {} listings without title or url",
                total - events.len()
            );
        }
        if events.is_empty() {
            return 0;
        }

        let accepted = events.len();
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(accepted, Ordering::Relaxed);
        let batch = SourceBatch {
            source: self.source.clone(),
            events,
        };
        if self.tx.send(CycleMessage::Batch(batch)).is_err() {
            debug!(source = %self.source, "Cycle no longer listening, batch discarded");
        }
        accepted
    }

    pub fn batches_pushed(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn events_pushed(&self) -> usize {
        self.events.load(Ordering::Relaxed)
    }

    pub(crate) fn finish(&self, report: SourceReport) {
        let _ = self.tx.send(CycleMessage::Finished(report));
    }
}
