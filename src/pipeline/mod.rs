// Scrape pipeline: extractors push batches into sinks, the coordinator merges them

pub mod coordinator;
pub mod sink;

pub use coordinator::ScrapeCoordinator;
pub use sink::{BatchSink, CycleMessage};
