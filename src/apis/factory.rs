use crate::apis::base::{BrowserExtractor, Extractor};
use crate::apis::billetto::BillettoScraper;
use crate::apis::rockefeller::RockefellerScraper;
use crate::browser::BrowserLauncher;
use crate::config::SourcesConfig;
use crate::constants::*;
use std::sync::Arc;
use tracing::warn;

/// Factory function to create an extractor for one configured source
pub fn create_extractor(
    source: &str,
    launcher: Arc<dyn BrowserLauncher>,
    sources: &SourcesConfig,
) -> Option<Arc<dyn Extractor>> {
    match source {
        ROCKEFELLER_SOURCE => Some(Arc::new(BrowserExtractor::new(
            launcher,
            Box::new(RockefellerScraper::new(sources.rockefeller.clone())),
        ))),
        BILLETTO_SOURCE => Some(Arc::new(BrowserExtractor::new(
            launcher,
            Box::new(BillettoScraper::new(sources.billetto.clone())),
        ))),
        _ => None,
    }
}

/// Extractors for every enabled source, in configuration order. Unknown names are skipped.
pub fn create_extractors(
    sources: &SourcesConfig,
    launcher: Arc<dyn BrowserLauncher>,
) -> Vec<Arc<dyn Extractor>> {
    sources
        .enabled
        .iter()
        .filter_map(|name| {
            let extractor = create_extractor(name, launcher.clone(), sources);
            if extractor.is_none() {
                warn!("Unknown source '{}' ignored", name);
            }
            extractor
        })
        .collect()
}

/// Get all supported source names
pub fn supported_sources() -> Vec<&'static str> {
    get_supported_sources()
}
