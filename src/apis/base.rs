use crate::browser::{BrowserLauncher, Page};
use crate::error::Result;
use crate::pipeline::sink::BatchSink;
use crate::types::SourceStatus;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// One external source as seen by the coordinator.
///
/// `run` always resolves: failures are logged and reported through the
/// returned status, batches already pushed stay pushed.
#[async_trait::async_trait]
pub trait Extractor: Send + Sync {
    /// Source name used in reports and metrics
    fn source(&self) -> &str;

    async fn run(&self, sink: &BatchSink) -> SourceStatus;
}

/// Site-specific navigation and extraction, driven on a page the caller owns
#[async_trait::async_trait]
pub trait SiteScraper: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// First page the scrape navigates to
    fn start_url(&self) -> &str;

    async fn scrape(&self, page: &mut dyn Page, sink: &BatchSink) -> Result<()>;
}

/// Extractor that opens a browser session per run and always closes it again
pub struct BrowserExtractor {
    launcher: Arc<dyn BrowserLauncher>,
    site: Box<dyn SiteScraper>,
}

impl BrowserExtractor {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, site: Box<dyn SiteScraper>) -> Self {
        Self { launcher, site }
    }
}

#[async_trait::async_trait]
impl Extractor for BrowserExtractor {
    fn source(&self) -> &str {
        self.site.source_name()
    }

    #[instrument(skip(self, sink), fields(source = %self.site.source_name(), backend = self.launcher.backend_name()))]
    async fn run(&self, sink: &BatchSink) -> SourceStatus {
        info!("Launching browser session for {}", self.site.start_url());
        let mut page = match self.launcher.launch().await {
            Ok(page) => page,
            Err(e) => {
                error!("Failed to launch browser session: {}", e);
                return SourceStatus::Failed(e.to_string());
            }
        };

        let result = self.site.scrape(page.as_mut(), sink).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close browser session: {}", e);
        } else {
            info!("Browser session closed");
        }

        match result {
            Ok(()) => {
                info!(
                    "Finished with {} events in {} batches",
                    sink.events_pushed(),
                    sink.batches_pushed()
                );
                SourceStatus::Completed
            }
            Err(e) => {
                error!(
                    "Scrape failed after pushing {} events: {}",
                    sink.events_pushed(),
                    e
                );
                SourceStatus::Failed(e.to_string())
            }
        }
    }
}
