use crate::apis::base::SiteScraper;
use crate::apis::parsers::billetto::{parse_listing, GRID_SELECTOR, NEXT_PAGE_SELECTOR};
use crate::browser::Page;
use crate::config::BillettoSettings;
use crate::constants::BILLETTO_SOURCE;
use crate::error::Result;
use crate::pipeline::sink::BatchSink;
use crate::types::Event;
use chrono::Utc;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const COOKIE_BUTTON_TEXT: &str = "Accept all";
const COOKIE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Billetto's Oslo category, paginated through the "Neste" button.
/// One batch is pushed per result page.
pub struct BillettoScraper {
    settings: BillettoSettings,
}

impl BillettoScraper {
    pub fn new(settings: BillettoSettings) -> Self {
        Self { settings }
    }

    /// Dismiss the consent dialog if it shows up within the cookie timeout
    async fn accept_cookies(&self, page: &mut dyn Page) {
        let deadline = tokio::time::Instant::now() + self.settings.cookie_timeout();
        loop {
            match page.click_with_text("button", COOKIE_BUTTON_TEXT).await {
                Ok(true) => {
                    debug!("Accepted cookie dialog");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!("Cookie dialog check failed: {}", e);
                    return;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("No cookie dialog shown");
                return;
            }
            page.pause(COOKIE_POLL_INTERVAL).await;
        }
    }
}

#[async_trait::async_trait]
impl SiteScraper for BillettoScraper {
    fn source_name(&self) -> &'static str {
        BILLETTO_SOURCE
    }

    fn start_url(&self) -> &str {
        &self.settings.url
    }

    #[instrument(skip(self, page, sink))]
    async fn scrape(&self, page: &mut dyn Page, sink: &BatchSink) -> Result<()> {
        info!("Opening {}", self.settings.url);
        page.goto(self.start_url()).await?;
        self.accept_cookies(page).await;

        let mut seen = HashSet::new();
        for page_number in 1..=self.settings.max_pages {
            page.wait_for(GRID_SELECTOR, self.settings.wait_timeout()).await?;

            let page_url = page.current_url().await?;
            let html = page.content().await?;
            let events = parse_listing(&html, &page_url, Utc::now())?;
            let found = events.len();
            let fresh: Vec<Event> = events.into_iter().filter(|e| seen.insert(e.id.clone())).collect();
            let pushed = sink.push(fresh);
            info!("Page {}: {} listings, {} new", page_number, found, pushed);

            if page_number == self.settings.max_pages {
                break;
            }
            if !page.click(NEXT_PAGE_SELECTOR).await? {
                debug!("No next page after page {}", page_number);
                break;
            }
            page.pause(self.settings.page_settle()).await;
        }

        if seen.is_empty() {
            warn!("Billetto returned no listings");
        }
        Ok(())
    }
}
