use crate::apis::base::SiteScraper;
use crate::apis::parsers::rockefeller::{parse_listing, CARD_SELECTOR, FIRST_CARD_SELECTOR};
use crate::browser::Page;
use crate::config::RockefellerSettings;
use crate::constants::ROCKEFELLER_SOURCE;
use crate::error::Result;
use crate::pipeline::sink::BatchSink;
use crate::types::Event;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Rockefeller's program page loads more cards as the window scrolls.
///
/// Scrolling stops once a pass adds no new cards or `max_scrolls` is reached.
/// Listings are pushed as soon as they show up.
pub struct RockefellerScraper {
    settings: RockefellerSettings,
}

impl RockefellerScraper {
    pub fn new(settings: RockefellerSettings) -> Self {
        Self { settings }
    }

    /// Parse the current DOM and push listings not seen earlier in this run
    async fn emit_new(
        &self,
        page: &mut dyn Page,
        sink: &BatchSink,
        seen: &mut HashSet<String>,
    ) -> Result<usize> {
        let html = page.content().await?;
        let events = parse_listing(&html, &self.settings.url, Utc::now())?;
        let fresh: Vec<Event> = events.into_iter().filter(|e| seen.insert(e.id.clone())).collect();
        if fresh.is_empty() {
            return Ok(0);
        }
        Ok(sink.push(fresh))
    }

    /// Bring each card into view so lazy images get a real src
    async fn materialize_images(&self, page: &mut dyn Page, cards: usize) {
        for index in 0..cards {
            if let Err(e) = page.scroll_into_view(CARD_SELECTOR, index).await {
                debug!("Could not scroll card {} into view: {}", index, e);
            }
            page.pause(self.settings.image_settle()).await;
        }
    }
}

#[async_trait::async_trait]
impl SiteScraper for RockefellerScraper {
    fn source_name(&self) -> &'static str {
        ROCKEFELLER_SOURCE
    }

    fn start_url(&self) -> &str {
        &self.settings.url
    }

    #[instrument(skip(self, page, sink))]
    async fn scrape(&self, page: &mut dyn Page, sink: &BatchSink) -> Result<()> {
        info!("Opening {}", self.settings.url);
        page.goto(self.start_url()).await?;
        page.wait_for(FIRST_CARD_SELECTOR, self.settings.wait_timeout()).await?;

        let mut seen = HashSet::new();
        let mut last_count = 0usize;
        for pass in 0..self.settings.max_scrolls {
            let count = page.count(CARD_SELECTOR).await?;
            if pass > 0 && count <= last_count {
                debug!("Card count settled at {} after {} scrolls", count, pass);
                break;
            }
            if count > last_count {
                let pushed = self.emit_new(page, sink, &mut seen).await?;
                debug!("Pass {}: {} cards, {} new listings pushed", pass, count, pushed);
                last_count = count;
            }
            page.scroll_by_viewport().await?;
            page.pause(self.settings.scroll_settle()).await;
        }

        if self.settings.materialize_images {
            let cards = page.count(CARD_SELECTOR).await?;
            self.materialize_images(page, cards).await;
        }

        // Cards revealed by the last scroll
        let pushed = self.emit_new(page, sink, &mut seen).await?;
        info!("Rockefeller: {} listings total, {} in final pass", seen.len(), pushed);
        Ok(())
    }
}
