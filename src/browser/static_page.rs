//! Plain-HTTP page backend: fetches server-rendered HTML, runs no scripts.
//!
//! Scrolling does nothing, so lazy lists stop growing after the first pass.
//! Clicks only work on elements carrying an `href`.

use super::{BrowserLauncher, Page};
use crate::config::BrowserConfig;
use crate::error::{Result, ScraperError};
use crate::html::{element_text, parse_selector, resolve_url};
use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use tracing::debug;

pub struct StaticLauncher {
    client: Client,
}

impl StaticLauncher {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BrowserLauncher for StaticLauncher {
    fn backend_name(&self) -> &'static str {
        "static"
    }

    async fn launch(&self) -> Result<Box<dyn Page>> {
        Ok(Box::new(StaticPage::new(self.client.clone())))
    }
}

pub struct StaticPage {
    client: Client,
    url: Option<String>,
    html: String,
}

impl StaticPage {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            url: None,
            html: String::new(),
        }
    }

    /// Href of the first element matching `selector` (and containing `text`, if given)
    fn find_href(&self, selector: &str, text: Option<&str>) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        let needle = text.map(str::to_lowercase);
        let href = document
            .select(&selector)
            .find(|el| match &needle {
                Some(n) => element_text(el).map(|t| t.to_lowercase().contains(n)).unwrap_or(false),
                None => true,
            })
            .and_then(|el| el.value().attr("href").map(str::to_string));
        Ok(href)
    }

    async fn follow(&mut self, href: Option<String>) -> Result<bool> {
        let base = self.url.clone().unwrap_or_default();
        match href.and_then(|h| resolve_url(&base, &h)) {
            Some(target) => {
                self.goto(&target).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Page for StaticPage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::Api {
                message: format!("GET {url} returned {status}"),
            });
        }
        let final_url = response.url().to_string();
        self.html = response.text().await?;
        self.url = Some(final_url);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.url
            .clone()
            .ok_or_else(|| ScraperError::Browser("no page loaded".into()))
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        let count = document.select(&selector).count();
        Ok(count)
    }

    async fn scroll_by_viewport(&mut self) -> Result<()> {
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str, index: usize) -> Result<()> {
        if self.count(selector).await? > index {
            Ok(())
        } else {
            Err(ScraperError::Browser(format!("no element #{index} for '{selector}'")))
        }
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let href = self.find_href(selector, None)?;
        self.follow(href).await
    }

    async fn click_with_text(&mut self, selector: &str, text: &str) -> Result<bool> {
        let href = self.find_href(selector, Some(text))?;
        self.follow(href).await
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
