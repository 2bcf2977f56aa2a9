//! Headless browser sessions.
//!
//! Extractors drive a [`Page`] and never see the backend behind it. Every
//! [`BrowserLauncher::launch`] call hands out a fresh session that the caller
//! owns exclusively and must [`Page::close`].

pub mod static_page;
pub mod webdriver;

use crate::config::{BrowserBackend, BrowserConfig};
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use static_page::{StaticLauncher, StaticPage};
pub use webdriver::{WebDriverLauncher, WebDriverPage};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait Page: Send {
    /// Navigate to `url` and wait for the document to load
    async fn goto(&mut self, url: &str) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Number of elements currently matching a CSS selector
    async fn count(&mut self, selector: &str) -> Result<usize>;

    /// Wait until at least one element matches `selector`, bounded by `timeout`
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(selector).await? > 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScraperError::timeout(format!("selector '{selector}'"), timeout));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Scroll the window down by one viewport height
    async fn scroll_by_viewport(&mut self) -> Result<()>;

    /// Scroll the `index`-th element matching `selector` into view
    async fn scroll_into_view(&mut self, selector: &str, index: usize) -> Result<()>;

    /// Click the first element matching `selector`. Returns false when nothing matched.
    async fn click(&mut self, selector: &str) -> Result<bool>;

    /// Click the first element matching `selector` whose text contains `text` (case-insensitive)
    async fn click_with_text(&mut self, selector: &str, text: &str) -> Result<bool>;

    async fn pause(&mut self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    /// The rendered DOM as HTML
    async fn content(&mut self) -> Result<String>;

    /// Tear the session down
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn launch(&self) -> Result<Box<dyn Page>>;
}

/// Build the launcher selected in configuration
pub fn create_launcher(config: &BrowserConfig) -> Result<Arc<dyn BrowserLauncher>> {
    let launcher: Arc<dyn BrowserLauncher> = match config.backend {
        BrowserBackend::Webdriver => Arc::new(WebDriverLauncher::new(config)?),
        BrowserBackend::Static => Arc::new(StaticLauncher::new(config)?),
    };
    Ok(launcher)
}
