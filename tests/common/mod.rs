#![allow(dead_code)]

use async_trait::async_trait;
use oslo_events::apis::Extractor;
use oslo_events::browser::{BrowserLauncher, Page};
use oslo_events::error::{Result, ScraperError};
use oslo_events::html::{element_text, parse_selector};
use oslo_events::pipeline::BatchSink;
use oslo_events::types::{Event, SourceStatus, TicketStatus};
use scraper::Html;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn event(source: &str, n: usize) -> Event {
    Event {
        id: format!("{source}-{n}"),
        url: format!("https://example.no/{source}/{n}"),
        title: format!("{source} event {n}"),
        venue: "Sentrum Scene".into(),
        date: Some("fre 21. nov".into()),
        image_url: None,
        description: None,
        ticket_status: TicketStatus::Available,
        source: source.into(),
        city: "Oslo".into(),
        country: "Norway".into(),
        scraped_at: None,
    }
}

/// How a fixture page moves to its next HTML stage
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    OnScroll,
    OnClick,
}

#[derive(Default)]
pub struct PageCounters {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub clicks: AtomicUsize,
    pub text_clicks: AtomicUsize,
    pub scrolled_into_view: AtomicUsize,
}

/// A page that serves a fixed sequence of HTML documents
pub struct FixturePage {
    stages: Arc<Vec<String>>,
    stage: usize,
    advance: Advance,
    url: String,
    counters: Arc<PageCounters>,
}

impl FixturePage {
    fn html(&self) -> Html {
        Html::parse_document(&self.stages[self.stage])
    }

    fn next_stage(&mut self) {
        if self.stage + 1 < self.stages.len() {
            self.stage += 1;
        }
    }
}

#[async_trait]
impl Page for FixturePage {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.url = url.to_string();
        self.stage = 0;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(format!("{}?page={}", self.url, self.stage + 1))
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let selector = parse_selector(selector)?;
        Ok(self.html().select(&selector).count())
    }

    async fn scroll_by_viewport(&mut self) -> Result<()> {
        if self.advance == Advance::OnScroll {
            self.next_stage();
        }
        Ok(())
    }

    async fn scroll_into_view(&mut self, selector: &str, index: usize) -> Result<()> {
        if index >= self.count(selector).await? {
            return Err(ScraperError::Browser(format!("no element {index} for '{selector}'")));
        }
        self.counters.scrolled_into_view.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        if self.count(selector).await? == 0 {
            return Ok(false);
        }
        self.counters.clicks.fetch_add(1, Ordering::SeqCst);
        if self.advance == Advance::OnClick {
            self.next_stage();
        }
        Ok(true)
    }

    async fn click_with_text(&mut self, selector: &str, text: &str) -> Result<bool> {
        let selector = parse_selector(selector)?;
        let needle = text.to_lowercase();
        let found = self
            .html()
            .select(&selector)
            .any(|el| element_text(&el).is_some_and(|t| t.to_lowercase().contains(&needle)));
        if found {
            self.counters.text_clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.stages[self.stage].clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FixtureLauncher {
    stages: Arc<Vec<String>>,
    advance: Advance,
    fail_launch: bool,
    pub counters: Arc<PageCounters>,
}

impl FixtureLauncher {
    pub fn new(stages: Vec<String>, advance: Advance) -> Self {
        Self {
            stages: Arc::new(stages),
            advance,
            fail_launch: false,
            counters: Arc::new(PageCounters::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(vec![String::new()], Advance::OnScroll)
        }
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FixtureLauncher {
    fn backend_name(&self) -> &'static str {
        "fixture"
    }

    async fn launch(&self) -> Result<Box<dyn Page>> {
        if self.fail_launch {
            return Err(ScraperError::Browser("chromedriver not reachable".into()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixturePage {
            stages: self.stages.clone(),
            stage: 0,
            advance: self.advance,
            url: String::new(),
            counters: self.counters.clone(),
        }))
    }
}

/// Extractor that pushes numbered single-event batches at a fixed pace
pub struct ScriptedExtractor {
    pub name: &'static str,
    pub batches: usize,
    pub delay: Duration,
    pub fail: bool,
    pub runs: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn new(name: &'static str, batches: usize, delay: Duration) -> Self {
        Self {
            name,
            batches,
            delay,
            fail: false,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &'static str, batches: usize, delay: Duration) -> Self {
        Self {
            fail: true,
            ..Self::new(name, batches, delay)
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn source(&self) -> &str {
        self.name
    }

    async fn run(&self, sink: &BatchSink) -> SourceStatus {
        let run = self.runs.fetch_add(1, Ordering::SeqCst);
        for n in 0..self.batches {
            tokio::time::sleep(self.delay).await;
            let mut event = event(self.name, n);
            event.title = format!("{} event {} (run {})", self.name, n, run);
            sink.push(vec![event]);
        }
        if self.fail {
            SourceStatus::Failed("page never rendered".into())
        } else {
            SourceStatus::Completed
        }
    }
}
