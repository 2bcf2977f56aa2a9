use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One listing for a happening at a venue, as scraped from a source.
///
/// `date` is kept as the free text the source shows; parsing it is left to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub url: String,
    pub title: String,
    pub venue: String,
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub ticket_status: TicketStatus,
    pub source: String,
    pub city: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Events without a title, URL or source are never emitted
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty() && !self.url.trim().is_empty() && !self.source.is_empty()
    }
}

/// Ticket availability derived from the button/label text on the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketStatus {
    Available,
    #[serde(rename = "Sold Out")]
    SoldOut,
    #[serde(rename = "Few Tickets")]
    FewTickets,
    Free,
    Cancelled,
    Info,
}

impl TicketStatus {
    /// Map Norwegian ticket button text to a status.
    /// "få billetter" has to be checked before the plain "billett" match.
    pub fn from_label(label: Option<&str>) -> Self {
        let text = match label {
            Some(t) => t.trim().to_lowercase(),
            None => return TicketStatus::Info,
        };
        if text.is_empty() {
            TicketStatus::Info
        } else if text.contains("utsolgt") {
            TicketStatus::SoldOut
        } else if text.contains("avlyst") {
            TicketStatus::Cancelled
        } else if text.contains("få billetter") {
            TicketStatus::FewTickets
        } else if text.contains("gratis") {
            TicketStatus::Free
        } else if text.contains("billett") {
            TicketStatus::Available
        } else {
            TicketStatus::Info
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketStatus::Available => "Available",
            TicketStatus::SoldOut => "Sold Out",
            TicketStatus::FewTickets => "Few Tickets",
            TicketStatus::Free => "Free",
            TicketStatus::Cancelled => "Cancelled",
            TicketStatus::Info => "Info",
        };
        f.write_str(s)
    }
}

/// A partial list of events pushed by one source before its run completes
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source: String,
    pub events: Vec<Event>,
}

/// Terminal state of one extractor within a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Completed,
    Failed(String),
    TimedOut,
}

impl SourceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Completed => "completed",
            SourceStatus::Failed(_) => "failed",
            SourceStatus::TimedOut => "timed_out",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, SourceStatus::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub status: SourceStatus,
    pub batches: usize,
    pub events: usize,
    pub elapsed: Duration,
}

/// Everything one scrape cycle produced
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub events: Vec<Event>,
    pub sources: Vec<SourceReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub timed_out: bool,
}

impl CycleReport {
    /// Whether this cycle's output may replace the cached set.
    /// Only a cycle where no source completed leaves the previous set in place;
    /// timed-out sources count as failed ones.
    pub fn is_committable(&self) -> bool {
        self.sources.is_empty() || self.sources.iter().any(|s| !s.status.is_failure())
    }

    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| s.status.is_failure()).count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }
}
