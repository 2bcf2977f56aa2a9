use crate::constants::{BILLETTO_DISPLAY_NAME, DEFAULT_CITY, DEFAULT_COUNTRY, UNKNOWN_VENUE};
use crate::error::Result;
use crate::html::{child_attr, child_text, last_path_segment, parse_selector, resolve_url};
use crate::types::{Event, TicketStatus};
use chrono::{DateTime, Utc};
use scraper::Html;

pub const GRID_SELECTOR: &str = "div.grid.gap-4";
pub const CARD_SELECTOR: &str = "div.grid > a.space-y-2";
pub const NEXT_PAGE_SELECTOR: &str = "button[aria-label=\"Neste\"]:not([disabled])";

/// Extract the event cards on one Billetto result page.
///
/// Card links are resolved against `page_url`. Billetto only lists events
/// with tickets on sale, so every card is `Available`.
pub fn parse_listing(html: &str, page_url: &str, scraped_at: DateTime<Utc>) -> Result<Vec<Event>> {
    let card_selector = parse_selector(CARD_SELECTOR)?;
    let title_selector = parse_selector("p.font-medium > span")?;
    let date_selector = parse_selector("div[x-show=\"event.starts_at\"] span")?;
    let image_selector = parse_selector("img[loading=\"lazy\"]")?;
    let venue_selector = parse_selector("div[x-text=\"event.location\"]")?;

    let document = Html::parse_document(html);
    let events = document
        .select(&card_selector)
        .filter_map(|card| {
            let href = card.value().attr("href")?;
            let url = resolve_url(page_url, href)?;
            let slug = last_path_segment(&url)?;
            let title = child_text(&card, &title_selector)?;
            Some(Event {
                id: format!("billetto-{slug}"),
                url,
                title,
                venue: child_text(&card, &venue_selector).unwrap_or_else(|| UNKNOWN_VENUE.to_string()),
                date: child_text(&card, &date_selector),
                image_url: child_attr(&card, &image_selector, "src"),
                description: None,
                ticket_status: TicketStatus::Available,
                source: BILLETTO_DISPLAY_NAME.to_string(),
                city: DEFAULT_CITY.to_string(),
                country: DEFAULT_COUNTRY.to_string(),
                scraped_at: Some(scraped_at),
            })
        })
        .collect();
    Ok(events)
}
