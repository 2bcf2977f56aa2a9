use crate::constants::{DEFAULT_CITY, DEFAULT_COUNTRY, ROCKEFELLER_DISPLAY_NAME, UNKNOWN_VENUE};
use crate::error::Result;
use crate::html::{child_attr, child_text, last_path_segment, parse_selector, resolve_url};
use crate::types::{Event, TicketStatus};
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::debug;

pub const CARD_SELECTOR: &str = "ul.grid-cols-1 > li";
pub const FIRST_CARD_SELECTOR: &str = "ul.grid-cols-1 > li:first-child";

struct CardSelectors {
    card: Selector,
    link: Selector,
    title: Selector,
    date: Selector,
    venue: Selector,
    description: Selector,
    image: Selector,
    ticket_button: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            card: parse_selector(CARD_SELECTOR)?,
            link: parse_selector("a[href]")?,
            title: parse_selector("div.font-bold.font-heading")?,
            date: parse_selector("div.shrink-0")?,
            venue: parse_selector("div.font-auditorium.text-sm.font-light")?,
            description: parse_selector("div.group-hover\\:italic")?,
            image: parse_selector("img[src]")?,
            ticket_button: parse_selector("button[role=\"link\"]")?,
        })
    }
}

/// Extract every listing card on the Rockefeller program page.
///
/// Cards without a link or title are skipped.
pub fn parse_listing(html: &str, base_url: &str, scraped_at: DateTime<Utc>) -> Result<Vec<Event>> {
    let selectors = CardSelectors::new()?;
    let document = Html::parse_document(html);

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for card in document.select(&selectors.card) {
        let Some(href) = child_attr(&card, &selectors.link, "href") else {
            skipped += 1;
            continue;
        };
        let (Some(url), Some(slug)) = (resolve_url(base_url, &href), last_path_segment(&href)) else {
            skipped += 1;
            continue;
        };
        let Some(title) = child_text(&card, &selectors.title) else {
            skipped += 1;
            continue;
        };

        let ticket_label = child_text(&card, &selectors.ticket_button);
        events.push(Event {
            id: format!("rockefeller-{slug}"),
            url,
            title,
            venue: child_text(&card, &selectors.venue).unwrap_or_else(|| UNKNOWN_VENUE.to_string()),
            date: child_text(&card, &selectors.date),
            image_url: child_attr(&card, &selectors.image, "src"),
            description: child_text(&card, &selectors.description),
            ticket_status: TicketStatus::from_label(ticket_label.as_deref()),
            source: ROCKEFELLER_DISPLAY_NAME.to_string(),
            city: DEFAULT_CITY.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            scraped_at: Some(scraped_at),
        });
    }

    if skipped > 0 {
        debug!("Rockefeller: skipped {} cards missing link or title", skipped);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
    <html><body>
      <ul class="grid grid-cols-1 gap-4">
        <li>
          <a href="/program/kaizers-orchestra-2025">
            <img src="https://cdn.rockefeller.no/kaizers.jpg" />
            <div class="shrink-0">fre 14. nov</div>
            <div class="font-bold font-heading">  Kaizers
              Orchestra </div>
            <div class="font-auditorium text-sm font-light">Rockefeller</div>
            <div class="group-hover:italic">Utsolgt to kvelder på rad</div>
          </a>
          <button role="link">Utsolgt</button>
        </li>
        <li>
          <a href="/program/jazzklubb">
            <div class="font-bold font-heading">Jazzklubb</div>
          </a>
          <button role="link">Få billetter</button>
        </li>
        <li>
          <div class="font-bold font-heading">No link here</div>
        </li>
        <li>
          <a href="/program/untitled"><div class="shrink-0">lør 15. nov</div></a>
        </li>
      </ul>
    </body></html>
    "#;

    #[test]
    fn test_parse_listing_extracts_cards() {
        let now = Utc::now();
        let events = parse_listing(FIXTURE, "https://www.rockefeller.no", now).unwrap();
        assert_eq!(events.len(), 2);

        let kaizers = &events[0];
        assert_eq!(kaizers.id, "rockefeller-kaizers-orchestra-2025");
        assert_eq!(kaizers.url, "https://www.rockefeller.no/program/kaizers-orchestra-2025");
        assert_eq!(kaizers.title, "Kaizers Orchestra");
        assert_eq!(kaizers.date.as_deref(), Some("fre 14. nov"));
        assert_eq!(kaizers.venue, "Rockefeller");
        assert_eq!(kaizers.description.as_deref(), Some("Utsolgt to kvelder på rad"));
        assert_eq!(kaizers.image_url.as_deref(), Some("https://cdn.rockefeller.no/kaizers.jpg"));
        assert_eq!(kaizers.ticket_status, TicketStatus::SoldOut);
        assert_eq!(kaizers.source, "Rockefeller");
        assert_eq!(kaizers.city, "Oslo");
        assert_eq!(kaizers.scraped_at, Some(now));

        let jazz = &events[1];
        assert_eq!(jazz.venue, UNKNOWN_VENUE);
        assert_eq!(jazz.date, None);
        assert_eq!(jazz.ticket_status, TicketStatus::FewTickets);
    }

    #[test]
    fn test_ids_are_stable_across_parses() {
        let first = parse_listing(FIXTURE, "https://www.rockefeller.no", Utc::now()).unwrap();
        let second = parse_listing(FIXTURE, "https://www.rockefeller.no/", Utc::now()).unwrap();
        let ids: Vec<_> = first.iter().map(|e| e.id.clone()).collect();
        let again: Vec<_> = second.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_unexpected_markup_yields_no_events() {
        let events = parse_listing("<div>redesigned</div>", "https://www.rockefeller.no", Utc::now()).unwrap();
        assert!(events.is_empty());
    }
}
