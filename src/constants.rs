/// Source name constants to ensure consistency across the codebase.
/// The config/CLI names are lower-case; the display names end up in `Event::source`.

// Config/CLI names
pub const ROCKEFELLER_SOURCE: &str = "rockefeller";
pub const BILLETTO_SOURCE: &str = "billetto";

// Display names written into every event
pub const ROCKEFELLER_DISPLAY_NAME: &str = "Rockefeller";
pub const BILLETTO_DISPLAY_NAME: &str = "Billetto";

// Listing pages
pub const ROCKEFELLER_BASE_URL: &str = "https://www.rockefeller.no";
pub const BILLETTO_OSLO_URL: &str = "https://billetto.no/c/oslo-l";

// Static location for the current sources
pub const DEFAULT_CITY: &str = "Oslo";
pub const DEFAULT_COUNTRY: &str = "Norway";
pub const UNKNOWN_VENUE: &str = "Unknown Venue";

// Keys in the shared cache store
pub const EVENTS_CACHE_KEY: &str = "events:oslo";
pub const EVENTS_LEASE_KEY: &str = "lock:events:oslo";

pub const DESKTOP_CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Map a config/CLI source name to the display name used in events
pub fn source_display_name(source: &str) -> Option<&'static str> {
    match source {
        ROCKEFELLER_SOURCE => Some(ROCKEFELLER_DISPLAY_NAME),
        BILLETTO_SOURCE => Some(BILLETTO_DISPLAY_NAME),
        _ => None,
    }
}

/// Get all supported source names
pub fn get_supported_sources() -> Vec<&'static str> {
    vec![ROCKEFELLER_SOURCE, BILLETTO_SOURCE]
}
