pub mod base;
pub mod factory;
pub mod parsers;

// Site scrapers
pub mod billetto;
pub mod rockefeller;

pub use base::{BrowserExtractor, Extractor, SiteScraper};
pub use factory::{create_extractor, create_extractors, supported_sources};
