// Pure listing parsers: rendered HTML in, events out.
// They never touch the browser so they can be tested against fixture HTML.

pub mod billetto;
pub mod rockefeller;

pub use billetto::parse_listing as parse_billetto_listing;
pub use rockefeller::parse_listing as parse_rockefeller_listing;
