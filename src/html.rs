//! Small helpers shared by the listing parsers and the static page backend.

use crate::error::{Result, ScraperError};
use scraper::{ElementRef, Selector};
use url::Url;

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::Api {
        message: format!("Invalid CSS selector '{css}': {e:?}"),
    })
}

/// Text content of an element with whitespace collapsed; None when blank
pub fn element_text(element: &ElementRef<'_>) -> Option<String> {
    let raw: String = element.text().collect();
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Text of the first descendant matching `selector`
pub fn child_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().and_then(|e| element_text(&e))
}

/// Non-blank attribute of the first descendant matching `selector`
pub fn child_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|e| e.value().attr(attr))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve a possibly relative link against the page it was found on
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string()),
    }
}

/// Last non-empty path segment of a URL, used to build stable event ids
pub fn last_path_segment(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    };
    path.split('/')
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}
