//! One submodule per storefront.
//!
//! Each exposes `crawl(headless)` returning the normalized records
//! for its beer category page, plus a pure `collect(html, crawl_date)`
//! that does the DOM extraction and can run against saved pages.

pub mod bhx;
pub mod coop;
pub mod kingfood;
pub mod lotte;
pub mod mega;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use scraper::ElementRef;
use url::Url;

use crate::browser::Session;
use crate::fetcher;
use crate::models::{ProductRecord, Source};

/// Runs the crawler behind `source`.
pub fn crawl_source(source: Source, headless: bool) -> Result<Vec<ProductRecord>> {
    match source {
        Source::Bhx => bhx::crawl(headless),
        Source::Mega => mega::crawl(headless),
        Source::Lotte => lotte::crawl(headless),
        Source::Kingfood => kingfood::crawl(headless),
        Source::Coop => coop::crawl(headless),
        Source::BhxApi => fetcher::crawl_api(),
    }
}

/// Visible text of an element: text nodes joined and whitespace
/// collapsed, close to what a browser would report.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves `href` against `base`; absolute links pass through.
pub(crate) fn absolute_url(base: &str, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    Url::parse(base)
        .ok()
        .and_then(|parsed| parsed.join(href).ok())
        .map(|joined| joined.to_string())
        .unwrap_or_else(|| href.to_string())
}

/// Keeps trying [`Session::click_with_text`] until it lands or the
/// window runs out. Load-more buttons appear a beat after the grid.
pub(crate) fn click_with_text_within(
    session: &Session,
    css: &str,
    needle: &str,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if session.click_with_text(css, needle) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(500));
    }
}
