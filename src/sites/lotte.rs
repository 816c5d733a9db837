//! Lotte Mart beer category crawler.
//!
//! Lotte marks its tiles up with schema.org microdata and keeps the
//! article code inside the product slug, between the last dash and the
//! "-p<listing id>" suffix.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::browser::Session;
use crate::models::{ProductRecord, RawProduct, Source};
use crate::parser::{self, AssembleOptions};
use crate::sites::{absolute_url, element_text};

const LOTTE_URL: &str = "https://www.lottemart.vn/vi-nsg/category/bia-c123";

const LIST_CSS: &str = "div.proudct-list";

static ITEM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.proudct-list div.item[itemtype='https://schema.org/Product']").unwrap()
});
static NAME_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.field-name[itemprop='name'] a").unwrap());
static PRICE_SPAN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.field-price span[itemprop='price']").unwrap());
static PRICE_DIV: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.field-price[itemprop='price']").unwrap());
static PRICE_OLD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.field-price-old").unwrap());
static DISCOUNT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.field-price span.lbl-discount").unwrap());
static MORE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.field-more").unwrap());

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: true,
    assume_single_can_below: None,
};

pub fn crawl(headless: bool) -> Result<Vec<ProductRecord>> {
    info!("starting the Lotte Mart crawler");
    let session = Session::launch(headless)?;
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();

    session.goto(LOTTE_URL)?;
    if session.wait_for(LIST_CSS, Duration::from_secs(30)) {
        info!("Lotte: product list container found");
    } else {
        warn!("Lotte: product list container not found within the wait window");
    }

    scroll_full_page(&session, Duration::from_secs(60), Duration::from_secs(5));

    let html = session.page_html()?;
    let records = collect(&html, &crawl_date);
    info!("Lotte crawl finished, {} products", records.len());
    Ok(records)
}

/// Scrolls to the bottom and bounces back up a third of a viewport
/// until the page height settles or `total` runs out.
fn scroll_full_page(session: &Session, total: Duration, interval: Duration) {
    let deadline = std::time::Instant::now() + total;
    let mut last_height = session.scroll_height();

    while std::time::Instant::now() < deadline {
        let _ = session.eval("window.scrollTo(0, document.body.scrollHeight);");
        std::thread::sleep(interval / 2);

        let _ = session.eval("window.scrollBy(0, -Math.floor(window.innerHeight * 0.3));");
        std::thread::sleep(interval / 2);

        let height = session.scroll_height();
        if height == last_height {
            info!("Lotte: page height did not change further, stop scrolling");
            break;
        }
        last_height = height;
    }
}

/// Article code from a product slug:
/// "thung-24-...-18935012413328-p10826" gives "18935012413328".
fn code_from_href(href: &str) -> String {
    let Some(path) = href.split('/').next_back() else {
        return String::new();
    };
    let before_p = path.split_once("-p").map_or(path, |(before, _)| before);
    before_p.rsplit('-').next().unwrap_or_default().trim().to_string()
}

/// Extracts all product tiles from a rendered category page.
pub fn collect(html: &str, crawl_date: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for element in document.select(&ITEM) {
        let (name, href) = element
            .select(&NAME_LINK)
            .next()
            .map(|link| {
                (element_text(&link), link.value().attr("href").unwrap_or_default().to_string())
            })
            .unwrap_or_default();
        let url = absolute_url(LOTTE_URL, &href);
        let code = if href.is_empty() { String::new() } else { code_from_href(&href) };

        let price_after_text = element
            .select(&PRICE_SPAN)
            .next()
            .or_else(|| element.select(&PRICE_DIV).next())
            .map(|price| element_text(&price))
            .unwrap_or_default();
        let price_original_text =
            element.select(&PRICE_OLD).next().map(|old| element_text(&old)).unwrap_or_default();

        // Promotion text is the badge plus the conditions block; the
        // conditions also double as the note.
        let mut promo_parts: Vec<String> = Vec::new();
        if let Some(discount) = element.select(&DISCOUNT).next() {
            let text = element_text(&discount);
            if !text.is_empty() {
                promo_parts.push(text);
            }
        }
        let mut note = String::new();
        if let Some(more) = element.select(&MORE).next() {
            let text = element_text(&more);
            if !text.is_empty() {
                note = text.clone();
                promo_parts.push(text);
            }
        }

        let raw = RawProduct {
            code,
            name,
            url,
            price_after: parser::extract_price_int(&price_after_text),
            price_original: parser::extract_price_int(&price_original_text),
            promo_text: promo_parts.join(" "),
            note,
            ..RawProduct::default()
        };
        records.push(parser::assemble(Source::Lotte, raw, crawl_date, OPTIONS));
    }

    info!("found {} Lotte product items", records.len());
    records
}
