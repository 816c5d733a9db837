//! MM Mega Market beer category crawler.
//!
//! Mega paginates server-side, so the session scrolls each page until
//! its height settles, reads the grid, then clicks the next-page
//! button for up to fifty pages.

use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::Local;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::browser::Session;
use crate::models::{ProductRecord, RawProduct, Source};
use crate::parser::{self, AssembleOptions};
use crate::sites::{absolute_url, element_text};

const URL_MEGA_BEER: &str = "https://online.mmvietnam.com/category/bia.html";
const MAX_PAGES: u32 = 50;

const LIST_CSS: &str = "div.gallery-module__items___YTUpR";
const NEXT_BUTTON_CSS: &str = "button[aria-label='move to the next page']";

static LIST: LazyLock<Selector> = LazyLock::new(|| Selector::parse(LIST_CSS).unwrap());
static ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.item-module__root___hJBdd").unwrap());
static NAME: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.item-module__name___IP-3e").unwrap());
static LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.item-module__images___1Ucb1").unwrap());
static FINAL_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.item-module__finalPrice___zqAf5").unwrap());
static OLD_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.item-module__oldPrice___b-kvC").unwrap());
// The build hash after the double underscore changes between deploys,
// so these two match on the stable prefix only.
static DNR_INNER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[class^='item-module__dnrInner']").unwrap());
static DISCOUNT_BADGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[class^='item-module__discount']").unwrap());

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: false,
    assume_single_can_below: Some(40_000),
};

pub fn crawl(headless: bool) -> Result<Vec<ProductRecord>> {
    let session = Session::launch(headless)?;
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();

    session.goto(URL_MEGA_BEER)?;
    info!("Mega: waiting 5s for the initial load");
    thread::sleep(Duration::from_secs(5));

    let mut records = Vec::new();
    for page_index in 1..=MAX_PAGES {
        info!("Mega: processing page {page_index}");
        scroll_to_load_all(&session, Duration::from_secs(20), Duration::from_secs(5));

        if !session.wait_for(LIST_CSS, Duration::from_secs(30)) {
            bail!("Mega: product list never appeared on page {page_index}");
        }

        let html = session.page_html()?;
        let page_records = collect(&html, &crawl_date);
        info!("Mega: page {page_index} yielded {} products", page_records.len());
        records.extend(page_records);

        if !go_to_next_page(&session) {
            break;
        }
    }

    info!("Mega crawl finished, {} products", records.len());
    Ok(records)
}

/// Scrolls to the bottom every `interval` until the page height stops
/// growing or `total` runs out.
fn scroll_to_load_all(session: &Session, total: Duration, interval: Duration) {
    let mut last_height = session.scroll_height();
    let deadline = Instant::now() + total;

    while Instant::now() < deadline {
        let _ = session.eval("window.scrollTo(0, document.body.scrollHeight);");
        info!("Mega: scrolled to bottom, waiting {}s", interval.as_secs());
        thread::sleep(interval);

        let height = session.scroll_height();
        if height == last_height {
            info!("Mega: no more new content loaded, stop scrolling");
            break;
        }
        last_height = height;
    }
}

/// Clicks the next-page button. False when pagination is done.
fn go_to_next_page(session: &Session) -> bool {
    if !session.wait_for(NEXT_BUTTON_CSS, Duration::from_secs(10)) {
        info!("Mega: no next page button found, stop pagination");
        return false;
    }
    let clicked = session.eval_bool(
        r#"(() => {
            const button = document.querySelector("button[aria-label='move to the next page']");
            if (!button || button.disabled) return false;
            button.click();
            return true;
        })()"#,
    );
    if clicked {
        info!("Mega: clicked next page button");
        thread::sleep(Duration::from_secs(5));
    } else {
        info!("Mega: next page button present but not clickable, stop pagination");
    }
    clicked
}

/// Extracts all product cards from one rendered page.
pub fn collect(html: &str, crawl_date: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let Some(container) = document.select(&LIST).next() else {
        warn!("Mega: product list not found in the page");
        return Vec::new();
    };

    let mut records = Vec::new();
    for element in container.select(&ITEM) {
        let name = element.select(&NAME).next().map(|n| element_text(&n)).unwrap_or_default();
        let href = element
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let url = absolute_url(URL_MEGA_BEER, href);

        // The dnrInner strip holds either an article code such as
        // "DA53720045" or free-form text like a delivery note.
        let mut code = String::new();
        let mut note = String::new();
        let dnr = element.select(&DNR_INNER).next().map(|d| element_text(&d)).unwrap_or_default();
        if !dnr.is_empty() {
            if dnr.chars().all(|c| c.is_ascii_alphanumeric()) {
                code = dnr;
            } else {
                note = dnr;
            }
        }

        let final_price_text =
            element.select(&FINAL_PRICE).next().map(|p| element_text(&p)).unwrap_or_default();
        let old_price_text =
            element.select(&OLD_PRICE).next().map(|p| element_text(&p)).unwrap_or_default();
        let promo_text =
            element.select(&DISCOUNT_BADGE).next().map(|b| element_text(&b)).unwrap_or_default();

        let raw = RawProduct {
            code,
            name,
            url,
            price_after: parser::extract_price_int(&final_price_text),
            price_original: parser::extract_price_int(&old_price_text),
            promo_text,
            note,
            ..RawProduct::default()
        };
        records.push(parser::assemble(Source::Mega, raw, crawl_date, OPTIONS));
    }
    records
}
