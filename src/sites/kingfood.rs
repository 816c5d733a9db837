//! Kingfood Mart beer category crawler.
//!
//! Kingfood fingerprints automation, so the session launches with the
//! stealth flag set and loads the full list by clicking "Xem thêm sản
//! phẩm" until the button disappears. Every product card is one
//! `<a href="/bia-co-con/…">` element.

use std::sync::LazyLock;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::browser::Session;
use crate::models::{ProductRecord, RawProduct, Source};
use crate::parser::{self, AssembleOptions};
use crate::sites::{absolute_url, click_with_text_within, element_text};

const BASE_URL: &str = "https://kingfoodmart.com";
const CATEGORY_URL: &str = "https://kingfoodmart.com/bia";

const PRODUCT_CSS: &str = "a[href*='/bia-co-con/']";
const SEE_MORE_LABEL: &str = "Xem thêm sản phẩm";

static PRODUCT: LazyLock<Selector> = LazyLock::new(|| Selector::parse(PRODUCT_CSS).unwrap());
static NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3[title]").unwrap());
static PRICE_ROW_CHILD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.flex.items-baseline > div").unwrap());
static OLD_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.line-through").unwrap());
static OVERLAY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.absolute").unwrap());
static ANY_DIV: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div").unwrap());
static NOTE_DIV: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[class='mb-1'][style*='height: 16px']").unwrap());

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: true,
    assume_single_can_below: None,
};

pub fn crawl(headless: bool) -> Result<Vec<ProductRecord>> {
    info!("starting the Kingfood Mart crawler");
    let session = Session::launch_stealth(headless)?;
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();

    session.goto(CATEGORY_URL)?;
    thread::sleep(Duration::from_secs(8));

    if session.wait_for(PRODUCT_CSS, Duration::from_secs(10)) {
        info!("Kingfood: initial products loaded");
    } else {
        warn!("Kingfood: no initial beer products within the wait window");
    }

    click_until_no_more(&session);

    let html = session.page_html()?;
    let records = collect(&html, &crawl_date);
    info!("Kingfood crawl finished, {} products", records.len());
    Ok(records)
}

/// Clicks the load-more button until it stops showing up.
fn click_until_no_more(session: &Session) {
    loop {
        if !click_with_text_within(session, "button", SEE_MORE_LABEL, Duration::from_secs(5)) {
            info!("Kingfood: load-more button gone, stop clicking");
            break;
        }
        info!("Kingfood: clicked the load-more button");
        thread::sleep(Duration::from_millis(1500));
    }
}

/// Text directly inside an element, nested tags excluded. The promo
/// markers are matched on this, the way an XPath `text()` test reads.
fn direct_text(element: &ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    out
}

/// Extracts all product cards from the fully expanded page.
pub fn collect(html: &str, crawl_date: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for element in document.select(&PRODUCT) {
        let href = element.value().attr("href").unwrap_or_default();
        let url = absolute_url(BASE_URL, href);
        let code = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string();

        let name = element.select(&NAME).next().map(|n| element_text(&n)).unwrap_or_default();

        let price_after_text = element
            .select(&PRICE_ROW_CHILD)
            .next()
            .map(|price| element_text(&price))
            .unwrap_or_default();
        let price_original_text =
            element.select(&OLD_PRICE).next().map(|old| element_text(&old)).unwrap_or_default();

        // Badge overlay ("-10%"), the "Tiết kiệm …" line and the gift
        // note all feed the promotion text; the note also stands alone.
        let mut promo_parts: Vec<String> = Vec::new();
        if let Some(overlay) =
            element.select(&OVERLAY).find(|div| direct_text(div).contains('%'))
        {
            let text = element_text(&overlay);
            if !text.is_empty() {
                promo_parts.push(text);
            }
        }
        if let Some(save) =
            element.select(&ANY_DIV).find(|div| direct_text(div).contains("Tiết kiệm"))
        {
            let text = element_text(&save);
            if !text.is_empty() {
                promo_parts.push(text);
            }
        }
        let mut note = String::new();
        if let Some(container) = element.select(&NOTE_DIV).next() {
            let text = element_text(&container);
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
        records.push(parser::assemble(Source::Kingfood, raw, crawl_date, OPTIONS));
    }

    info!("found {} Kingfood product items", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div class="grid">
        <a class="pt-2" href="/bia-co-con/bia-tiger-bac-lon-330ml">
          <div class="relative">
            <div class="absolute top-0">-10%</div>
          </div>
          <h3 title="Bia Tiger Bạc lon 330ml">Bia Tiger Bạc lon 330ml</h3>
          <div class="flex items-baseline gap-1">
            <div>19.000đ</div>
            <div class="line-through">21.000đ</div>
          </div>
          <div>Tiết kiệm 2.000đ</div>
          <div class="mb-1" style="height: 16px;">Tặng 1 lon cùng loại</div>
        </a>
        <a class="pt-2" href="https://kingfoodmart.com/bia-co-con/thung-24-lon-bia-sapporo/">
          <h3 title="Thùng 24 lon bia Sapporo Premium 330ml">Thùng 24 lon bia Sapporo Premium 330ml</h3>
          <div class="flex items-baseline gap-1">
            <div>520.000đ</div>
          </div>
        </a>
      </div>
    </body></html>
    "#;

    #[test]
    fn card_href_supplies_url_and_code() {
        let records = collect(PAGE, "2025-03-01");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].url, "https://kingfoodmart.com/bia-co-con/bia-tiger-bac-lon-330ml");
        assert_eq!(records[0].code, "bia-tiger-bac-lon-330ml");
        assert_eq!(records[1].code, "thung-24-lon-bia-sapporo");
    }

    #[test]
    fn promo_overlay_and_note_are_both_kept() {
        let records = collect(PAGE, "2025-03-01");
        let tiger = &records[0];
        assert_eq!(tiger.source, "kingfoodmart");
        assert_eq!(tiger.price, 21_000);
        assert_eq!(tiger.price_after_promotion, 19_000);
        assert_eq!(tiger.promotion, "10%");
        assert_eq!(tiger.note, "Tặng 1 lon cùng loại");
        assert_eq!(tiger.unit, "Lon");
        assert_eq!(tiger.packing, "1");
        assert_eq!(tiger.product_key, "TIGER_330ML_1");
    }

    #[test]
    fn undiscounted_card_infers_nothing() {
        let records = collect(PAGE, "2025-03-01");
        let sapporo = &records[1];
        assert_eq!(sapporo.price, 520_000);
        assert_eq!(sapporo.price_after_promotion, 520_000);
        assert_eq!(sapporo.promotion, "");
        assert_eq!(sapporo.unit, "Thùng");
        assert_eq!(sapporo.packing, "24");
        assert_eq!(sapporo.product_key, "SAPPORO_330ML_24");
    }
}
