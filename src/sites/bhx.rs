//! Bách Hóa Xanh beer category crawler.
//!
//! The category page sits behind an 18+ gate and lazy-loads the grid
//! while scrolling, so the session fills in the gate form, scrolls for
//! a fixed window and only then reads the DOM.

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

const URL_BHX_BEER: &str = "https://www.bachhoaxanh.com/bia";

/// Grid wrapper that holds every product tile.
const CONTAINER_CSS: &str = "div.-mt-1.-mx-1.flex.flex-wrap.content-stretch.px-0";

static CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CONTAINER_CSS).unwrap());
static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.this-item").unwrap());
static NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3.product_name").unwrap());
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.product_price").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static CODE_DIV: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div[product-code]").unwrap());
static CODE_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[id^='product_']").unwrap());
static PROMO_BLOCK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.mb-2px.leading-3").unwrap());
static OLD_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span[class*='line-through']").unwrap());

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: false,
    // Cheap listings with a truncated name are single cans.
    assume_single_can_below: Some(40_000),
};

pub fn crawl(headless: bool) -> Result<Vec<ProductRecord>> {
    let session = Session::launch(headless)?;
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();

    session.goto(URL_BHX_BEER)?;
    handle_age_gate(&session);

    info!("BHX: waiting 10s for the initial load");
    thread::sleep(Duration::from_secs(10));

    scroll_full_cycle(&session, Duration::from_secs(60), Duration::from_secs(10));

    if !session.wait_for(CONTAINER_CSS, Duration::from_secs(90)) {
        bail!("BHX: product container never appeared");
    }

    let html = session.page_html()?;
    let records = collect(&html, &crawl_date);
    info!("BHX crawl finished, {} products", records.len());
    Ok(records)
}

/// Fills the 18+ gate when it shows up: any name, the "don't ask
/// again" checkbox, then the confirmation button.
fn handle_age_gate(session: &Session) {
    let name_input = "input[placeholder*='Họ và tên']";
    if !session.wait_for(name_input, Duration::from_secs(10)) {
        info!("BHX: no 18+ gate within the wait window");
        return;
    }
    if !session.type_into(name_input, "Automated User", Duration::from_secs(2)) {
        warn!("BHX: could not fill the 18+ gate name field");
    }

    session.eval_bool(
        r#"(() => {
            const box = document.querySelector("input[type='checkbox']");
            if (box && !box.checked) { box.click(); return true; }
            return false;
        })()"#,
    );
    thread::sleep(Duration::from_millis(500));

    if session.click_button_with_text("trên 18") || session.click_button_with_text("tren 18") {
        info!("BHX: confirmed the 18+ gate");
    } else {
        warn!("BHX: found the 18+ gate but not its confirmation button");
    }
}

/// Bottom-and-back scrolling for `total` to trigger lazy loading. When
/// the page height stops growing, a jump to 60% height nudges the
/// loader once more.
fn scroll_full_cycle(session: &Session, total: Duration, interval: Duration) {
    info!("BHX: scrolling for {}s (interval {}s)", total.as_secs(), interval.as_secs());
    let deadline = Instant::now() + total;
    let mut last_height = 0.0_f64;

    while Instant::now() < deadline {
        let _ = session.eval("window.scrollTo(0, document.body.scrollHeight);");
        thread::sleep(interval / 2);

        let _ = session.eval("window.scrollTo(0, document.body.scrollHeight / 2);");
        thread::sleep(interval / 2);

        let height = session.scroll_height();
        if height <= last_height {
            let _ = session.eval("window.scrollTo(0, document.body.scrollHeight * 0.6);");
        }
        last_height = height;
    }
    info!("BHX: scrolling completed");
}

/// Extracts all product tiles from a rendered category page.
pub fn collect(html: &str, crawl_date: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let Some(container) = document.select(&CONTAINER).next() else {
        warn!("BHX: product container not found in the page");
        return Vec::new();
    };

    let mut records = Vec::new();
    for element in container.select(&ITEM) {
        let name = element.select(&NAME).next().map(|n| element_text(&n)).unwrap_or_default();
        let href = element
            .select(&ANCHOR)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let url = absolute_url(URL_BHX_BEER, href);

        // Code lives either in a product-code attribute or in the
        // anchor id "product_<id>".
        let mut code = element
            .select(&CODE_DIV)
            .next()
            .and_then(|div| div.value().attr("product-code"))
            .unwrap_or_default()
            .trim()
            .to_string();
        if code.is_empty() {
            code = element
                .select(&CODE_ANCHOR)
                .next()
                .and_then(|a| a.value().attr("id"))
                .and_then(|id| id.splitn(2, '_').nth(1))
                .unwrap_or_default()
                .trim()
                .to_string();
        }

        let price_after_text =
            element.select(&PRICE).next().map(|p| element_text(&p)).unwrap_or_default();

        let (price_original_text, promo_text) = element
            .select(&PROMO_BLOCK)
            .next()
            .map(|promo| {
                let original =
                    promo.select(&OLD_PRICE).next().map(|s| element_text(&s)).unwrap_or_default();
                (original, element_text(&promo))
            })
            .unwrap_or_default();

        let raw = RawProduct {
            code,
            name,
            url,
            price_after: parser::extract_price_int(&price_after_text),
            price_original: parser::extract_price_int(&price_original_text),
            promo_text,
            ..RawProduct::default()
        };
        records.push(parser::assemble(Source::Bhx, raw, crawl_date, OPTIONS));
    }
    info!("BHX: found {} product elements", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
      <div class="-mt-1 -mx-1 flex flex-wrap content-stretch px-0">
        <div class="this-item box-border">
          <a href="https://www.bachhoaxanh.com/bia/thung-24-lon-bia-tiger-crystal-330ml">
            <h3 class="product_name">Thùng 24 lon bia Tiger Crystal 330ml</h3>
          </a>
          <div product-code="189353"></div>
          <div class="product_price">410.000đ</div>
          <div class="mb-2px leading-3">
            <span class="text-12 line-through">450.000đ</span>
            <span>-9%</span>
          </div>
        </div>
        <div class="this-item box-border">
          <a id="product_240511" href="/bia/bia-heineken-sleek-330ml">
            <h3 class="product_name">Bia Heineken Sleek 330ml</h3>
          </a>
          <div class="product_price">19.500đ</div>
        </div>
      </div>
    </body></html>
    "#;

    #[test]
    fn collects_both_code_variants() {
        let records = collect(PAGE, "2025-03-01");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, "189353");
        assert_eq!(records[1].code, "240511");
    }

    #[test]
    fn full_tile_maps_prices_and_promotion() {
        let records = collect(PAGE, "2025-03-01");
        let tiger = &records[0];
        assert_eq!(tiger.source, "bachhoaxanh");
        assert_eq!(tiger.name, "Thùng 24 lon bia Tiger Crystal 330ml");
        assert_eq!(tiger.brand, "Tiger");
        assert_eq!(tiger.unit, "Thùng");
        assert_eq!(tiger.packing, "24");
        assert_eq!(tiger.capacity, "330ml");
        assert_eq!(tiger.price, 450_000);
        assert_eq!(tiger.price_after_promotion, 410_000);
        assert_eq!(tiger.promotion, "9%");
        assert_eq!(tiger.product_key, "TIGER_330ML_24");
        assert_eq!(tiger.crawl_date, "2025-03-01");
    }

    #[test]
    fn cheap_tile_without_unit_becomes_a_can() {
        let records = collect(PAGE, "2025-03-01");
        let heineken = &records[1];
        assert_eq!(heineken.url, "https://www.bachhoaxanh.com/bia/bia-heineken-sleek-330ml");
        assert_eq!(heineken.price, 19_500);
        assert_eq!(heineken.price_after_promotion, 19_500);
        assert_eq!(heineken.unit, "Lon");
        assert_eq!(heineken.promotion, "");
        assert_eq!(heineken.product_key, "HEINEKEN_330ML_1");
    }

    #[test]
    fn missing_container_yields_nothing() {
        assert!(collect("<html><body><p>đang bảo trì</p></body></html>", "2025-03-01").is_empty());
    }
}
