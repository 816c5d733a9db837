//! Co.op Online beer category crawler.
//!
//! The shop hides its catalog behind a delivery-location dialog, so the
//! session first picks a fixed Ho Chi Minh City address and the
//! Co.opXtra Tạ Quang Bửu store, then expands the list through the
//! "Xem thêm sản phẩm" button before reading the cards.

use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::browser::{Session, js_string};
use crate::models::{ProductRecord, RawProduct, Source};
use crate::parser::{self, AssembleOptions};
use crate::sites::{absolute_url, click_with_text_within, element_text};

const BASE_URL: &str = "https://cooponline.vn";
const CATEGORY_URL: &str = "https://cooponline.vn/c/bia";

const ITEM_CSS: &str = "div.product-card[data-content-region-name='itemProductResult']";
const MAX_LOAD_MORE_CLICKS: u32 = 50;

const PROVINCE: &str = "Thành phố Hồ Chí Minh";
const DISTRICT: &str = "Huyện Bình Chánh";
const WARD: &str = "Xã Bình Hưng";
const STORE: &str = "Co.opXtra Tạ Quang Bửu";

static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse(ITEM_CSS).unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BRAND: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.product-brand-name").unwrap());
static NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3[title]").unwrap());
static UNIT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.css-1f5a6jh").unwrap());
static LATEST_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.att-product-detail-latest-price").unwrap());
static RETAIL_PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.att-product-detail-retail-price").unwrap());
static SAVING_VALUE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.css-zb7zul div.css-1rdv2qd").unwrap());
static PERCENT_BADGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.css-9n4x1v").unwrap());

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: true,
    assume_single_can_below: None,
};

pub fn crawl(headless: bool) -> Result<Vec<ProductRecord>> {
    info!("starting the Co.op Online crawler");
    let session = Session::launch(headless)?;
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();

    session.goto(CATEGORY_URL)?;
    thread::sleep(Duration::from_secs(5));

    handle_location_popup(&session, Duration::from_secs(40));

    thread::sleep(Duration::from_secs(5));
    load_all_products(&session, MAX_LOAD_MORE_CLICKS, Duration::from_secs(5));

    if session.wait_for(ITEM_CSS, Duration::from_secs(20)) {
        info!("Co.op: product cards loaded");
    } else {
        warn!("Co.op: no product cards within the wait window");
    }

    let html = session.page_html()?;
    let records = collect(&html, &crawl_date);
    info!("Co.op crawl finished, {} products", records.len());
    Ok(records)
}

/// Address-form rows: a `css-6sgxfm` div holding both the field chrome
/// and a label div. The option rows reuse the same outer class.
const DROPDOWN_ROWS_JS: &str = r#"[...document.querySelectorAll('div.css-6sgxfm')]
    .filter(d => d.querySelector('div.css-1cxxswr') && d.querySelector('div.css-1k26lhb'))"#;

fn dropdown_count(session: &Session) -> usize {
    let script = format!("{DROPDOWN_ROWS_JS}.length");
    session
        .eval(&script)
        .ok()
        .flatten()
        .and_then(|value| value.as_f64())
        .unwrap_or(0.0) as usize
}

fn open_dropdown(session: &Session, index: usize) -> bool {
    let script = format!(
        r#"(() => {{
            const rows = {DROPDOWN_ROWS_JS};
            const row = rows[{index}];
            if (!row) return false;
            row.scrollIntoView({{block: 'center'}});
            row.click();
            return true;
        }})()"#
    );
    session.eval_bool(&script)
}

/// Clicks the option row whose label matches `option_text` exactly
/// (whitespace collapsed), retrying while the list animates in.
fn click_option_by_text(session: &Session, option_text: &str, timeout: Duration) -> bool {
    let script = format!(
        r#"(() => {{
            const want = {want};
            const rows = [...document.querySelectorAll('div.css-6sgxfm')];
            const hit = rows.find(row => {{
                const label = row.querySelector('div.css-1k26lhb');
                if (!label) return false;
                return (label.innerText || '').trim().replace(/\s+/g, ' ') === want;
            }});
            if (!hit) return false;
            hit.scrollIntoView({{block: 'center'}});
            hit.click();
            return true;
        }})()"#,
        want = js_string(option_text),
    );
    eval_bool_within(session, &script, timeout)
}

fn open_and_select(session: &Session, index: usize, description: &str, option_text: &str) {
    if dropdown_count(session) <= index {
        warn!("Co.op: not enough dropdowns to select the {description}");
        return;
    }
    if !open_dropdown(session, index) {
        warn!("Co.op: could not open the {description} dropdown");
        return;
    }
    thread::sleep(Duration::from_millis(500));

    if click_option_by_text(session, option_text, Duration::from_secs(20)) {
        info!("Co.op: selected {description} '{option_text}'");
        thread::sleep(Duration::from_millis(700));
    } else {
        warn!("Co.op: could not select {description} '{option_text}'");
    }
}

/// Works through the delivery-location dialog. Every step is
/// best-effort; a returning profile may not see the dialog at all.
fn handle_location_popup(session: &Session, timeout: Duration) {
    info!("Co.op: handling the location popup");

    let deadline = Instant::now() + timeout;
    while dropdown_count(session) < 3 {
        if Instant::now() >= deadline {
            warn!("Co.op: address form not found, ignoring the popup");
            return;
        }
        thread::sleep(Duration::from_millis(500));
    }
    info!("Co.op: found the address form");

    open_and_select(session, 0, "province", PROVINCE);
    open_and_select(session, 1, "district", DISTRICT);
    open_and_select(session, 2, "ward", WARD);

    let address_css = "input#address, input[name='address'], \
                       input[placeholder*='Địa chỉ'], input[placeholder*='địa chỉ']";
    if session.type_into(address_css, "1", timeout) {
        info!("Co.op: filled address = '1'");
        thread::sleep(Duration::from_millis(500));
    } else {
        warn!("Co.op: could not fill the address field");
    }

    if click_with_text_within(session, "button", "Xác nhận", Duration::from_secs(10)) {
        info!("Co.op: clicked the confirm button");
        thread::sleep(Duration::from_secs(2));
    } else {
        info!("Co.op: no confirm button, the form may have advanced on its own");
    }

    let store_script = format!(
        r#"(() => {{
            const spans = [...document.querySelectorAll('span.css-1vgbj23')];
            const span = spans.find(s => (s.innerText || '').includes({store}));
            if (!span) return false;
            const row = span.closest('div.teko-row.css-1qrgscw');
            if (!row) return false;
            row.scrollIntoView({{block: 'center'}});
            row.click();
            return true;
        }})()"#,
        store = js_string(STORE),
    );
    if eval_bool_within(session, &store_script, Duration::from_secs(25)) {
        info!("Co.op: picked the store '{STORE}'");
        thread::sleep(Duration::from_secs(2));
    } else {
        warn!("Co.op: store '{STORE}' not offered");
    }

    if click_with_text_within(session, "button", "Mua sắm ngay", Duration::from_secs(20)) {
        info!("Co.op: entered the shop");
        thread::sleep(Duration::from_secs(3));
    } else {
        warn!("Co.op: no 'Mua sắm ngay' button");
    }

    info!("Co.op: done handling the location popup");
}

/// Scrolls to the bottom and clicks "Xem thêm sản phẩm" until the
/// button goes away, the page stops growing or the click cap is hit.
fn load_all_products(session: &Session, max_clicks: u32, pause: Duration) {
    info!("Co.op: expanding the product list (up to {max_clicks} clicks)");
    let mut last_height = session.scroll_height();
    let mut clicks = 0;

    while clicks < max_clicks {
        let _ = session.eval("window.scrollTo(0, document.body.scrollHeight);");
        thread::sleep(pause);

        if !click_with_text_within(
            session,
            "a.css-b0m1yo",
            "Xem thêm sản phẩm",
            Duration::from_secs(5),
        ) {
            info!("Co.op: no more load-more button, stop");
            break;
        }
        clicks += 1;
        info!("Co.op: clicked load-more ({clicks}/{max_clicks})");
        thread::sleep(pause);

        let height = session.scroll_height();
        if height == last_height {
            info!("Co.op: page height unchanged after the click, stop");
            break;
        }
        last_height = height;
    }
    info!("Co.op: finished expanding, {clicks} clicks");
}

fn eval_bool_within(session: &Session, script: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if session.eval_bool(script) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(500));
    }
}

/// Extracts all product cards from the fully expanded page.
pub fn collect(html: &str, crawl_date: &str) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for card in document.select(&ITEM) {
        let href = card
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        let url = absolute_url(BASE_URL, href);

        let mut code = card.value().attr("data-content-name").unwrap_or_default().to_string();
        if code.is_empty() && !href.is_empty() {
            code = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string();
        }

        let brand_hint = card.select(&BRAND).next().map(|b| element_text(&b)).unwrap_or_default();
        let name = card.select(&NAME).next().map(|n| element_text(&n)).unwrap_or_default();

        // "Đơn vị tính: Thùng" → "Thùng".
        let unit_hint = card
            .select(&UNIT)
            .next()
            .map(|div| {
                let text = element_text(&div);
                match text.split_once(':') {
                    Some((_, after)) => after.trim().to_string(),
                    None => text,
                }
            })
            .unwrap_or_default();

        let price_after_text =
            card.select(&LATEST_PRICE).next().map(|p| element_text(&p)).unwrap_or_default();
        let price_original_text =
            card.select(&RETAIL_PRICE).next().map(|p| element_text(&p)).unwrap_or_default();

        let mut promo_parts: Vec<String> = Vec::new();
        if let Some(saving) = card.select(&SAVING_VALUE).next() {
            let text = element_text(&saving);
            if !text.is_empty() {
                promo_parts.push(format!("Tiết kiệm {text}"));
            }
        }
        if let Some(percent) = card.select(&PERCENT_BADGE).next() {
            let text = element_text(&percent);
            if !text.is_empty() {
                promo_parts.push(text);
            }
        }

        let raw = RawProduct {
            code,
            name,
            url,
            unit_hint,
            brand_hint,
            price_after: parser::extract_price_int(&price_after_text),
            price_original: parser::extract_price_int(&price_original_text),
            promo_text: promo_parts.join(" "),
            ..RawProduct::default()
        };
        records.push(parser::assemble(Source::Coop, raw, crawl_date, OPTIONS));
    }

    info!("found {} Co.op product items", records.len());
    records
}
