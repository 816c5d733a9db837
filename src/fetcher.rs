//! Bách Hóa Xanh `Category/AjaxProduct` API client.
//!
//! Pure-HTTP alternative to the browser crawl: the storefront's own
//! listing endpoint is paged with the JSON payload a real session
//! sends, so no Chrome instance is needed.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Local;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{ProductRecord, RawProduct, Source};
use crate::parser::{self, AssembleOptions};
use crate::sites::absolute_url;

const API_URL: &str = "https://apibhx.tgdd.vn/Category/AjaxProduct";
const STORE_BASE: &str = "https://www.bachhoaxanh.com";
const REFERER: &str = "https://www.bachhoaxanh.com/bia";

/// Category id of the beer listing on bachhoaxanh.com.
pub const BEER_CATEGORY_ID: u32 = 2282;

const PROVINCE_ID: u32 = 1027;
const STORE_ID: u32 = 2546;
const PAGE_SIZE: u32 = 10;
const PAGE_PAUSE: Duration = Duration::from_millis(400);

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36 Edg/142.0.0.0";
const DEVICE_ID: &str = "2d9125a1-b026-41ef-a19b-a9b2e08294b6";

const OPTIONS: AssembleOptions = AssembleOptions {
    infer_promotion_from_prices: true,
    assume_single_can_below: None,
};

/// Headers captured from a logged session. The gateway rejects calls
/// missing the api key or the platform markers.
fn api_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "accept",
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(
        "accept-language",
        HeaderValue::from_static("vi,en-US;q=0.9,en;q=0.8"),
    );
    headers.insert("deviceid", HeaderValue::from_static(DEVICE_ID));
    headers.insert("origin", HeaderValue::from_static(STORE_BASE));
    headers.insert("platform", HeaderValue::from_static("webnew"));
    headers.insert("referer", HeaderValue::from_static(REFERER));
    headers.insert("referer-url", HeaderValue::from_static(REFERER));
    headers.insert("reversehost", HeaderValue::from_static("http://bhxapi.live"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
    headers.insert("xapikey", HeaderValue::from_static("bhx-api-core-2022"));
    headers
}

struct BhxApiClient {
    client: Client,
}

impl BhxApiClient {
    fn new() -> Result<Self> {
        let client = Client::builder()
            .default_headers(api_headers())
            .timeout(Duration::from_secs(20))
            .build()
            .context("building the listing API client")?;
        Ok(Self { client })
    }

    fn fetch_page(&self, page_index: u32) -> Result<ApiData> {
        let envelope: ApiEnvelope = self
            .client
            .post(API_URL)
            .json(&PageQuery::for_page(page_index))
            .send()?
            .error_for_status()?
            .json()
            .with_context(|| format!("decoding listing page {page_index}"))?;
        if envelope.code != 0 {
            bail!(
                "listing API answered code {} on page {page_index}",
                envelope.code
            );
        }
        Ok(envelope.data)
    }
}

/// Request body of `Category/AjaxProduct`. Key casing is mixed on the
/// wire, hence the camelCase renames on the location fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PageQuery {
    #[serde(rename = "provinceId")]
    province_id: u32,
    #[serde(rename = "wardId")]
    ward_id: u32,
    #[serde(rename = "districtId")]
    district_id: u32,
    #[serde(rename = "storeId")]
    store_id: u32,
    category_id: u32,
    selected_brand_id: String,
    property_id_list: String,
    page_index: u32,
    page_size: u32,
    sort_str: String,
    priority_product_ids: String,
    property_selected: Vec<String>,
    last_show_product_id: u64,
}

impl PageQuery {
    fn for_page(page_index: u32) -> Self {
        Self {
            province_id: PROVINCE_ID,
            ward_id: 0,
            district_id: 0,
            store_id: STORE_ID,
            category_id: BEER_CATEGORY_ID,
            selected_brand_id: String::new(),
            property_id_list: String::new(),
            page_index,
            page_size: PAGE_SIZE,
            sort_str: String::new(),
            priority_product_ids: String::new(),
            property_selected: Vec::new(),
            last_show_product_id: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i64,
    #[serde(default)]
    data: ApiData,
}

#[derive(Debug, Default, Deserialize)]
struct ApiData {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    products: Vec<ApiProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProduct {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    unit: String,
    #[serde(default)]
    product_prices: Vec<ApiPrice>,
    #[serde(default)]
    promotion_text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPrice {
    #[serde(default)]
    price: u64,
    #[serde(default)]
    sys_price: u64,
    #[serde(default)]
    discount_percent: f64,
}

impl ApiProduct {
    fn into_record(self, crawl_date: &str) -> ProductRecord {
        let (price_after, price_original, discount_percent) = self
            .product_prices
            .first()
            .map(|row| (row.price, row.sys_price, row.discount_percent))
            .unwrap_or((0, 0, 0.0));

        // The API reports the discount directly; the free-text promotion
        // only fills in when no percentage is attached to the price row.
        let promo_text = if discount_percent > 0.0 {
            if discount_percent.fract() == 0.0 {
                format!("{}%", discount_percent as i64)
            } else {
                format!("{discount_percent}%")
            }
        } else {
            self.promotion_text.clone()
        };

        let raw = RawProduct {
            code: self.id.to_string(),
            name: if self.full_name.is_empty() {
                self.name
            } else {
                self.full_name
            },
            url: absolute_url(STORE_BASE, &self.url),
            unit_hint: self.unit,
            price_after,
            price_original,
            promo_text,
            note: self.promotion_text,
            ..RawProduct::default()
        };
        parser::assemble(Source::BhxApi, raw, crawl_date, OPTIONS)
    }
}

/// Crawls the beer category through the listing API instead of a
/// browser session.
pub fn crawl_api() -> Result<Vec<ProductRecord>> {
    let crawl_date = Local::now().format("%Y-%m-%d").to_string();
    let client = BhxApiClient::new()?;

    let first = client.fetch_page(1)?;
    if first.total == 0 {
        bail!("listing API reports zero beer products, the location payload is probably stale");
    }
    let total_pages = first.total.div_ceil(u64::from(PAGE_SIZE));
    info!(
        "BHX API: {} products across {} pages",
        first.total, total_pages
    );

    let mut products = first.products;
    for page in 2..=total_pages {
        match client.fetch_page(page as u32) {
            Ok(data) => {
                info!(
                    "BHX API: page {page}/{total_pages}, {} products",
                    data.products.len()
                );
                products.extend(data.products);
                thread::sleep(PAGE_PAUSE);
            }
            Err(err) => warn!("BHX API: page {page} failed: {err:#}"),
        }
    }

    info!("BHX API crawl finished, {} products", products.len());
    Ok(products
        .into_iter()
        .map(|product| product.into_record(&crawl_date))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_query_matches_captured_payload() {
        let value = serde_json::to_value(PageQuery::for_page(3)).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 13);
        assert_eq!(object["provinceId"], 1027);
        assert_eq!(object["wardId"], 0);
        assert_eq!(object["districtId"], 0);
        assert_eq!(object["storeId"], 2546);
        assert_eq!(object["CategoryId"], 2282);
        assert_eq!(object["SelectedBrandId"], "");
        assert_eq!(object["PropertyIdList"], "");
        assert_eq!(object["PageIndex"], 3);
        assert_eq!(object["PageSize"], 10);
        assert_eq!(object["SortStr"], "");
        assert_eq!(object["PriorityProductIds"], "");
        assert_eq!(object["PropertySelected"], json!([]));
        assert_eq!(object["LastShowProductId"], 0);
    }

    #[test]
    fn envelope_parses_the_listing_shape() {
        let envelope: ApiEnvelope = serde_json::from_value(json!({
            "code": 0,
            "data": {
                "total": 87,
                "products": [{
                    "id": 309007,
                    "name": "Bia Tiger 330ml",
                    "fullName": "Thùng 24 lon bia Tiger 330ml",
                    "url": "/thung-24-lon-bia-tiger-330ml",
                    "unit": "Thùng",
                    "productPrices": [
                        { "price": 405000, "sysPrice": 445000, "discountPercent": 8.99 }
                    ],
                    "promotionText": "Giảm 40.000đ"
                }]
            }
        }))
        .unwrap();

        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.data.total, 87);
        let product = &envelope.data.products[0];
        assert_eq!(product.full_name, "Thùng 24 lon bia Tiger 330ml");
        assert_eq!(product.product_prices[0].sys_price, 445000);
        assert_eq!(product.product_prices[0].discount_percent, 8.99);
    }

    #[test]
    fn envelope_tolerates_missing_data() {
        let envelope: ApiEnvelope = serde_json::from_str(r#"{"code":4}"#).unwrap();
        assert_eq!(envelope.code, 4);
        assert_eq!(envelope.data.total, 0);
        assert!(envelope.data.products.is_empty());
    }

    #[test]
    fn api_product_maps_into_a_record() {
        let product: ApiProduct = serde_json::from_value(json!({
            "id": 309007,
            "name": "Bia Tiger 330ml",
            "fullName": "Thùng 24 lon bia Tiger 330ml",
            "url": "/thung-24-lon-bia-tiger-330ml",
            "unit": "Thùng",
            "productPrices": [
                { "price": 405000, "sysPrice": 445000, "discountPercent": 8.99 }
            ],
            "promotionText": "Giảm 40.000đ"
        }))
        .unwrap();

        let record = product.into_record("2026-08-22");
        assert_eq!(record.source, "bachhoaxanh");
        assert_eq!(record.code, "309007");
        assert_eq!(record.name, "Thùng 24 lon bia Tiger 330ml");
        assert_eq!(
            record.url,
            "https://www.bachhoaxanh.com/thung-24-lon-bia-tiger-330ml"
        );
        assert_eq!(record.unit, "Thùng");
        assert_eq!(record.packing, "24");
        assert_eq!(record.capacity, "330ml");
        assert_eq!(record.brand, "Tiger");
        assert_eq!(record.price, 445000);
        assert_eq!(record.price_after_promotion, 405000);
        assert_eq!(record.promotion, "8.99%");
        assert_eq!(record.note, "Giảm 40.000đ");
        assert_eq!(record.crawl_date, "2026-08-22");
        assert_eq!(record.product_key, "TIGER_330ML_24");
    }

    #[test]
    fn integral_discount_percent_collapses() {
        let product: ApiProduct = serde_json::from_value(json!({
            "id": 1,
            "name": "Bia Heineken Sleek 330ml",
            "fullName": "",
            "url": "",
            "unit": "Lon",
            "productPrices": [{ "price": 19000, "sysPrice": 21000, "discountPercent": 10.0 }],
            "promotionText": ""
        }))
        .unwrap();

        let record = product.into_record("2026-08-22");
        assert_eq!(record.name, "Bia Heineken Sleek 330ml");
        assert_eq!(record.promotion, "10%");
        assert_eq!(record.url, "");
    }

    #[test]
    fn product_without_price_rows_keeps_zeroes() {
        let product: ApiProduct = serde_json::from_value(json!({
            "id": 7,
            "name": "Bia Heineken Sleek 330ml",
            "fullName": "",
            "url": "/bia-heineken-sleek-330ml",
            "unit": "",
            "productPrices": [],
            "promotionText": ""
        }))
        .unwrap();

        let record = product.into_record("2026-08-22");
        assert_eq!(record.price, 0);
        assert_eq!(record.price_after_promotion, 0);
        assert_eq!(record.promotion, "");
        assert_eq!(record.unit, "");
        assert_eq!(record.packing, "1");
        assert_eq!(record.product_key, "HEINEKEN_330ML_1");
    }
}
