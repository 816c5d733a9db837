use std::fmt;

use serde::{Deserialize, Serialize};

/// One product listing flattened to the shared column set.
///
/// Field order is the CSV column order, so every source has to fill the
/// same shape even when a column stays empty for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub source: String,
    pub code: String,
    pub name: String,
    pub brand: String,
    pub normalized_name: String,
    pub unit: String,
    pub packing: String,
    pub size: String,
    pub capacity: String,
    pub price: u64,
    pub price_after_promotion: u64,
    pub promotion: String,
    pub url: String,
    pub note: String,
    pub crawl_date: String,
    pub product_key: String,
}

impl ProductRecord {
    /// Column names in output order, matching the struct fields.
    pub const FIELDS: [&'static str; 16] = [
        "source",
        "code",
        "name",
        "brand",
        "normalized_name",
        "unit",
        "packing",
        "size",
        "capacity",
        "price",
        "price_after_promotion",
        "promotion",
        "url",
        "note",
        "crawl_date",
        "product_key",
    ];
}

/// Per-listing fields as pulled from a storefront, before normalization.
///
/// Hints carry values the page states outright (Co.op prints the unit,
/// the BHX API returns one); empty hints get derived from the name.
#[derive(Debug, Clone, Default)]
pub struct RawProduct {
    pub code: String,
    pub name: String,
    pub url: String,
    pub unit_hint: String,
    pub brand_hint: String,
    pub price_after: u64,
    pub price_original: u64,
    pub promo_text: String,
    pub note: String,
}

/// A crawlable storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Bhx,
    Mega,
    Lotte,
    Kingfood,
    Coop,
    /// Bách Hóa Xanh again, through its category endpoint instead of a browser.
    BhxApi,
}

impl Source {
    /// Value written to the `source` column.
    pub fn label(self) -> &'static str {
        match self {
            Source::Bhx | Source::BhxApi => "bachhoaxanh",
            Source::Mega => "megamarket",
            Source::Lotte => "lottemart",
            Source::Kingfood => "kingfoodmart",
            Source::Coop => "cooponline",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Bhx => "bhx",
            Source::Mega => "mega",
            Source::Lotte => "lotte",
            Source::Kingfood => "kingfood",
            Source::Coop => "coop",
            Source::BhxApi => "bhx-api",
        };
        f.write_str(name)
    }
}
