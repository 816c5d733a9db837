//! Field extraction and record assembly shared by every storefront.
//!
//! Listing pages only give us a display name, a couple of price strings
//! and maybe a promotion badge. Everything else in a
//! [`ProductRecord`] (brand, unit, packing, capacity, the dedup key) is
//! derived here so all sources agree on what, say, `packing = "24"`
//! means.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::models::{ProductRecord, RawProduct, Source};

static CAPACITY_ML: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*ml").unwrap());
static CAPACITY_CL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*cl").unwrap());
static PACK_BEFORE_CONTAINER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(lon|chai)").unwrap());
static PACK_AFTER_GROUPING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(thùng|lốc|hop|hộp)\s*(\d+)").unwrap());
static ANY_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static PERCENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+(?:[.,]\d+)?)\s*%").unwrap());

/// Known beer brands, scanned in order; first substring hit wins.
pub const BRANDS: &[&str] = &[
    "Heineken",
    "Tiger",
    "Sài Gòn",
    "Budweiser",
    "Hoegaarden",
    "1664 Blanc",
    "Larue",
    "Huda",
    "Red Ruby",
    "Sapporo",
    "Bia Việt",
    "333",
    "Corona",
    "San Miguel",
    "Edelweiss",
    "Beck’s",
    "Carlsberg",
    "Strongbow",
    "Somersby",
    "Lạc Việt",
    "Tuborg",
    "Chill",
    "Hà Nội",
    "Chang",
    "Trúc Bạch Sleek",
    "Halida",
    "Chimay",
    "East West",
    "Red Horse",
    "Tsingtao",
    "Asahi",
    "Sanwald",
    "Duvel",
    "Paulaner",
    "Dalat Cider",
    "Trúc Bạch",
    "Abbaye",
    "Pilsner Urquell",
    "G De Grand Cru",
    "Orion",
    "St. Sebastiaan",
    "Ngũ Hành",
    "Cherie",
];

/// Pack counts that actually exist in these stores. Anything else is a
/// mis-parse (a year, a voucher amount) and collapses to "1".
pub const ALLOWED_PACKINGS: &[&str] = &["1", "4", "6", "12", "20", "24"];

/// Volume per container, `ml` preferred over `cl`: "330ml", "33cl".
pub fn extract_capacity(text: &str) -> String {
    let lowered = text.to_lowercase();
    if let Some(caps) = CAPACITY_ML.captures(&lowered) {
        return format!("{}ml", &caps[1]);
    }
    if let Some(caps) = CAPACITY_CL.captures(&lowered) {
        return format!("{}cl", &caps[1]);
    }
    String::new()
}

/// Container type from the display name, largest container first so
/// "Thùng 24 lon" reads as a crate, not a can.
pub fn extract_unit(text: &str) -> String {
    let lowered = text.to_lowercase();
    if lowered.contains("thùng") {
        return "Thùng".to_string();
    }
    if lowered.contains("lon") {
        return "Lon".to_string();
    }
    if lowered.contains("chai") {
        return "Chai".to_string();
    }
    String::new()
}

/// Number of containers in the listing.
///
/// Tries, in order: a count right before "lon"/"chai" ("24 lon"), a
/// count right after a grouping word ("lốc 6"), then the first number
/// that is not a volume ("Corona Extra 24 x 250ml" gives "24").
pub fn extract_packing_quantity(text: &str) -> String {
    let lowered = text.to_lowercase();
    if let Some(caps) = PACK_BEFORE_CONTAINER.captures(&lowered) {
        return caps[1].to_string();
    }
    if let Some(caps) = PACK_AFTER_GROUPING.captures(&lowered) {
        return caps[2].to_string();
    }
    for found in ANY_NUMBER.find_iter(&lowered) {
        let after = lowered[found.end()..].trim_start();
        if after.starts_with("ml") || after.starts_with("cl") {
            continue;
        }
        return found.as_str().to_string();
    }
    String::new()
}

/// Integer VND amount from a price string such as "410.000đ /24 lon".
/// Everything after the currency sign is dropped before digits are
/// collected, otherwise the pack size would leak into the price.
pub fn extract_price_int(price_text: &str) -> u64 {
    let money_part = price_text.split('đ').next().unwrap_or("");
    let digits: String = money_part.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Brand from the display name.
///
/// A few storefront spellings need fixing up before the plain table
/// scan: "blance" for Blanc, "carsberg" for Carlsberg, unaccented
/// "saigon"/"hanoi", and "Bud" on its own for Budweiser.
pub fn extract_brand(text: &str) -> String {
    let lowered = text.to_lowercase();

    if lowered.contains("1664") || lowered.contains("blanc") || lowered.contains("blance") {
        return "1664 Blanc".to_string();
    }
    if lowered.contains("hanoi") || lowered.contains("hà nội") {
        return "Hà Nội".to_string();
    }
    if lowered.contains("saigon") || lowered.contains("sài gòn") {
        return "Sài Gòn".to_string();
    }
    if lowered.contains("carlsberg") || lowered.contains("carsberg") {
        return "Carlsberg".to_string();
    }
    if lowered.contains("far east") || lowered.contains("east west") || lowered.contains("eastwest")
    {
        return "East West".to_string();
    }
    if lowered.contains("bud ") || lowered.starts_with("bud") {
        return "Budweiser".to_string();
    }
    if lowered.contains("dalat cider") || lowered.contains("da lat cider") {
        return "Dalat Cider".to_string();
    }

    for brand in BRANDS {
        if lowered.contains(brand.to_lowercase().as_str()) {
            return (*brand).to_string();
        }
    }
    String::new()
}

/// Percentage discount from a promotion blurb, keeping the LAST match
/// so "was -4%, extra 5% this week" reads as "5%". Decimal commas
/// become dots and integral values lose their fraction: "3%", "1.98%".
pub fn extract_promotion_from_text(text: &str) -> String {
    let Some(last) = PERCENT.captures_iter(text).last() else {
        return String::new();
    };
    let value = last[1].replace(',', ".");
    match value.parse::<f64>() {
        Ok(number) if number.fract() == 0.0 => format!("{}%", number as i64),
        Ok(number) => format!("{number}%"),
        Err(_) => format!("{value}%"),
    }
}

/// ASCII search key: lowercase, accents stripped (NFD, combining marks
/// dropped), every other symbol a space, whitespace collapsed.
pub fn normalize_name(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
    let cleaned: String = stripped
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cross-source dedup key, e.g. `HEINEKEN_330ML_24`. Empty parts are
/// skipped, brand spaces removed, everything uppercased.
pub fn make_product_key(brand: &str, capacity: &str, packing: &str) -> String {
    let brand_part = brand.trim().replace(' ', "");
    [brand_part.as_str(), capacity.trim(), packing.trim()]
        .iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Source-specific normalization quirks applied by [`assemble`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Derive the promotion percentage from the price pair when the
    /// page shows no badge of its own.
    pub infer_promotion_from_prices: bool,
    /// Listings cheaper than this with no recognizable unit are single
    /// cans. BHX and Mega truncate names like "Bia Tiger 330ml" that
    /// never mention "lon".
    pub assume_single_can_below: Option<u64>,
}

/// Builds the final record from raw storefront fields.
pub fn assemble(
    source: Source,
    raw: RawProduct,
    crawl_date: &str,
    options: AssembleOptions,
) -> ProductRecord {
    let RawProduct {
        code,
        name,
        url,
        unit_hint,
        brand_hint,
        price_after,
        price_original,
        promo_text,
        note,
    } = raw;

    let mut unit = if unit_hint.is_empty() { extract_unit(&name) } else { unit_hint };
    let brand = if brand_hint.is_empty() { extract_brand(&name) } else { brand_hint };

    let mut packing = extract_packing_quantity(&name);
    if packing.is_empty() || !ALLOWED_PACKINGS.contains(&packing.as_str()) {
        packing = "1".to_string();
    }

    let capacity = extract_capacity(&name);
    let normalized_name = normalize_name(&name);

    let price = if price_original > 0 { price_original } else { price_after };

    let mut promotion = extract_promotion_from_text(&promo_text);
    if promotion.is_empty()
        && options.infer_promotion_from_prices
        && price > 0
        && price_after > 0
        && price > price_after
    {
        promotion = percent_off(price, price_after);
    }

    if let Some(threshold) = options.assume_single_can_below {
        if unit.is_empty() && price > 0 && price < threshold {
            unit = "Lon".to_string();
        }
    }

    let product_key = make_product_key(&brand, &capacity, &packing);

    ProductRecord {
        source: source.label().to_string(),
        code,
        name,
        brand,
        normalized_name,
        unit,
        packing,
        size: String::new(),
        capacity,
        price,
        price_after_promotion: price_after,
        promotion,
        url,
        note,
        crawl_date: crawl_date.to_string(),
        product_key,
    }
}

/// Discount percentage rounded to two decimals, printed like the badge
/// values: "12%" when integral, "12.5%" otherwise.
fn percent_off(price: u64, price_after: u64) -> String {
    let discount = (price - price_after) as f64 * 100.0 / price as f64;
    let rounded = (discount * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}%", rounded as i64)
    } else {
        format!("{rounded}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_prefers_ml_over_cl() {
        assert_eq!(extract_capacity("Thùng 24 lon bia Tiger 330ml"), "330ml");
        assert_eq!(extract_capacity("Bia Chimay xanh 33cl"), "33cl");
        assert_eq!(extract_capacity("Bia 500ML thùng"), "500ml");
        assert_eq!(extract_capacity("Combo bia tươi"), "");
    }

    #[test]
    fn capacity_skips_counts_without_suffix() {
        assert_eq!(extract_capacity("Lốc 6 lon Heineken 250ml"), "250ml");
    }

    #[test]
    fn unit_ranks_crate_above_can_above_bottle() {
        assert_eq!(extract_unit("Thùng 24 lon bia"), "Thùng");
        assert_eq!(extract_unit("Lốc 6 lon bia"), "Lon");
        assert_eq!(extract_unit("Bia chai 450ml"), "Chai");
        assert_eq!(extract_unit("Bia Tiger 330ml"), "");
    }

    #[test]
    fn packing_reads_count_before_container_word() {
        assert_eq!(extract_packing_quantity("Thùng 24 lon bia Tiger 330ml"), "24");
        assert_eq!(extract_packing_quantity("Lốc 6 chai Sapporo"), "6");
    }

    #[test]
    fn packing_reads_count_after_grouping_word() {
        assert_eq!(extract_packing_quantity("Bia Heineken lốc 6"), "6");
        assert_eq!(extract_packing_quantity("Hộp 4 bia đen"), "4");
    }

    #[test]
    fn packing_falls_back_to_first_non_volume_number() {
        assert_eq!(extract_packing_quantity("Bia Corona Extra 24 x 250ml"), "24");
        assert_eq!(extract_packing_quantity("Bia Tiger 330ml"), "");
        assert_eq!(extract_packing_quantity("Bia 333 thùng"), "333");
    }

    #[test]
    fn price_stops_at_currency_sign() {
        assert_eq!(extract_price_int("410.000đ /24 lon 330ml"), 410_000);
        assert_eq!(extract_price_int("19.500đ"), 19_500);
        assert_eq!(extract_price_int("1.200.000 đ"), 1_200_000);
        assert_eq!(extract_price_int("247.000"), 247_000);
        assert_eq!(extract_price_int("Liên hệ"), 0);
        assert_eq!(extract_price_int(""), 0);
    }

    #[test]
    fn brand_special_spellings_win_over_the_table() {
        assert_eq!(extract_brand("Bia Blance 1664 lốc 4"), "1664 Blanc");
        assert_eq!(extract_brand("Bia hanoi bold"), "Hà Nội");
        assert_eq!(extract_brand("Bia Saigon Special"), "Sài Gòn");
        assert_eq!(extract_brand("Bia Carsberg Smooth"), "Carlsberg");
        assert_eq!(extract_brand("Far East IPA"), "East West");
        assert_eq!(extract_brand("Bud Light 330ml"), "Budweiser");
        assert_eq!(extract_brand("Da Lat Cider vị táo"), "Dalat Cider");
    }

    #[test]
    fn brand_table_scan_is_first_match() {
        assert_eq!(extract_brand("Thùng 24 lon bia Tiger Crystal"), "Tiger");
        assert_eq!(extract_brand("Bia Việt lon cao"), "Bia Việt");
        assert_eq!(extract_brand("Bia thủ công không tên"), "");
    }

    #[test]
    fn promotion_takes_last_percent_and_tidies_it() {
        assert_eq!(extract_promotion_from_text("-4% Mua 2 giảm thêm 5%"), "5%");
        assert_eq!(extract_promotion_from_text("Giảm 3.00%"), "3%");
        assert_eq!(extract_promotion_from_text("Giảm 1,98%"), "1.98%");
        assert_eq!(extract_promotion_from_text("Tặng ly thủy tinh"), "");
        assert_eq!(extract_promotion_from_text(""), "");
    }

    #[test]
    fn normalized_name_is_ascii_and_collapsed() {
        assert_eq!(
            normalize_name("Thùng 24 lon bia Tiger Crystal 330ml"),
            "thung 24 lon bia tiger crystal 330ml"
        );
        assert_eq!(normalize_name("Bia Hà Nội – chai 450ml"), "bia ha noi chai 450ml");
        assert_eq!(normalize_name("  Bia\t333\n lon  "), "bia 333 lon");
    }

    #[test]
    fn product_key_skips_empty_parts() {
        assert_eq!(make_product_key("Heineken", "330ml", "24"), "HEINEKEN_330ML_24");
        assert_eq!(make_product_key("Sài Gòn", "", "6"), "SÀIGÒN_6");
        assert_eq!(make_product_key("", "", ""), "");
    }

    fn raw(name: &str) -> RawProduct {
        RawProduct { name: name.to_string(), ..RawProduct::default() }
    }

    #[test]
    fn assemble_derives_every_field_from_the_name() {
        let mut product = raw("Thùng 24 lon bia Tiger Crystal 330ml");
        product.code = "189353".into();
        product.url = "https://example.net/tiger".into();
        product.price_after = 410_000;
        product.price_original = 450_000;
        product.promo_text = "-9%".into();

        let record =
            assemble(Source::Bhx, product, "2025-03-01", AssembleOptions::default());
        assert_eq!(record.source, "bachhoaxanh");
        assert_eq!(record.brand, "Tiger");
        assert_eq!(record.unit, "Thùng");
        assert_eq!(record.packing, "24");
        assert_eq!(record.capacity, "330ml");
        assert_eq!(record.price, 450_000);
        assert_eq!(record.price_after_promotion, 410_000);
        assert_eq!(record.promotion, "9%");
        assert_eq!(record.size, "");
        assert_eq!(record.product_key, "TIGER_330ML_24");
        assert_eq!(record.crawl_date, "2025-03-01");
        assert_eq!(record.normalized_name, "thung 24 lon bia tiger crystal 330ml");
    }

    #[test]
    fn assemble_clamps_unlikely_pack_counts() {
        let mut product = raw("Bia 333 thùng");
        product.price_after = 300_000;
        let record =
            assemble(Source::Lotte, product, "2025-03-01", AssembleOptions::default());
        // "333" is a brand number, not a pack of 333 cans.
        assert_eq!(record.packing, "1");
    }

    #[test]
    fn assemble_falls_back_to_discounted_price() {
        let mut product = raw("Bia Heineken Sleek 330ml");
        product.price_after = 19_500;
        let record =
            assemble(Source::Mega, product, "2025-03-01", AssembleOptions::default());
        assert_eq!(record.price, 19_500);
        assert_eq!(record.price_after_promotion, 19_500);
        assert_eq!(record.promotion, "");
    }

    #[test]
    fn cheap_listing_without_unit_counts_as_a_can() {
        let mut product = raw("Bia Heineken Sleek 330ml");
        product.price_after = 19_500;
        let options = AssembleOptions {
            assume_single_can_below: Some(40_000),
            ..AssembleOptions::default()
        };
        let record = assemble(Source::Bhx, product, "2025-03-01", options);
        assert_eq!(record.unit, "Lon");
        assert_eq!(record.product_key, "HEINEKEN_330ML_1");
    }

    #[test]
    fn crate_priced_listing_keeps_its_empty_unit() {
        let mut product = raw("Bia Tiger 330ml x24");
        product.price_after = 410_000;
        let options = AssembleOptions {
            assume_single_can_below: Some(40_000),
            ..AssembleOptions::default()
        };
        let record = assemble(Source::Bhx, product, "2025-03-01", options);
        assert_eq!(record.unit, "");
    }

    #[test]
    fn promotion_inferred_from_price_pair_when_enabled() {
        let options = AssembleOptions {
            infer_promotion_from_prices: true,
            ..AssembleOptions::default()
        };

        let mut product = raw("Bia Sapporo Premium 330ml");
        product.price_after = 88_000;
        product.price_original = 100_000;
        let record = assemble(Source::Lotte, product.clone(), "2025-03-01", options);
        assert_eq!(record.promotion, "12%");

        product.price_after = 87_500;
        let record = assemble(Source::Lotte, product.clone(), "2025-03-01", options);
        assert_eq!(record.promotion, "12.5%");

        // A visible badge wins over the computed value.
        product.promo_text = "-4%".into();
        let record = assemble(Source::Lotte, product, "2025-03-01", options);
        assert_eq!(record.promotion, "4%");
    }

    #[test]
    fn promotion_not_inferred_without_a_real_discount() {
        let options = AssembleOptions {
            infer_promotion_from_prices: true,
            ..AssembleOptions::default()
        };
        let mut product = raw("Bia Sapporo Premium 330ml");
        product.price_after = 100_000;
        product.price_original = 100_000;
        let record = assemble(Source::Coop, product, "2025-03-01", options);
        assert_eq!(record.promotion, "");
    }

    #[test]
    fn hints_override_derivation() {
        let mut product = raw("Bia Corona Extra 24 x 250ml");
        product.unit_hint = "Thùng".into();
        product.brand_hint = "Corona".into();
        product.price_after = 1_200_000;
        let record =
            assemble(Source::Coop, product, "2025-03-01", AssembleOptions::default());
        assert_eq!(record.unit, "Thùng");
        assert_eq!(record.brand, "Corona");
        assert_eq!(record.packing, "24");
        assert_eq!(record.product_key, "CORONA_250ML_24");
    }
}
