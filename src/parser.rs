//! Turns one raw product response into a canonical [`ProductRecord`].
//!
//! Parsing cannot fail: a bad status, an unrecognized body, or any missing
//! field degrades to `None` values on the record, so a batch run always gets
//! exactly one record per stock code.
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::fetch::FetchedPage;
use crate::product::{discount, ProductRecord};

static PRICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d{2}").expect("price pattern"));
static STOCK_CODE_IN_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:products/|stockcode=)(\w+)").expect("stock code pattern"));
static MARKUP_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("markup tag pattern"));

/// The two upstream payload shapes we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// JSON payload from the store's v1 products endpoint.
    Api,
    /// Server-rendered product detail page.
    Markup,
}

impl ResponseShape {
    pub fn detect(body: &str) -> ResponseShape {
        if body.trim_start().starts_with('{') {
            ResponseShape::Api
        } else {
            ResponseShape::Markup
        }
    }
}

/// Parse one response into a record. The stock code embedded in the request
/// URL wins over `stock_code` when both are present, so the record always
/// names the product that was actually requested.
pub fn parse_product(stock_code: &str, page: &FetchedPage) -> ProductRecord {
    let code = stock_code_from_url(&page.url).unwrap_or(stock_code);
    let mut record = ProductRecord::unavailable(code, Utc::now());

    if page.status != 200 {
        return record;
    }

    match ResponseShape::detect(&page.body) {
        ResponseShape::Api => fill_from_api(&mut record, &page.body),
        ResponseShape::Markup => fill_from_markup(&mut record, &page.body),
    }
    record
}

fn stock_code_from_url(url: &str) -> Option<&str> {
    STOCK_CODE_IN_URL
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Pull the first `d+.dd` decimal out of a price string, ignoring currency
/// symbols and label text around it.
pub fn price_to_float(price_text: &str) -> Option<f64> {
    PRICE_PATTERN
        .find(price_text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Capitalize the first letter of each whitespace-separated word and
/// lowercase the rest.
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip inline markup tags from descriptive text.
pub fn strip_markup(text: &str) -> String {
    MARKUP_TAG.replace_all(text, "").trim().to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProduct {
    // `name` doubles as the product indicator: a 200 body without it is not
    // a product payload and the whole record degrades.
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    size: Option<ApiSize>,
    #[serde(default)]
    price: Option<ApiPrice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSize {
    #[serde(default)]
    volume_size: Option<String>,
    #[serde(default)]
    cup_price: Option<f64>,
    #[serde(default)]
    cup_measure: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPrice {
    #[serde(default)]
    sale_price: Option<f64>,
    #[serde(default)]
    original_price: Option<f64>,
}

fn fill_from_api(record: &mut ProductRecord, body: &str) {
    let product: ApiProduct = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) => return,
    };

    record.name = Some(title_case(&product.name));
    record.description = product
        .description
        .as_deref()
        .map(strip_markup)
        .filter(|d| !d.is_empty());
    if let Some(size) = product.size {
        record.size = size.volume_size.filter(|s| !s.trim().is_empty());
        record.unit_price = size.cup_price;
        record.unit_size = size.cup_measure.filter(|s| !s.trim().is_empty());
    }
    if let Some(price) = product.price {
        record.sale_price = price.sale_price;
        record.normal_price = price.original_price;
    }
    record.discount_percentage = discount(record.sale_price, record.normal_price);
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn region_text(doc: &Html, css: &str) -> Option<String> {
    let selector = sel(css);
    let node = doc.select(&selector).next()?;
    let text = node.text().collect::<Vec<_>>().join(" ");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn fill_from_markup(record: &mut ProductRecord, body: &str) {
    let doc = Html::parse_document(body);

    // Pages without the stockcode input are category pages, error pages, or
    // delisted products; treat them like a failed fetch.
    if doc.select(&sel(r#"input[name="stockcode"]"#)).next().is_none() {
        return;
    }

    record.name = region_text(&doc, "div.product-title h1").map(|n| title_case(&n));
    record.description = region_text(&doc, "p.product-description-text")
        .map(|d| strip_markup(&d))
        .filter(|d| !d.is_empty());
    record.size = region_text(&doc, "span.volume-size");
    record.unit_price = region_text(&doc, "div.cup-price").and_then(|t| price_to_float(&t));

    // Three mutually exclusive price layouts; first match wins.
    if let Some(special) = region_text(&doc, "span.special-price") {
        record.sale_price = price_to_float(&special);
        record.normal_price = region_text(&doc, "span.was-price")
            .map(|t| t.replace("was", ""))
            .and_then(|t| price_to_float(&t));
    } else if let Some(club) = region_text(&doc, "span.club-price-wrapper") {
        record.sale_price = price_to_float(&club);
        record.normal_price = region_text(&doc, "span.non-club-price")
            .map(|t| t.replace("non club price", ""))
            .and_then(|t| price_to_float(&t));
    } else if let Some(plain) = region_text(&doc, "span.price") {
        record.normal_price = price_to_float(&plain);
    }

    record.discount_percentage = discount(record.sale_price, record.normal_price);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, url: &str, body: &str) -> FetchedPage {
        FetchedPage {
            status,
            url: url.to_string(),
            body: body.to_string(),
        }
    }

    fn api_url(code: &str) -> String {
        format!("https://www.woolworths.co.nz/api/v1/products/{code}")
    }

    #[test]
    fn api_payload_parses_into_full_record() {
        let body = r#"{
            "name": "green tea",
            "description": "<p>d</p>",
            "size": {"volumeSize": "90g", "cupMeasure": "100g", "cupPrice": 3.3},
            "price": {"originalPrice": 3.33, "salePrice": 3}
        }"#;
        let record = parse_product("32467", &page(200, &api_url("32467"), body));

        assert_eq!(record.stock_code, "32467");
        assert_eq!(record.name.as_deref(), Some("Green Tea"));
        assert_eq!(record.description.as_deref(), Some("d"));
        assert_eq!(record.size.as_deref(), Some("90g"));
        assert_eq!(record.unit_price, Some(3.3));
        assert_eq!(record.unit_size.as_deref(), Some("100g"));
        assert_eq!(record.sale_price, Some(3.0));
        assert_eq!(record.normal_price, Some(3.33));
        assert_eq!(record.discount_percentage, Some(9.9));
    }

    #[test]
    fn non_200_status_degrades_to_null_record() {
        let record = parse_product("999", &page(404, &api_url("999"), "not found"));
        assert_eq!(record.stock_code, "999");
        assert_eq!(record.name, None);
        assert_eq!(record.sale_price, None);
        assert_eq!(record.normal_price, None);
        assert_eq!(record.discount_percentage, None);
    }

    #[test]
    fn api_body_without_indicator_degrades() {
        let record = parse_product("1", &page(200, &api_url("1"), r#"{"error": "gone"}"#));
        assert_eq!(record.name, None);
        assert_eq!(record.discount_percentage, None);
    }

    #[test]
    fn malformed_json_degrades() {
        let record = parse_product("1", &page(200, &api_url("1"), "{not json"));
        assert_eq!(record.name, None);
    }

    #[test]
    fn zero_reference_price_yields_zero_discount() {
        let body = r#"{"name": "freebie", "price": {"originalPrice": 0, "salePrice": 1}}"#;
        let record = parse_product("7", &page(200, &api_url("7"), body));
        assert_eq!(record.discount_percentage, Some(0.0));
    }

    #[test]
    fn stock_code_prefers_url_over_argument() {
        let record = parse_product("mismatch", &page(404, &api_url("32467"), ""));
        assert_eq!(record.stock_code, "32467");
    }

    #[test]
    fn stock_code_falls_back_to_argument() {
        let record = parse_product("555", &page(404, "https://example.com/", ""));
        assert_eq!(record.stock_code, "555");
    }

    #[test]
    fn shape_detection_sniffs_json_objects() {
        assert_eq!(ResponseShape::detect(r#"  {"name": "x"}"#), ResponseShape::Api);
        assert_eq!(ResponseShape::detect("<html></html>"), ResponseShape::Markup);
    }

    #[test]
    fn price_to_float_ignores_labels_and_symbols() {
        assert_eq!(price_to_float("$3.50"), Some(3.5));
        assert_eq!(price_to_float("was $12.00 each"), Some(12.0));
        assert_eq!(price_to_float("no price here"), None);
    }

    #[test]
    fn title_case_normalizes_words() {
        assert_eq!(title_case("green tea"), "Green Tea");
        assert_eq!(title_case("ALMOND butter"), "Almond Butter");
    }

    #[test]
    fn strip_markup_removes_tags() {
        assert_eq!(strip_markup("<p>Fresh <b>daily</b></p>"), "Fresh daily");
        assert_eq!(strip_markup("plain"), "plain");
    }

    fn markup_url(code: &str) -> String {
        format!("https://shop.example.com/Shop/ProductDetails?stockcode={code}")
    }

    fn product_page(price_markup: &str) -> String {
        format!(
            r#"<html><body>
                <input name="stockcode" value="267945">
                <div class="product-title"><h1>chips sis</h1></div>
                <p class="product-description-text">salty</p>
                <span class="volume-size">150g</span>
                <div class="cup-price">$2.00 / 100g</div>
                {price_markup}
            </body></html>"#
        )
    }

    #[test]
    fn markup_special_price_layout_wins() {
        let body = product_page(
            r#"<span class="special-price">$3.00</span>
               <span class="was-price">was $4.50</span>
               <span class="price">$9.99</span>"#,
        );
        let record = parse_product("267945", &page(200, &markup_url("267945"), &body));

        assert_eq!(record.name.as_deref(), Some("Chips Sis"));
        assert_eq!(record.size.as_deref(), Some("150g"));
        assert_eq!(record.unit_price, Some(2.0));
        assert_eq!(record.sale_price, Some(3.0));
        assert_eq!(record.normal_price, Some(4.5));
        assert_eq!(record.discount_percentage, Some(33.3));
    }

    #[test]
    fn markup_club_price_layout_is_second_choice() {
        let body = product_page(
            r#"<span class="club-price-wrapper">$5.00</span>
               <span class="non-club-price">non club price $6.00</span>"#,
        );
        let record = parse_product("267945", &page(200, &markup_url("267945"), &body));

        assert_eq!(record.sale_price, Some(5.0));
        assert_eq!(record.normal_price, Some(6.0));
        assert_eq!(record.discount_percentage, Some(16.7));
    }

    #[test]
    fn markup_plain_price_leaves_sale_price_unset() {
        let body = product_page(r#"<span class="price">$9.99</span>"#);
        let record = parse_product("267945", &page(200, &markup_url("267945"), &body));

        assert_eq!(record.sale_price, None);
        assert_eq!(record.normal_price, Some(9.99));
        assert_eq!(record.discount_percentage, None);
    }

    #[test]
    fn markup_without_stockcode_input_degrades() {
        let body = r#"<html><body><div class="search-results">nothing</div></body></html>"#;
        let record = parse_product("267945", &page(200, &markup_url("267945"), body));

        assert_eq!(record.stock_code, "267945");
        assert_eq!(record.name, None);
        assert_eq!(record.discount_percentage, None);
    }
}
