//! Watchlist loading and validation.
//!
//! Two on-disk formats are accepted: the YAML document (display name,
//! recipient addresses, and an embedded CSV block of products) and, for
//! `.csv` paths, a flat stock-code table. Validation happens entirely at
//! read time; a watchlist that loads is safe to fetch against.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern"));

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid watchlist: {0}")]
    Invalid(String),
}

/// Raw YAML document, before validation. Missing keys stay `None` so the
/// validator can name exactly what is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WatchlistDoc {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email_addresses: Option<Vec<String>>,
    #[serde(default)]
    products: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchItem {
    pub stock_code: String,
    pub description: Option<String>,
}

/// A validated watchlist: non-empty name, syntactically valid recipient
/// addresses, and at least one unique, non-empty stock code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchlist {
    pub name: String,
    pub recipients: Vec<String>,
    pub items: Vec<WatchItem>,
}

impl Watchlist {
    pub fn stock_codes(&self) -> Vec<String> {
        self.items.iter().map(|i| i.stock_code.clone()).collect()
    }
}

/// Load a watchlist file. Paths ending in `.csv` are read as the flat
/// stock-code table; anything else is the YAML document (see [`example`]).
pub fn load(path: &Path) -> Result<Watchlist, WatchlistError> {
    let content = fs::read_to_string(path)?;
    let is_csv = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        parse_csv_watchlist(&content)
    } else {
        parse_yaml_watchlist(&content)
    }
}

/// Rewrite a Google Sheets URL to its CSV-export form. Other URLs pass
/// through untouched.
pub fn convert_google_sheet_url(url: &str) -> String {
    if !url.starts_with("https://docs.google.com/spreadsheets/d/") {
        return url.to_string();
    }
    match url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/export?format=csv"),
        None => url.to_string(),
    }
}

pub fn parse_yaml_watchlist(content: &str) -> Result<Watchlist, WatchlistError> {
    let doc: WatchlistDoc = serde_yaml::from_str(content)?;

    let name = match doc.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => {
            return Err(WatchlistError::Invalid(
                "name must be a non-empty string".into(),
            ))
        }
    };

    let recipients = doc.email_addresses.unwrap_or_default();
    for address in &recipients {
        if !EMAIL_PATTERN.is_match(address) {
            return Err(WatchlistError::Invalid(format!(
                "invalid email address: {address}"
            )));
        }
    }

    let products = doc
        .products
        .ok_or_else(|| WatchlistError::Invalid("products must be given".into()))?;
    let items = parse_product_block(&products)?;

    Ok(Watchlist {
        name,
        recipients,
        items,
    })
}

/// The flat watchlist of the CSV revision: a `stock_code` column, an
/// optional `description` column, and nothing else required. It names no
/// recipients, so runs against it cannot email.
pub fn parse_csv_watchlist(content: &str) -> Result<Watchlist, WatchlistError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();
    let stock_idx = headers
        .iter()
        .position(|h| h == "stock_code")
        .ok_or_else(|| {
            WatchlistError::Invalid("watchlist must contain the column stock_code".into())
        })?;
    let description_idx = headers.iter().position(|h| h == "description");

    let items = read_items(&mut reader, stock_idx, description_idx)?;
    Ok(Watchlist {
        name: "watchlist".into(),
        recipients: Vec::new(),
        items,
    })
}

fn parse_product_block(csv_text: &str) -> Result<Vec<WatchItem>, WatchlistError> {
    let mut reader = csv::Reader::from_reader(csv_text.trim().as_bytes());
    let headers = reader.headers()?.clone();
    let stock_idx = headers.iter().position(|h| h == "stock_code");
    let description_idx = headers.iter().position(|h| h == "description");
    let (stock_idx, description_idx) = match (stock_idx, description_idx) {
        (Some(stock), Some(description)) => (stock, Some(description)),
        _ => {
            return Err(WatchlistError::Invalid(
                r#"products must have "description" and "stock_code" fields"#.into(),
            ))
        }
    };

    read_items(&mut reader, stock_idx, description_idx)
}

fn read_items(
    reader: &mut csv::Reader<&[u8]>,
    stock_idx: usize,
    description_idx: Option<usize>,
) -> Result<Vec<WatchItem>, WatchlistError> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for result in reader.records() {
        let record = result?;
        let stock_code = record.get(stock_idx).unwrap_or("").trim().to_string();
        if stock_code.is_empty() {
            return Err(WatchlistError::Invalid(
                "stock_code values must be non-empty".into(),
            ));
        }
        if !seen.insert(stock_code.clone()) {
            return Err(WatchlistError::Invalid(format!(
                "duplicate stock_code: {stock_code}"
            )));
        }
        let description = description_idx
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        items.push(WatchItem {
            stock_code,
            description,
        });
    }

    if items.is_empty() {
        return Err(WatchlistError::Invalid(
            "products must contain at least one stock_code".into(),
        ));
    }
    Ok(items)
}

/// Example YAML watchlist, also used as a test fixture.
pub fn example() -> &'static str {
    r#"name: Weekly staples
email_addresses:
  - a@b.com
  - c@d.net
products: |
  description,stock_code
  chips sis,267945
  bagels bro,285453
"#
}
