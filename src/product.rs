//! Canonical product records and the aggregate table built from one run.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Everything we know about a single stock code at `fetched_at`.
/// Fields the upstream did not provide stay `None`; a record is never
/// mutated after the parser hands it over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductRecord {
    pub stock_code: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub size: Option<String>,
    pub sale_price: Option<f64>,
    pub normal_price: Option<f64>,
    pub unit_price: Option<f64>,
    pub unit_size: Option<String>,
    pub discount_percentage: Option<f64>,
    pub fetched_at: DateTime<Utc>,
}

impl ProductRecord {
    /// Record for a stock code whose page could not be fetched or did not
    /// look like a product page. Only the identity and timestamp survive.
    pub fn unavailable(stock_code: &str, fetched_at: DateTime<Utc>) -> Self {
        Self {
            stock_code: stock_code.to_string(),
            name: None,
            description: None,
            size: None,
            sale_price: None,
            normal_price: None,
            unit_price: None,
            unit_size: None,
            discount_percentage: None,
            fetched_at,
        }
    }

    pub fn on_sale(&self) -> bool {
        matches!(self.discount_percentage, Some(d) if d > 0.0)
    }

    /// Cell text for one column, as it appears in CSV and email output.
    /// Floats are fixed to two decimals, timestamps to RFC 3339 seconds,
    /// and missing values render as the empty string.
    pub fn cell(&self, column: Column) -> String {
        fn float(value: Option<f64>) -> String {
            value.map(|v| format!("{v:.2}")).unwrap_or_default()
        }
        fn text(value: &Option<String>) -> String {
            value.clone().unwrap_or_default()
        }

        match column {
            Column::StockCode => self.stock_code.clone(),
            Column::Name => text(&self.name),
            Column::Description => text(&self.description),
            Column::Size => text(&self.size),
            Column::SalePrice => float(self.sale_price),
            Column::NormalPrice => float(self.normal_price),
            Column::UnitPrice => float(self.unit_price),
            Column::UnitSize => text(&self.unit_size),
            Column::DiscountPercentage => float(self.discount_percentage),
            Column::FetchedAt => self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Relative markdown of the sale price against the reference price, one
/// decimal place. A zero reference price yields `0` rather than a division
/// error; a missing sale or reference price yields `None`.
pub fn discount(sale: Option<f64>, normal: Option<f64>) -> Option<f64> {
    match (sale, normal) {
        (_, Some(n)) if n == 0.0 => Some(0.0),
        (Some(s), Some(n)) => Some((100.0 * (1.0 - s / n) * 10.0).round() / 10.0),
        _ => None,
    }
}

/// The canonical column set, in table order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Column {
    StockCode,
    Name,
    Description,
    Size,
    SalePrice,
    NormalPrice,
    UnitPrice,
    UnitSize,
    DiscountPercentage,
    FetchedAt,
}

pub const ALL_COLUMNS: &[Column] = &[
    Column::StockCode,
    Column::Name,
    Column::Description,
    Column::Size,
    Column::SalePrice,
    Column::NormalPrice,
    Column::UnitPrice,
    Column::UnitSize,
    Column::DiscountPercentage,
    Column::FetchedAt,
];

/// Default reporting subset for the sales-only view. Callers may pass any
/// other subset to [`ProductTable::filter_sales`].
pub const DEFAULT_SALES_COLUMNS: &[Column] = &[
    Column::Name,
    Column::StockCode,
    Column::Size,
    Column::SalePrice,
    Column::NormalPrice,
    Column::DiscountPercentage,
];

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::StockCode => "stock_code",
            Column::Name => "name",
            Column::Description => "description",
            Column::Size => "size",
            Column::SalePrice => "sale_price",
            Column::NormalPrice => "normal_price",
            Column::UnitPrice => "unit_price",
            Column::UnitSize => "unit_size",
            Column::DiscountPercentage => "discount_percentage",
            Column::FetchedAt => "fetched_at",
        }
    }
}

/// One run's aggregate, ordered by discount descending. An empty run still
/// carries the full column set so downstream output keeps its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductTable {
    columns: Vec<Column>,
    rows: Vec<ProductRecord>,
}

impl ProductTable {
    pub fn empty() -> Self {
        Self {
            columns: ALL_COLUMNS.to_vec(),
            rows: Vec::new(),
        }
    }

    /// Build a table from records in fetch order. The sort is stable, so
    /// records with equal discounts keep their fetch order, and records
    /// without a discount sort last.
    pub fn from_records(mut rows: Vec<ProductRecord>) -> Self {
        fn rank(d: Option<f64>) -> f64 {
            d.unwrap_or(f64::NEG_INFINITY)
        }
        rows.sort_by(|a, b| rank(b.discount_percentage).total_cmp(&rank(a.discount_percentage)));
        Self {
            columns: ALL_COLUMNS.to_vec(),
            rows,
        }
    }

    pub fn rows(&self) -> &[ProductRecord] {
        &self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only rows with a strictly positive discount and narrow the
    /// reported columns to `columns`. Produces a new table; zero and
    /// missing discounts both drop.
    pub fn filter_sales(&self, columns: &[Column]) -> ProductTable {
        ProductTable {
            columns: columns.to_vec(),
            rows: self.rows.iter().filter(|r| r.on_sale()).cloned().collect(),
        }
    }

    /// Serialize to CSV with a header row, columns in table order.
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(self.columns.iter().map(|c| c.as_str()))
            .context("failed to write CSV header")?;
        for row in &self.rows {
            writer
                .write_record(self.columns.iter().map(|c| row.cell(*c)))
                .context("failed to write CSV row")?;
        }
        let bytes = writer.into_inner().context("failed to flush CSV writer")?;
        String::from_utf8(bytes).context("CSV output was not valid UTF-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(stock_code: &str, sale: Option<f64>, normal: Option<f64>) -> ProductRecord {
        let fetched_at = Utc.with_ymd_and_hms(2021, 10, 18, 9, 30, 0).unwrap();
        let mut r = ProductRecord::unavailable(stock_code, fetched_at);
        r.sale_price = sale;
        r.normal_price = normal;
        r.discount_percentage = discount(sale, normal);
        r
    }

    #[test]
    fn discount_rounds_to_one_decimal() {
        assert_eq!(discount(Some(3.0), Some(3.33)), Some(9.9));
        assert_eq!(discount(Some(2.5), Some(5.0)), Some(50.0));
    }

    #[test]
    fn discount_null_sale_is_null() {
        assert_eq!(discount(None, Some(4.2)), None);
        assert_eq!(discount(None, None), None);
    }

    #[test]
    fn discount_zero_reference_price_is_zero() {
        assert_eq!(discount(Some(1.0), Some(0.0)), Some(0.0));
        assert_eq!(discount(None, Some(0.0)), Some(0.0));
    }

    #[test]
    fn discount_missing_reference_price_is_null() {
        assert_eq!(discount(Some(1.0), None), None);
    }

    #[test]
    fn table_sorts_by_discount_descending_nulls_last() {
        let table = ProductTable::from_records(vec![
            record("a", None, None),
            record("b", Some(9.0), Some(10.0)),
            record("c", Some(5.0), Some(10.0)),
            record("d", Some(9.0), Some(10.0)),
        ]);
        let order: Vec<&str> = table.rows().iter().map(|r| r.stock_code.as_str()).collect();
        // c (50%) first, then b and d (10%) keeping fetch order, null last
        assert_eq!(order, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn empty_table_keeps_full_column_set() {
        let table = ProductTable::empty();
        assert!(table.is_empty());
        assert_eq!(table.columns(), ALL_COLUMNS);
    }

    #[test]
    fn filter_sales_on_empty_table_keeps_schema() {
        let filtered = ProductTable::empty().filter_sales(DEFAULT_SALES_COLUMNS);
        assert!(filtered.is_empty());
        assert_eq!(filtered.columns(), DEFAULT_SALES_COLUMNS);
    }

    #[test]
    fn filter_sales_keeps_strictly_positive_discounts_only() {
        let table = ProductTable::from_records(vec![
            record("discounted", Some(8.0), Some(10.0)),
            record("full-price", Some(10.0), Some(10.0)),
            record("unavailable", None, None),
            record("zero-reference", Some(1.0), Some(0.0)),
        ]);
        let sales = table.filter_sales(DEFAULT_SALES_COLUMNS);
        assert_eq!(sales.len(), 1);
        assert_eq!(sales.rows()[0].stock_code, "discounted");
    }

    #[test]
    fn csv_formats_floats_to_two_decimals() {
        let table = ProductTable::from_records(vec![record("32467", Some(3.0), Some(3.33))]);
        let csv = table.to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "stock_code,name,description,size,sale_price,normal_price,unit_price,unit_size,discount_percentage,fetched_at"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("32467,"), "row was: {row}");
        assert!(row.contains("3.00"));
        assert!(row.contains("3.33"));
        assert!(row.contains("9.90"));
        assert!(row.contains("2021-10-18T09:30:00Z"));
    }

    #[test]
    fn csv_for_empty_table_is_just_the_header() {
        let csv = ProductTable::empty().to_csv().unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
