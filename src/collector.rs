//! Fans product fetches out over a bounded number of connections and folds
//! the parsed records into one sorted table.
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::fetch::ProductSource;
use crate::parser::parse_product;
use crate::product::{ProductRecord, ProductTable};

pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

/// Fetch and parse every stock code, at most `max_in_flight` requests in
/// flight at a time. Each code yields exactly one record: a transport
/// failure degrades that one row to the null-filled form instead of
/// aborting the batch.
pub async fn collect(
    source: &dyn ProductSource,
    stock_codes: &[String],
    max_in_flight: usize,
) -> ProductTable {
    if stock_codes.is_empty() {
        return ProductTable::empty();
    }

    let mut indexed: Vec<(usize, ProductRecord)> =
        stream::iter(stock_codes.iter().enumerate())
            .map(|(index, code)| async move {
                let record = match source.fetch(code).await {
                    Ok(page) => parse_product(code, &page),
                    Err(err) => {
                        warn!(?err, stock_code = %code, "fetch failed; recording as unavailable");
                        ProductRecord::unavailable(code, Utc::now())
                    }
                };
                (index, record)
            })
            .buffer_unordered(max_in_flight.max(1))
            .collect()
            .await;

    // Restore request order before the discount sort so the concurrency cap
    // never changes how ties break.
    indexed.sort_by_key(|(index, _)| *index);
    ProductTable::from_records(indexed.into_iter().map(|(_, record)| record).collect())
}
