//! End-to-end watcher run: read the watchlist, collect the table, narrow it
//! to sales when asked, then email and persist the result.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::collector::{collect, DEFAULT_MAX_IN_FLIGHT};
use crate::fetch::ProductSource;
use crate::mailer::{render_html, render_text, EmailBody, Mailer, OutgoingEmail};
use crate::product::{ProductTable, DEFAULT_SALES_COLUMNS};
use crate::watchlist::{self, Watchlist};

/// Knobs for one watcher run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write the table here instead of returning it for stdout.
    pub out_path: Option<PathBuf>,
    /// Narrow the table to discounted items before output.
    pub sales_only: bool,
    /// Plaintext email body instead of HTML.
    pub as_plaintext: bool,
    pub max_in_flight: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            out_path: None,
            sales_only: false,
            as_plaintext: false,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

/// Run the full pipeline. Watchlist validation failures abort before any
/// product fetch; mailer and filesystem failures propagate to the caller.
pub async fn run(
    watchlist_location: &str,
    source: &dyn ProductSource,
    mailer: Option<&dyn Mailer>,
    options: &RunOptions,
) -> Result<ProductTable> {
    let watchlist = read_watchlist(watchlist_location).await?;
    info!(
        name = %watchlist.name,
        items = watchlist.items.len(),
        "watchlist loaded"
    );

    let stock_codes = watchlist.stock_codes();
    let table = collect(source, &stock_codes, options.max_in_flight).await;
    info!(rows = table.len(), "collection finished");

    let (table, subject) = if options.sales_only {
        let sales = table.filter_sales(DEFAULT_SALES_COLUMNS);
        let subject = format!("{} sales on your watchlist", sales.len());
        (sales, subject)
    } else {
        let subject = format!("{} items on your watchlist", table.len());
        (table, subject)
    };

    if let Some(mailer) = mailer {
        if watchlist.recipients.is_empty() {
            warn!("mailer configured but the watchlist names no recipients; skipping email");
        } else {
            let body = if options.as_plaintext {
                EmailBody::Plaintext(render_text(&table))
            } else {
                EmailBody::Html(render_html(&table))
            };
            let email = OutgoingEmail {
                to: watchlist.recipients.clone(),
                subject,
                body,
            };
            mailer
                .send(&email)
                .await
                .context("failed to send watchlist email")?;
            info!(recipients = email.to.len(), "watchlist email sent");
        }
    }

    if let Some(out_path) = &options.out_path {
        write_csv(&table, out_path)?;
        info!(path = %out_path.display(), "wrote product table");
    }

    Ok(table)
}

/// Write the table as CSV, creating missing parent directories.
pub fn write_csv(table: &ProductTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create output directory")?;
        }
    }
    std::fs::write(path, table.to_csv()?).context("failed to write product table")
}

async fn read_watchlist(location: &str) -> Result<Watchlist> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let url = watchlist::convert_google_sheet_url(location);
        let body = reqwest::get(&url)
            .await
            .context("failed to fetch watchlist")?
            .error_for_status()
            .context("watchlist fetch returned an error status")?
            .text()
            .await
            .context("failed to read watchlist body")?;
        Ok(watchlist::parse_csv_watchlist(&body)?)
    } else {
        Ok(watchlist::load(Path::new(location))?)
    }
}
