use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use shelfwatch::collector::DEFAULT_MAX_IN_FLIGHT;
use shelfwatch::fetch::StoreClient;
use shelfwatch::mailer::{Mailer, MailgunClient};
use shelfwatch::pipeline::{self, RunOptions};

/// Get the current prices of your watchlist products.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path or URL of the watchlist (YAML document or stock-code CSV)
    watchlist: String,

    /// Write the product table to this CSV path instead of stdout
    #[arg(short, long)]
    out_path: Option<PathBuf>,

    /// Mailgun domain for emailing the table to the watchlist recipients
    #[arg(long, env = "MAILGUN_DOMAIN")]
    mailgun_domain: Option<String>,

    /// Mailgun API key
    #[arg(long, env = "MAILGUN_KEY")]
    mailgun_key: Option<String>,

    /// Send the email body as plaintext instead of HTML
    #[arg(short = 't', long)]
    plaintext: bool,

    /// Keep only the products currently on sale
    #[arg(short, long)]
    sales_only: bool,

    /// Maximum number of in-flight product requests
    #[arg(long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    max_in_flight: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    let mailer = match (&args.mailgun_domain, &args.mailgun_key) {
        (Some(domain), Some(key)) => Some(MailgunClient::new(domain.clone(), key.clone())),
        _ => None,
    };
    let source = StoreClient::new();
    let options = RunOptions {
        out_path: args.out_path.clone(),
        sales_only: args.sales_only,
        as_plaintext: args.plaintext,
        max_in_flight: args.max_in_flight,
    };

    let table = pipeline::run(
        &args.watchlist,
        &source,
        mailer.as_ref().map(|m| m as &dyn Mailer),
        &options,
    )
    .await?;

    if args.out_path.is_none() {
        print!("{}", table.to_csv()?);
    }
    Ok(())
}
