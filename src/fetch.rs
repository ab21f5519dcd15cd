use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::fmt;
use tracing::debug;

const STORE_API_BASE: &str = "https://www.woolworths.co.nz/";

/// Raw outcome of one product-detail request. Non-2xx statuses are data for
/// the parser, not errors; only transport failures surface as `Err` from a
/// [`ProductSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub url: String,
    pub body: String,
}

#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch(&self, stock_code: &str) -> Result<FetchedPage>;
}

/// Production fetcher against the store's product API.
#[derive(Clone)]
pub struct StoreClient {
    http: Client,
    base_url: Url,
}

impl fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    pub fn new() -> Self {
        let base_url = Url::parse(STORE_API_BASE).expect("valid default store URL");
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: Url) -> Self {
        // The store rejects requests without a browser-looking user agent.
        let http = Client::builder()
            .user_agent(
                "Mozilla/5.0 (iPhone; CPU iPhone OS 12_0 like Mac OS X) \
                 AppleWebKit/605.1.15 (KHTML, like Gecko) Version/12.0 Mobile/15E148 Safari/604.1",
            )
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self { http, base_url }
    }

    pub fn product_url(&self, stock_code: &str) -> Result<Url> {
        self.base_url
            .join(&format!("api/v1/products/{stock_code}"))
            .context("invalid store base URL")
    }
}

impl Default for StoreClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProductSource for StoreClient {
    async fn fetch(&self, stock_code: &str) -> Result<FetchedPage> {
        let url = self.product_url(stock_code)?;
        debug!(%url, "requesting product");
        let res = self
            .http
            .get(url.clone())
            .header("x-requested-with", "OnlineShopping.WebApp")
            .send()
            .await
            .context("failed to reach the store")?;

        let status = res.status().as_u16();
        let body = res
            .text()
            .await
            .context("failed to read product response body")?;
        Ok(FetchedPage {
            status,
            url: url.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_url_joins_stock_code() {
        let client = StoreClient::new();
        let url = client.product_url("32467").unwrap();
        assert_eq!(url.path(), "/api/v1/products/32467");
    }

    #[test]
    fn product_url_respects_base_override() {
        let base = Url::parse("http://127.0.0.1:8080/").unwrap();
        let client = StoreClient::with_base_url(base);
        let url = client.product_url("999").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/v1/products/999");
    }
}
