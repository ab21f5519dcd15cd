//! Email delivery of the product table through the Mailgun HTTP API.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use tracing::debug;

use crate::product::ProductTable;

const MAILGUN_API_BASE: &str = "https://api.mailgun.net/";

/// A fully rendered outgoing message. The sender address is supplied by the
/// mailer implementation, not the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: EmailBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    Plaintext(String),
    Html(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

#[derive(Clone)]
pub struct MailgunClient {
    http: Client,
    base_url: Url,
    domain: String,
    api_key: String,
}

impl fmt::Debug for MailgunClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunClient")
            .field("base_url", &self.base_url)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl MailgunClient {
    pub fn new(domain: String, api_key: String) -> Self {
        let base_url = Url::parse(MAILGUN_API_BASE).expect("valid default Mailgun URL");
        Self::with_base_url(domain, api_key, base_url)
    }

    pub fn with_base_url(domain: String, api_key: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("shelfwatch/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            domain,
            api_key,
        }
    }

    pub fn build_form(&self, email: &OutgoingEmail) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("from", format!("shelfwatch <postmaster@{}>", self.domain)),
            ("to", email.to.join(", ")),
            ("subject", email.subject.clone()),
        ];
        match &email.body {
            EmailBody::Plaintext(text) => form.push(("text", text.clone())),
            EmailBody::Html(html) => form.push(("html", html.clone())),
        }
        form
    }

    pub fn build_request(&self, email: &OutgoingEmail) -> Result<reqwest::Request> {
        let endpoint = self
            .base_url
            .join(&format!("v3/{}/messages", self.domain))
            .context("invalid Mailgun base URL")?;
        self.http
            .post(endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&self.build_form(email))
            .build()
            .context("failed to build Mailgun request")
    }
}

#[async_trait]
impl Mailer for MailgunClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let request = self.build_request(email)?;
        debug!(url = %request.url(), subject = %email.subject, "sending mail");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach Mailgun")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from Mailgun: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("mailgun error {}: {}", status, body));
        }
        Ok(())
    }
}

/// Render the table as a fixed-width plaintext listing, one line per row.
pub fn render_text(table: &ProductTable) -> String {
    fn pad_line(cells: &[String], widths: &[usize]) -> String {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<w$}", w = *width))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    }

    let headers: Vec<String> = table
        .columns()
        .iter()
        .map(|c| c.as_str().to_string())
        .collect();
    let rows: Vec<Vec<String>> = table
        .rows()
        .iter()
        .map(|r| table.columns().iter().map(|c| r.cell(*c)).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(String::len).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    out.push_str(&pad_line(&headers, &widths));
    out.push('\n');
    for row in &rows {
        out.push_str(&pad_line(row, &widths));
        out.push('\n');
    }
    out
}

/// Render the table as an HTML table element.
pub fn render_html(table: &ProductTable) -> String {
    let mut out = String::from("<table>\n<thead>\n<tr>");
    for column in table.columns() {
        out.push_str(&format!("<th>{}</th>", column.as_str()));
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in table.rows() {
        out.push_str("<tr>");
        for column in table.columns() {
            out.push_str(&format!("<td>{}</td>", escape_html(&row.cell(*column))));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
