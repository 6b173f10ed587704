//! License extraction from GitHub repository pages.
//!
//! GitHub renders file listings client-side but ships the data inline: the
//! directory table carries one cell per entry, and blob pages embed the file
//! payload as JSON in a `react-app.embeddedData` script tag. The scraper
//! finds LICENSE-titled file rows, fetches each blob page, and pulls the
//! text out of the embedded payload.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use meeplesync_shared::{MeeplesyncError, Result};

use crate::make_link;

/// User-Agent string for scrape requests.
const USER_AGENT: &str = concat!("meeplesync/", env!("CARGO_PKG_VERSION"));

/// License text recovered from a repository, possibly spanning multiple
/// LICENSE files.
#[derive(Debug, Clone)]
pub struct ResolvedLicense {
    /// Concatenated license text.
    pub content: String,
    /// Comma-joined source file names.
    pub file: String,
}

/// Scraper for repository hosting pages.
pub struct GithubScraper {
    client: Client,
    url_prefix: String,
}

impl GithubScraper {
    /// Create a scraper resolving relative links against `url_prefix`.
    pub fn new(url_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MeeplesyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url_prefix: url_prefix.into(),
        })
    }

    /// Scrape the repository page at `url` for LICENSE files.
    ///
    /// Returns `None` when the listing has no matching rows or the blob
    /// pages carry no usable payload.
    // TODO: fetch the tree for the manifest's pinned version instead of the
    // default branch; some package versions are ancient.
    pub async fn license_from_repo(&self, url: &str) -> Result<Option<ResolvedLicense>> {
        let page_url = make_link(url, &self.url_prefix);
        let listing = self.get(&page_url).await?;

        let links = license_file_links(&listing);
        if links.is_empty() {
            debug!(url = %page_url, "no LICENSE rows in directory listing");
            return Ok(None);
        }

        let mut found: Vec<ResolvedLicense> = Vec::new();
        for href in links {
            let blob_url = make_link(&href, &self.url_prefix);
            let blob_page = self.get(&blob_url).await?;
            match license_from_blob_page(&blob_page)? {
                Some(license) => found.push(license),
                None => warn!(url = %blob_url, "blob page without embedded payload"),
            }
        }

        if found.is_empty() {
            return Ok(None);
        }
        Ok(Some(ResolvedLicense {
            content: found
                .iter()
                .map(|l| l.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            file: found
                .iter()
                .map(|l| l.file.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }))
    }

    async fn get(&self, url: &str) -> Result<String> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MeeplesyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MeeplesyncError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| MeeplesyncError::Network(format!("{url}: body read failed: {e}")))
    }
}

/// Hrefs of directory rows whose anchor is titled like a LICENSE file.
/// The aria-label check excludes directories named LICENSE.
fn license_file_links(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let anchor_sel = Selector::parse("td.react-directory-row-name-cell-large-screen a")
        .expect("static selector");

    doc.select(&anchor_sel)
        .filter(|a| {
            let title = a.value().attr("title").unwrap_or("");
            let aria = a.value().attr("aria-label").unwrap_or("");
            title.to_ascii_lowercase().contains("license") && aria.contains("(File)")
        })
        .filter_map(|a| a.value().attr("href").map(str::to_string))
        .collect()
}

/// Extract the license text from a blob page's embedded JSON payload.
fn license_from_blob_page(html: &str) -> Result<Option<ResolvedLicense>> {
    let doc = Html::parse_document(html);
    let script_sel = Selector::parse(r#"script[data-target="react-app.embeddedData"]"#)
        .expect("static selector");

    let Some(script) = doc.select(&script_sel).next() else {
        return Ok(None);
    };
    let json: String = script.text().collect();
    parse_blob_payload(&json)
}

/// Read `payload.blob` from the embedded JSON: raw lines joined when
/// present, otherwise the rich-text HTML converted to Markdown.
fn parse_blob_payload(json: &str) -> Result<Option<ResolvedLicense>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| MeeplesyncError::License(format!("bad embedded payload: {e}")))?;
    let blob = &value["payload"]["blob"];
    if blob.is_null() {
        return Ok(None);
    }

    let file = blob["displayName"].as_str().unwrap_or("LICENSE").to_string();

    let content = match blob["rawLines"].as_array() {
        Some(lines) if !lines.is_empty() => lines
            .iter()
            .filter_map(|l| l.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => {
            let rich = blob["richText"].as_str().unwrap_or("");
            if rich.is_empty() {
                return Ok(None);
            }
            htmd::convert(rich)
                .map_err(|e| MeeplesyncError::License(format!("rich text conversion: {e}")))?
        }
    };

    Ok(Some(ResolvedLicense { content, file }))
}
