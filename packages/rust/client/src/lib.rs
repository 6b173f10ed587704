//! HTTP client for the XML API, with transient-error retry.
//!
//! The public API (and its data-dump mirror) rate-limits aggressively, so a
//! batch run is expected to hit 429s. Those, 502s, and transport-level
//! failures are recovered by sleeping and reissuing the identical request
//! per the configured [`RetryConfig`]; any other error status is fatal and
//! aborts the run.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use meeplesync_shared::{MeeplesyncError, Result, RetryConfig};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("meeplesync/", env!("CARGO_PKG_VERSION"));

/// Error statuses that indicate a transient upstream condition.
const RETRYABLE_STATUSES: [StatusCode; 2] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
];

/// Build the `/thing` lookup URL for a batch of identifiers.
pub fn thing_url(base_url: &str, ids: &str, stats: bool) -> String {
    let stats_flag = if stats { 1 } else { 0 };
    format!("{}/thing?id={ids}&stats={stats_flag}", base_url.trim_end_matches('/'))
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// Thin wrapper around `reqwest::Client` that owns the retry policy.
pub struct ApiClient {
    client: Client,
    retry: RetryConfig,
}

impl ApiClient {
    /// Create a client with the given retry policy.
    pub fn new(retry: RetryConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MeeplesyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, retry })
    }

    /// Fetch `url`, retrying transient failures until the policy gives up.
    ///
    /// Returns the response body on 2xx. 429/502 and transport errors sleep
    /// and reissue; other error statuses propagate immediately.
    pub async fn get_with_retry(&self, url: &str) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            match self.try_get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if is_transient(&e) => {
                    if !self.retry.allows(attempt) {
                        warn!(url, attempts = attempt + 1, "retry budget exhausted");
                        return Err(e);
                    }
                    let delay = self.retry.delay(attempt);
                    warn!(
                        url,
                        error = %e,
                        delay_secs = delay.as_secs(),
                        "transient error, waiting before resubmitting request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One GET attempt: transport failures map to `Network`, error statuses
    /// to `Http`.
    async fn try_get(&self, url: &str) -> Result<String> {
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MeeplesyncError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            if RETRYABLE_STATUSES.contains(&status) {
                return Err(MeeplesyncError::Network(format!("{url}: HTTP {status}")));
            }
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

/// True for errors the fetch loop recovers from by sleeping and retrying.
fn is_transient(e: &MeeplesyncError) -> bool {
    matches!(e, MeeplesyncError::Network(_))
}
