//! Kalshi API client
//!
//! Read-only access to the authenticated portfolio fills, which the relay
//! uses as its last-resort trade source.

use crate::auth::{
    KalshiCredentials, HEADER_ACCESS_KEY, HEADER_ACCESS_SIGNATURE, HEADER_ACCESS_TIMESTAMP,
};
use crate::types::FillsResponse;
use chrono::Utc;
use relay_core::{RelayError, Trade};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Base URL for Kalshi API
pub const KALSHI_API_BASE: &str = "https://api.elections.kalshi.com/trade-api/v2";
pub const KALSHI_DEMO_API_BASE: &str = "https://demo-api.kalshi.co/trade-api/v2";

/// Kalshi API client
#[derive(Clone)]
pub struct KalshiClient {
    client: Client,
    base_url: String,
    credentials: Option<KalshiCredentials>,
}

impl KalshiClient {
    /// Create a new client against `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: None,
        })
    }

    /// Attach signing credentials
    pub fn with_credentials(mut self, credentials: KalshiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the client is authenticated
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Helper to ensure authentication
    fn require_auth(&self) -> Result<&KalshiCredentials, RelayError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| RelayError::not_configured("Kalshi credentials not set"))
    }

    /// Get the most recent portfolio fills, newest first
    ///
    /// Fills that cannot be converted into trades are skipped.
    #[instrument(skip(self))]
    pub async fn get_fills(&self, limit: u32) -> Result<Vec<Trade>, RelayError> {
        let credentials = self.require_auth()?;
        let url = format!("{}/portfolio/fills?limit={}", self.base_url, limit);

        let path = url::Url::parse(&url)
            .map_err(|e| RelayError::config(format!("Invalid Kalshi URL {}: {}", url, e)))?
            .path()
            .to_string();
        let headers = credentials.sign_request("GET", &path, Utc::now().timestamp_millis())?;

        debug!("Fetching Kalshi portfolio fills from: {}", url);

        let response = self
            .client
            .get(&url)
            .header(HEADER_ACCESS_KEY, headers.access_key)
            .header(HEADER_ACCESS_SIGNATURE, headers.signature)
            .header(HEADER_ACCESS_TIMESTAMP, headers.timestamp)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::timeout(format!("Kalshi fills request timed out: {}", e))
                } else {
                    RelayError::unreachable(format!("Failed to fetch fills: {}", e))
                }
            })?;

        if response.status().as_u16() == 401 {
            return Err(RelayError::api("Invalid or expired Kalshi API key"));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::api(format!(
                "Kalshi API error ({}): {}",
                status, body
            )));
        }

        let fills_response: FillsResponse = response
            .json()
            .await
            .map_err(|e| RelayError::malformed(format!("Failed to parse fills: {}", e)))?;

        let trades = fills_response
            .fills
            .iter()
            .filter_map(|fill| match fill.to_trade() {
                Ok(trade) => Some(trade),
                Err(e) => {
                    warn!("Skipping Kalshi fill: {}", e);
                    None
                }
            })
            .collect();

        Ok(trades)
    }
}

impl std::fmt::Debug for KalshiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}
