//! Google Sheets v4 sink.
//!
//! | trait call     | REST call                                          |
//! |----------------|----------------------------------------------------|
//! | `read_rows`    | `GET values/{range}` with `UNFORMATTED_VALUE`       |
//! | `row_capacity` | `GET ?fields=sheets.properties`                    |
//! | `grow_rows`    | `POST :batchUpdate` with `appendDimension`          |
//! | `batch_write`  | `POST values:batchUpdate` with `USER_ENTERED`       |
//! | `write_block`  | `PUT values/{range}` with `USER_ENTERED`            |
//!
//! Throttling and server errors are retried here, at the transport layer;
//! the batch writer above never retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use roster_core::schema::column_letter;
use roster_sync::sheet::quote_sheet_name;
use roster_sync::{RangeWrite, SheetSink, SinkError, SparseRow};

use crate::auth::TokenCache;
use crate::error::RemoteError;
use crate::payload::{
    api_error_message, append_rows_body, batch_update_body, parse_sheet_properties,
    parse_value_range, value_range_body, SheetProperties, USER_ENTERED,
};

pub const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which failed responses are worth repeating, and how often.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            pause: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Retry rate limiting and server-side failures, nothing else.
    pub fn should_retry(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_retries && (status == 429 || (500..600).contains(&status))
    }
}

/// One worksheet of one spreadsheet.
pub struct GoogleSheetsSink {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    tokens: Arc<TokenCache>,
    retry: RetryPolicy,
}

impl GoogleSheetsSink {
    pub fn new(
        spreadsheet_id: &str,
        sheet_name: &str,
        tokens: Arc<TokenCache>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            base_url: API_BASE.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_name: sheet_name.to_string(),
            tokens,
            retry: RetryPolicy::default(),
        })
    }

    /// Point at a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `{base}/{spreadsheet}{suffix}`
    pub fn url(&self, suffix: &str) -> String {
        format!(
            "{}/{}{}",
            self.base_url,
            urlencoding::encode(&self.spreadsheet_id),
            suffix
        )
    }

    /// URL of `values/{range}` with `range` percent-encoded.
    pub fn values_url(&self, a1: &str, query: &str) -> String {
        self.url(&format!("/values/{}?{query}", urlencoding::encode(a1)))
    }

    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<String, SinkError> {
        let mut attempt = 0;
        let mut reauthorized = false;
        loop {
            let bearer = self.tokens.bearer(&self.http).await?;
            let mut request = self.http.request(method.clone(), url).bearer_auth(bearer);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| SinkError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(text);
            }
            if status == StatusCode::UNAUTHORIZED && !reauthorized && self.tokens.can_refresh() {
                tracing::warn!("access token rejected; refreshing");
                self.tokens.invalidate().await;
                reauthorized = true;
                continue;
            }
            if self.retry.should_retry(status.as_u16(), attempt) {
                attempt += 1;
                tracing::warn!(
                    status = status.as_u16(),
                    attempt,
                    "sheet request failed; retrying in {:?}",
                    self.retry.pause
                );
                tokio::time::sleep(self.retry.pause).await;
                continue;
            }
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(SinkError::Auth(api_error_message(&text)));
            }
            return Err(SinkError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }
    }

    async fn properties(&self) -> Result<SheetProperties, SinkError> {
        let url = self.url("?fields=sheets.properties");
        let body = self.send(Method::GET, &url, None).await?;
        parse_sheet_properties(&body, &self.sheet_name)
    }
}

#[async_trait]
impl SheetSink for GoogleSheetsSink {
    async fn read_rows(&self, width: usize) -> Result<Vec<SparseRow>, SinkError> {
        let a1 = format!(
            "{}!A1:{}",
            quote_sheet_name(&self.sheet_name),
            column_letter(width.saturating_sub(1))
        );
        let url = self.values_url(&a1, "valueRenderOption=UNFORMATTED_VALUE&majorDimension=ROWS");
        let body = self.send(Method::GET, &url, None).await?;
        parse_value_range(&body)
    }

    async fn row_capacity(&self) -> Result<u32, SinkError> {
        Ok(self.properties().await?.row_count)
    }

    async fn grow_rows(&self, additional: u32) -> Result<(), SinkError> {
        let props = self.properties().await?;
        let url = self.url(":batchUpdate");
        self.send(Method::POST, &url, Some(&append_rows_body(props.sheet_id, additional)))
            .await?;
        Ok(())
    }

    async fn batch_write(&self, writes: &[RangeWrite]) -> Result<(), SinkError> {
        if writes.is_empty() {
            return Ok(());
        }
        let url = self.url("/values:batchUpdate");
        let body = batch_update_body(&self.sheet_name, writes);
        self.send(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }

    async fn write_block(&self, block: &RangeWrite) -> Result<(), SinkError> {
        let a1 = block.range.to_a1(&self.sheet_name);
        let url = self.values_url(&a1, &format!("valueInputOption={USER_ENTERED}"));
        let body = value_range_body(&self.sheet_name, block);
        self.send(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }
}
