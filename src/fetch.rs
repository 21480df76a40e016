//! Booked-slot snapshots from the facility booking API.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::model::{BookedSlot, ResourceId, SlotTime};

pub const DEFAULT_SLOT_API_URL: &str = "https://www.eversports.de/api/slot";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// How much of an unparseable body to quote in errors.
const BODY_PREVIEW_LEN: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("empty response body")]
    EmptyBody,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Http(_) => "http",
            FetchError::Status(_) => "status",
            FetchError::EmptyBody => "empty",
            FetchError::Malformed(_) => "malformed",
            FetchError::Timeout(_) => "timeout",
        }
    }
}

/// Source of booked-slot snapshots, one date per call.
#[async_trait]
pub trait SlotFetcher: Send + Sync {
    async fn fetch_booked_slots(
        &self,
        facility_id: &str,
        courts: &[ResourceId],
        date: NaiveDate,
    ) -> Result<Vec<BookedSlot>, FetchError>;
}

/// Build the HTTP client shared by every outbound request.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
}

// ── Wire format ───────────────────────────────────────────────────

/// One entry as the API sends it. Everything besides date/start/court is
/// ignored: the presence of a record is what means "booked".
#[derive(Debug, Deserialize)]
struct RawSlot {
    date: NaiveDate,
    start: SlotTime,
    court: ResourceId,
}

/// The list shows up either directly under `slots` or one level deeper.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SlotList {
    Flat(Vec<RawSlot>),
    Nested { slots: Vec<RawSlot> },
}

#[derive(Debug, Deserialize)]
struct SlotPayload {
    slots: SlotList,
}

/// Parse a response body into booked slots.
///
/// Accepts `{"slots": [...]}` and `{"slots": {"slots": [...]}}`; anything else
/// is [`FetchError::Malformed`].
pub fn parse_booked_slots(body: &[u8]) -> Result<Vec<BookedSlot>, FetchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(FetchError::EmptyBody);
    }
    let payload: SlotPayload = serde_json::from_slice(body).map_err(|e| {
        let preview: String = String::from_utf8_lossy(body).chars().take(BODY_PREVIEW_LEN).collect();
        FetchError::Malformed(format!("{e} (body starts with {preview:?})"))
    })?;
    let raw = match payload.slots {
        SlotList::Flat(list) | SlotList::Nested { slots: list } => list,
    };
    Ok(raw
        .into_iter()
        .map(|r| BookedSlot {
            date: r.date,
            time: r.start,
            resource: r.court,
        })
        .collect())
}

// ── HTTP fetcher ──────────────────────────────────────────────────

pub struct HttpSlotFetcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpSlotFetcher {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Query string pairs: `facilityId`, `startDate`, then one `courts[]` per court.
    pub fn query(facility_id: &str, courts: &[ResourceId], date: NaiveDate) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("facilityId", facility_id.to_string()),
            ("startDate", date.format("%Y-%m-%d").to_string()),
        ];
        params.extend(courts.iter().map(|c| ("courts[]", c.to_string())));
        params
    }
}

#[async_trait]
impl SlotFetcher for HttpSlotFetcher {
    async fn fetch_booked_slots(
        &self,
        facility_id: &str,
        courts: &[ResourceId],
        date: NaiveDate,
    ) -> Result<Vec<BookedSlot>, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&Self::query(facility_id, courts, date))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Http(e)
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Bytes = response.bytes().await?;
        tracing::debug!(%date, bytes = body.len(), "slot snapshot received");
        parse_booked_slots(&body)
    }
}
