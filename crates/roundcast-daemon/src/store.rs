//! Persistence gateway: append accepted rounds to the remote store.
//!
//! Submission is fire-and-forget from the poll loop's point of view. A failed
//! submit is logged by the caller and nothing is retried or rolled back; the
//! live state has already advanced by the time the request is in flight.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use roundcast_core::ColorClass;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store rejected round: status {0:?}")]
    Rejected(String),
}

/// Append-only sink for accepted rounds.
#[async_trait]
pub trait RoundSink: Send + Sync {
    async fn submit(&self, date: NaiveDate, id: &str, color: ColorClass) -> Result<(), StoreError>;
}

/// HTTP implementation posting one JSON document per accepted round.
pub struct HttpRoundStore {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct StoreResponse {
    #[serde(default)]
    status: String,
}

impl HttpRoundStore {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl RoundSink for HttpRoundStore {
    /// The endpoint answers `{"status": "success"}` on success; any other
    /// status value, a malformed body, or a transport error is a failure.
    async fn submit(&self, date: NaiveDate, id: &str, color: ColorClass) -> Result<(), StoreError> {
        let body = serde_json::json!({
            "date": date.to_string(),
            "number": id,
            "color": color.code(),
        });
        let response = self.client.post(&self.url).json(&body).send().await?;
        let parsed: StoreResponse = response.json().await?;
        if parsed.status == "success" {
            Ok(())
        } else {
            Err(StoreError::Rejected(parsed.status))
        }
    }
}
