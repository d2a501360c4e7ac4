use async_trait::async_trait;
use thiserror::Error;

use crate::model::{SearchRequest, SearchResponse};

#[derive(Error, Debug)]
pub enum FetchError {
    /// The API rejected the request as malformed. Never retried.
    #[error("request rejected as malformed: {detail}")]
    BadRequest { detail: String },

    /// The retry budget for one request was exhausted.
    #[error("request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// A single-attempt transfer (asset download) failed.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client construction failed: {0}")]
    Setup(String),
}

#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Issues one search request, retrying transient failures internally.
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, FetchError>;
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetches the binary asset behind `url`. Single attempt; callers treat
    /// failure as skippable.
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
