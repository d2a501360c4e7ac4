//! Harvester configuration.
//!
//! All collaborators (HTTP client, checkpoint store, metadata log) are
//! constructed from these structs and passed in explicitly; there are no
//! ambient globals.

use std::path::PathBuf;
use std::time::Duration;

use crate::client::RetryPolicy;
use crate::query::QuerySpace;

/// Connection settings for the remote search API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base endpoint URL (e.g., `https://pixabay.com/api/`)
    pub api_url: String,

    /// Provider API key, sent as the `key` query parameter
    pub api_key: String,

    /// Per-request timeout for search requests
    pub request_timeout: Duration,

    /// Per-request timeout for asset downloads (larger payloads)
    pub asset_timeout: Duration,

    /// Fixed delay applied after every request, success or failure.
    ///
    /// This is the provider's implicit rate limit; it is separate from the
    /// backoff delay between retry attempts.
    pub polite_delay: Duration,

    /// Retry/backoff settings for search requests
    pub retry: RetryPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://pixabay.com/api/".to_string(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(30),
            asset_timeout: Duration::from_secs(60),
            polite_delay: Duration::from_millis(800),
            retry: RetryPolicy::default(),
        }
    }
}

/// Settings for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Results requested per page (provider maximum: 200)
    pub per_page: u32,

    /// Provider ceiling on retrievable results per query, regardless of the
    /// reported total match count
    pub result_cap: u64,

    /// Whether to request safe-search filtering
    pub safesearch: bool,

    /// Upper bound of the extra random sleep between descriptors
    pub descriptor_jitter: Duration,

    /// Persist the checkpoint after every N pages (1 = after every page)
    pub checkpoint_every_pages: u32,

    /// Whether to download each new result's image asset
    pub download_assets: bool,

    /// Path of the checkpoint file
    pub checkpoint_path: PathBuf,

    /// Path of the append-only JSONL metadata log
    pub metadata_log_path: PathBuf,

    /// Directory for downloaded assets
    pub asset_dir: PathBuf,

    /// The query space to enumerate
    pub queries: QuerySpace,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            per_page: 200,
            result_cap: 500,
            safesearch: true,
            descriptor_jitter: Duration::from_millis(600),
            checkpoint_every_pages: 1,
            download_assets: false,
            checkpoint_path: PathBuf::from("harvest_checkpoint.json"),
            metadata_log_path: PathBuf::from("harvest_results.jsonl"),
            asset_dir: PathBuf::from("images"),
            queries: QuerySpace::default(),
        }
    }
}
