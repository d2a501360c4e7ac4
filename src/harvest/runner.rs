//! Checkpointed harvest loop executor.
//!
//! This module provides the [`Harvester`] that walks the query space one
//! descriptor at a time, one page at a time, with:
//! - Async execution via `tokio`
//! - Seen-set deduplication across overlapping queries
//! - Atomic checkpointing after every page and descriptor
//! - Cooperative cancellation via [`ShutdownSignal`]
//! - Structured logging via `tracing`
//!
//! The loop is deliberately single-threaded: one request in flight at a time,
//! and the only mutable state (the checkpoint) is local to the run, so no
//! locking is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointError, CheckpointState, CheckpointStore};
use crate::client::random_jitter;
use crate::config::HarvestConfig;
use crate::model::{best_image_url, record_id, ResultRecord, SearchRequest};
use crate::query::QueryDescriptor;
use crate::storage::{AssetStore, LogError, MetadataLog};
use crate::traits::{AssetFetcher, FetchError, SearchApi};

// ============================================================================
// Run Types
// ============================================================================

/// Cooperative stop flag, observed between page and descriptor iterations.
///
/// There is no mid-request cancellation granularity: once triggered, the loop
/// persists the current checkpoint at its next observation point and
/// terminates cleanly.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Statistics for one harvest run.
#[derive(Debug, Default, Clone)]
pub struct HarvestReport {
    /// Descriptors marked processed during this run
    pub descriptors_processed: usize,

    /// Descriptors aborted by a fetch failure (left unprocessed for a
    /// future run)
    pub descriptors_failed: usize,

    /// Result pages fetched (the per-descriptor probe request not included)
    pub pages_fetched: usize,

    /// Records newly appended to the metadata log
    pub new_records: u64,

    /// Asset downloads that failed and were skipped
    pub failed_downloads: usize,

    /// Unique IDs in the seen-set at the end of the run
    pub unique_collected: usize,

    /// Whether the run was stopped by the shutdown signal
    pub interrupted: bool,

    /// Total wall-clock time (milliseconds)
    pub total_duration_ms: u64,
}

/// How processing of a single descriptor ended.
#[derive(Debug)]
enum DescriptorOutcome {
    /// All accessible pages were harvested (or the slice was empty);
    /// the descriptor can be marked processed
    Completed,

    /// A fetch failure aborted pagination; already-fetched pages remain
    /// checkpointed and the descriptor stays unprocessed
    Aborted(FetchError),

    /// The shutdown signal was observed between pages
    Interrupted,
}

// ============================================================================
// Errors
// ============================================================================

/// Fatal errors that end a harvest run.
///
/// Fetch failures never appear here; they are contained to the descriptor
/// they occurred in. Only storage failures stop the run, because the loop
/// cannot safely continue without durable progress tracking.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    /// Checkpoint load or save failed
    #[error("checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Metadata log open, append or replay failed
    #[error("metadata log failure: {0}")]
    Log(#[from] LogError),

    /// Asset directory could not be created
    #[error("asset directory setup failed: {0}")]
    AssetDir(#[source] std::io::Error),

    /// The run configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Pages needed to cover `accessible` results at `per_page` per page,
/// saturating at `u32::MAX` for absurd caps.
fn page_count(accessible: u64, per_page: u32) -> u32 {
    u32::try_from(accessible.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
}

// ============================================================================
// Harvester
// ============================================================================

/// Sequential, resumable harvest loop over a query space.
///
/// For each unprocessed descriptor the harvester probes the total match
/// count, caps it at the provider ceiling, pages through the accessible
/// results, appends every newly seen record to the metadata log, optionally
/// downloads its image asset, and persists the checkpoint as it goes.
///
/// # Example
///
/// ```ignore
/// use image_harvester::harvest::Harvester;
/// use image_harvester::{ApiConfig, HarvestConfig, SearchClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = SearchClient::new(ApiConfig::default())?;
///     let harvester = Harvester::new(client.clone(), client, HarvestConfig::default());
///     let report = harvester.run().await?;
///     println!("collected {} unique records", report.unique_collected);
///     Ok(())
/// }
/// ```
pub struct Harvester<S, F>
where
    S: SearchApi,
    F: AssetFetcher,
{
    /// Search API implementation
    api: S,

    /// Asset download implementation (unused when downloads are disabled)
    fetcher: F,

    /// Run settings
    config: HarvestConfig,

    /// Cooperative stop flag
    shutdown: ShutdownSignal,
}

impl<S, F> Harvester<S, F>
where
    S: SearchApi,
    F: AssetFetcher,
{
    pub fn new(api: S, fetcher: F, config: HarvestConfig) -> Self {
        Self {
            api,
            fetcher,
            config,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Installs an externally controlled shutdown signal.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Executes the harvest to completion, exhaustion of the query space, or
    /// shutdown.
    ///
    /// On startup the seen-set is reconciled as the union of the checkpoint
    /// and the IDs replayed from the metadata log, so a crash that left the
    /// log ahead of the checkpoint cannot produce duplicate lines.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError`] only for storage failures. Fetch failures are
    /// logged and contained to the descriptor they occurred in.
    pub async fn run(&self) -> Result<HarvestReport, HarvestError> {
        if self.config.per_page == 0 {
            return Err(HarvestError::Config(
                "per_page must be at least 1".to_string(),
            ));
        }

        let start = Instant::now();
        let mut report = HarvestReport::default();

        let store = CheckpointStore::new(&self.config.checkpoint_path);
        let mut state = store.load()?;
        let mut log = MetadataLog::open(&self.config.metadata_log_path)?;

        let before = state.seen_ids.len();
        state.seen_ids.extend(log.replay_ids()?);
        let recovered = state.seen_ids.len() - before;
        if recovered > 0 {
            info!(recovered, "seen-set extended with IDs replayed from the metadata log");
        }

        let assets = if self.config.download_assets {
            Some(AssetStore::create(&self.config.asset_dir).map_err(HarvestError::AssetDir)?)
        } else {
            None
        };

        let descriptors = self.config.queries.build();
        info!(descriptors = descriptors.len(), "built query space");

        for (index, descriptor) in descriptors.iter().enumerate() {
            if self.shutdown.is_triggered() {
                info!("shutdown requested; persisting checkpoint");
                store.save(&state)?;
                report.interrupted = true;
                break;
            }

            let key = descriptor.canonical_key();
            if state.processed.contains(&key) {
                continue;
            }

            info!(
                index = index + 1,
                total = descriptors.len(),
                query = %descriptor.q,
                colors = %descriptor.colors,
                orientation = %descriptor.orientation,
                image_type = %descriptor.image_type,
                min_width = descriptor.min_width,
                order = %descriptor.order,
                "processing descriptor"
            );

            let outcome = self
                .harvest_descriptor(descriptor, &mut state, &mut log, &store, assets.as_ref(), &mut report)
                .await?;

            match outcome {
                DescriptorOutcome::Completed => {
                    state.processed.insert(key);
                    store.save(&state)?;
                    report.descriptors_processed += 1;
                }
                DescriptorOutcome::Aborted(err) => {
                    warn!(
                        query = %descriptor.q,
                        error = %err,
                        "descriptor aborted; it stays unprocessed and will be retried on a future run"
                    );
                    store.save(&state)?;
                    report.descriptors_failed += 1;
                }
                DescriptorOutcome::Interrupted => {
                    info!("shutdown requested mid-descriptor; persisting checkpoint");
                    store.save(&state)?;
                    report.interrupted = true;
                    break;
                }
            }

            // Spread load between descriptors.
            sleep(random_jitter(self.config.descriptor_jitter)).await;
        }

        report.unique_collected = state.seen_ids.len();
        report.total_duration_ms = start.elapsed().as_millis() as u64;
        info!(
            unique = report.unique_collected,
            new_records = report.new_records,
            pages = report.pages_fetched,
            processed = report.descriptors_processed,
            failed = report.descriptors_failed,
            failed_downloads = report.failed_downloads,
            interrupted = report.interrupted,
            duration_ms = report.total_duration_ms,
            "harvest finished"
        );
        Ok(report)
    }

    /// Harvests all accessible pages of one descriptor.
    async fn harvest_descriptor(
        &self,
        descriptor: &QueryDescriptor,
        state: &mut CheckpointState,
        log: &mut MetadataLog,
        store: &CheckpointStore,
        assets: Option<&AssetStore>,
        report: &mut HarvestReport,
    ) -> Result<DescriptorOutcome, HarvestError> {
        let probe = SearchRequest {
            descriptor: descriptor.clone(),
            page: 1,
            per_page: self.config.per_page,
            safesearch: self.config.safesearch,
        };

        // Probe page 1 for the reported total; the provider caps what is
        // actually retrievable per query regardless of that total.
        let first = match self.api.search(&probe).await {
            Ok(body) => body,
            Err(err) => return Ok(DescriptorOutcome::Aborted(err)),
        };

        let accessible = first.total_hits.min(self.config.result_cap);
        if accessible == 0 {
            info!(query = %descriptor.q, "no hits for this slice");
            return Ok(DescriptorOutcome::Completed);
        }

        let max_pages = page_count(accessible, self.config.per_page);
        info!(
            total_hits = first.total_hits,
            accessible,
            max_pages,
            "descriptor has accessible results"
        );

        for page in 1..=max_pages {
            if self.shutdown.is_triggered() {
                return Ok(DescriptorOutcome::Interrupted);
            }

            let request = SearchRequest {
                page,
                ..probe.clone()
            };
            let response = match self.api.search(&request).await {
                Ok(body) => body,
                Err(err) => return Ok(DescriptorOutcome::Aborted(err)),
            };
            report.pages_fetched += 1;

            if response.hits.is_empty() {
                info!(page, "page returned no hits; ending pagination");
                break;
            }

            let fetched = response.hits.len();
            let mut new_count = 0u64;
            for hit in response.hits {
                let Some(id) = record_id(&hit) else { continue };
                if !state.seen_ids.insert(id) {
                    continue;
                }
                log.append(&hit)?;
                new_count += 1;
                if let Some(assets) = assets {
                    self.download_asset(id, &hit, assets, report).await;
                }
            }
            state.stats.collected += new_count;
            report.new_records += new_count;

            info!(
                page,
                fetched,
                added = new_count,
                unique = state.seen_ids.len(),
                "page complete"
            );

            if self.config.checkpoint_every_pages > 0
                && page % self.config.checkpoint_every_pages == 0
            {
                store.save(state)?;
            }
        }

        Ok(DescriptorOutcome::Completed)
    }

    /// Best-effort asset download. Failures are logged and skipped; the
    /// owning record is already in the metadata log.
    async fn download_asset(
        &self,
        id: u64,
        hit: &ResultRecord,
        assets: &AssetStore,
        report: &mut HarvestReport,
    ) {
        let Some(url) = best_image_url(hit) else {
            return;
        };
        match self.fetcher.fetch_asset(url).await {
            Ok(bytes) => {
                if let Err(e) = assets.write(id, url, &bytes) {
                    warn!(id, url, error = %e, "failed to store asset; skipping");
                    report.failed_downloads += 1;
                }
            }
            Err(e) => {
                warn!(id, url, error = %e, "failed to download asset; skipping");
                report.failed_downloads += 1;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
