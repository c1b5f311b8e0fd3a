//! Catalog synchronizer: scrape every tracked url, reconcile, then classify.

use crate::catalog::mapping::SeriesMapping;
use crate::catalog::models::CategoryAssignment;
use crate::catalog::store::CatalogStore;
use crate::config::SyncSettings;
use crate::error::{ScrapeError, StorageError, SyncError};
use crate::surugaya::{ListingExtractor, ListingSnapshot, PageFetcher, TrackedUrl};
use chrono::{DateTime, Utc};
use rand::RngExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Politeness pauses between scrapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Items per batch; 0 disables the batch pause
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// Multiplied by the number of consecutive failures
    pub failure_delay: Duration,
}

impl DelayPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms.max(settings.min_delay_ms)),
            batch_size: settings.batch_size,
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            failure_delay: Duration::from_millis(settings.failure_delay_ms),
        }
    }

    /// No pauses at all.
    pub fn none() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            batch_size: 0,
            batch_delay: Duration::ZERO,
            failure_delay: Duration::ZERO,
        }
    }

    /// Returns the pause after `completed` of `total` items. Nothing follows the last item.
    pub fn delay_after(&self, completed: usize, total: usize, consecutive_failures: u32) -> Duration {
        if completed >= total {
            return Duration::ZERO;
        }

        let mut pause = if consecutive_failures > 0 {
            let cap = self.batch_delay.max(self.failure_delay);
            self.failure_delay.saturating_mul(consecutive_failures).min(cap)
        } else {
            self.jitter()
        };

        if self.batch_size > 0 && completed % self.batch_size == 0 {
            pause += self.batch_delay;
        }

        pause
    }

    fn jitter(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::from_settings(&SyncSettings::default())
    }
}

/// A tracked url that could not be scraped in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of the classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    /// Records whose series was written
    pub classified: usize,
    /// Records no keyword matched
    pub unmatched: usize,
    /// Records whose assignment could not be stored
    pub failed: usize,
}

/// Result of a completed synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Snapshots as stored, in tracked order
    pub snapshots: Vec<ListingSnapshot>,
    pub failures: Vec<ItemFailure>,
    pub classification: ClassificationSummary,
    /// Tracked urls at the start of the run
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn processed(&self) -> usize {
        self.snapshots.len() + self.failures.len()
    }

    pub fn succeeded(&self) -> usize {
        self.snapshots.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Drives fetch, extract, upsert and classify for the tracked catalog.
pub struct CatalogSync {
    store: Arc<dyn CatalogStore>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: ListingExtractor,
    delay: DelayPolicy,
}

impl CatalogSync {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: ListingExtractor,
        delay: DelayPolicy,
    ) -> Self {
        Self { store, fetcher, extractor, delay }
    }

    /// Scrapes every tracked url in order, then bulk-upserts and classifies the results.
    ///
    /// Per-item failures are collected in the report. Only a failed bulk upsert aborts the run.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let started_at = Utc::now();
        let tracked = self.store.tracked_urls().await?;
        let total = tracked.len();
        info!("Synchronizing {} tracked listings", total);

        let mut scraped = Vec::with_capacity(total);
        let mut failures = Vec::new();
        let mut consecutive_failures = 0u32;

        for (i, item) in tracked.iter().enumerate() {
            info!("[{}/{}] {}", i + 1, total, item.url);

            match self.scrape(item).await {
                Ok(snapshot) => {
                    debug!("Scraped '{}' ({})", snapshot.title, snapshot.status);
                    scraped.push(snapshot);
                    consecutive_failures = 0;
                }
                Err(e) => {
                    warn!("Failed to scrape {}: {}", item.url, e);
                    failures.push(ItemFailure { url: item.url.clone(), error: e.to_string() });
                    consecutive_failures += 1;
                }
            }

            let pause = self.delay.delay_after(i + 1, total, consecutive_failures);
            if !pause.is_zero() {
                debug!("Waiting {:?} before next listing", pause);
                tokio::time::sleep(pause).await;
            }
        }

        let snapshots = if scraped.is_empty() {
            Vec::new()
        } else {
            self.store.upsert_snapshots(scraped).await?
        };
        info!("Stored {} snapshots, {} failures", snapshots.len(), failures.len());

        let classification = self.classify_all(&snapshots).await;

        Ok(SyncReport {
            snapshots,
            failures,
            classification,
            total,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Runs a full synchronization, giving up once `limit` has elapsed.
    pub async fn run_with_timeout(&self, limit: Duration) -> Result<SyncReport, SyncError> {
        match tokio::time::timeout(limit, self.run()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Synchronization exceeded {:?}, aborting", limit);
                Err(SyncError::TimedOut(limit))
            }
        }
    }

    /// Refreshes a single tracked url and returns the stored snapshot.
    pub async fn scrape_one(&self, url: &str) -> Result<ListingSnapshot, SyncError> {
        let tracked = self
            .store
            .tracked_url(url)
            .await?
            .ok_or_else(|| SyncError::NotTracked(url.to_string()))?;

        let snapshot = self.scrape(&tracked).await?;
        let stored = self
            .store
            .upsert_snapshots(vec![snapshot])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;

        let summary = self.classify_all(std::slice::from_ref(&stored)).await;
        debug!("Classification for {}: {:?}", url, summary);

        Ok(stored)
    }

    /// Registers a url and scrapes it right away.
    ///
    /// The url stays tracked even if the first scrape fails; the next run retries it.
    pub async fn track(&self, url: &str) -> Result<ListingSnapshot, SyncError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(StorageError::Invalid("url must not be blank".to_string()).into());
        }

        match self.store.insert_tracked(TrackedUrl::new(url)).await {
            Ok(()) => info!("Tracking {}", url),
            Err(StorageError::Conflict(_)) => {
                return Err(SyncError::AlreadyTracked(url.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        self.scrape_one(url).await
    }

    /// Stops tracking a url and drops its snapshot.
    pub async fn untrack(&self, url: &str) -> Result<(), SyncError> {
        if !self.store.delete_tracked(url).await? {
            return Err(SyncError::NotTracked(url.to_string()));
        }
        self.store.delete_snapshot(url).await?;
        info!("Stopped tracking {}", url);
        Ok(())
    }

    async fn scrape(&self, item: &TrackedUrl) -> Result<ListingSnapshot, ScrapeError> {
        let html = self.fetcher.fetch(&item.url).await?;
        let mut snapshot = self.extractor.extract(&html, &item.url)?;
        snapshot.last_updated = item.created_at;
        Ok(snapshot)
    }

    async fn classify_all(&self, snapshots: &[ListingSnapshot]) -> ClassificationSummary {
        let mut summary = ClassificationSummary::default();
        if snapshots.is_empty() {
            return summary;
        }

        let mapping = match SeriesMapping::load(self.store.as_ref()).await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("Could not load keyword rules, skipping classification: {}", e);
                summary.failed = snapshots.len();
                return summary;
            }
        };

        for snapshot in snapshots {
            let series = mapping.classify(&snapshot.title);
            if series.is_empty() {
                summary.unmatched += 1;
                continue;
            }

            match self.assign_series(&snapshot.url, series).await {
                Ok(()) => summary.classified += 1,
                Err(e) => {
                    warn!("Failed to classify {}: {}", snapshot.url, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Classification: {} classified, {} unmatched, {} failed",
            summary.classified, summary.unmatched, summary.failed
        );
        summary
    }

    async fn assign_series(&self, url: &str, series: String) -> Result<(), StorageError> {
        let mut assignment =
            self.store.category(url).await?.unwrap_or_else(|| CategoryAssignment::new(url));
        assignment.series_name = Some(series);
        self.store.upsert_category(assignment).await
    }
}
