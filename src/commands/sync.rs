//! Catalog synchronization commands: sync, scrape, track, untrack, list.

use crate::catalog::{CatalogStore, CatalogSync, DelayPolicy, LocalStore};
use crate::config::Config;
use crate::format::Formatter;
use crate::surugaya::{FlareSolverrClient, ListingExtractor, PageFetcher};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What to do with the tracked catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Full run over every tracked url
    Run { timeout_minutes: Option<u64> },
    Scrape { url: String },
    Track { url: String },
    Untrack { url: String },
    /// Show stored snapshots
    List,
}

/// Executes catalog synchronization actions.
pub struct SyncCommand {
    config: Config,
}

impl SyncCommand {
    /// Creates a new sync command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Opens the configured store and proxy, then executes the action.
    pub async fn execute(&self, action: &SyncAction) -> Result<String> {
        let path = self.config.resolved_store_path();
        let store = LocalStore::open(&path)
            .await
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        let fetcher =
            FlareSolverrClient::new(&self.config.proxy).context("Failed to create proxy client")?;

        self.execute_with_clients(Arc::new(store), Arc::new(fetcher), action).await
    }

    /// Executes the action with provided collaborators (for testing).
    pub async fn execute_with_clients(
        &self,
        store: Arc<dyn CatalogStore>,
        fetcher: Arc<dyn PageFetcher>,
        action: &SyncAction,
    ) -> Result<String> {
        let formatter = Formatter::new(self.config.format);
        let sync = CatalogSync::new(
            store.clone(),
            fetcher,
            ListingExtractor::new(self.config.sync.marketplace_url.clone()),
            DelayPolicy::from_settings(&self.config.sync),
        );

        match action {
            SyncAction::Run { timeout_minutes } => {
                let limit = timeout_minutes
                    .map(|m| Duration::from_secs(m.saturating_mul(60)))
                    .unwrap_or_else(|| self.config.sync.run_timeout());
                info!("Starting sync (limit {:?})", limit);

                let report = sync.run_with_timeout(limit).await.context("Synchronization failed")?;
                if report.failed() > 0 {
                    warn!("{} of {} listings failed", report.failed(), report.total);
                }
                Ok(formatter.format_report(&report))
            }
            SyncAction::Scrape { url } => {
                let snapshot =
                    sync.scrape_one(url).await.with_context(|| format!("Failed to scrape {}", url))?;
                Ok(formatter.format_snapshot(&snapshot))
            }
            SyncAction::Track { url } => {
                let snapshot =
                    sync.track(url).await.with_context(|| format!("Failed to track {}", url))?;
                Ok(formatter.format_snapshot(&snapshot))
            }
            SyncAction::Untrack { url } => {
                sync.untrack(url).await.with_context(|| format!("Failed to untrack {}", url))?;
                Ok(format!("Stopped tracking {}", url))
            }
            SyncAction::List => {
                let snapshots = store.snapshots().await.context("Failed to read snapshots")?;
                Ok(formatter.format_snapshots(&snapshots))
            }
        }
    }
}
