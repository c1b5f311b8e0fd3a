//! Keyword rule and category commands.

use crate::catalog::{CatalogStore, LocalStore, PurposeCategory, SeriesClassifier};
use crate::config::Config;
use crate::format::Formatter;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Edits and queries series classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAction {
    Classify { title: String },
    AddMapping { japanese_key: String, chinese_name: String },
    ListMappings,
    RemoveMapping { chinese_name: String },
    /// Shows the assignment when neither field is given
    Category { url: String, purpose: Option<PurposeCategory>, series: Option<String> },
}

/// Executes classification actions against the store.
pub struct CatalogCommand {
    config: Config,
}

impl CatalogCommand {
    /// Creates a new catalog command.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Opens the configured store and executes the action.
    pub async fn execute(&self, action: &CatalogAction) -> Result<String> {
        let path = self.config.resolved_store_path();
        let store = LocalStore::open(&path)
            .await
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        self.execute_with_store(Arc::new(store), action).await
    }

    /// Executes the action with a provided store (for testing).
    pub async fn execute_with_store(
        &self,
        store: Arc<dyn CatalogStore>,
        action: &CatalogAction,
    ) -> Result<String> {
        let formatter = Formatter::new(self.config.format);
        let classifier = SeriesClassifier::new(store.clone());

        match action {
            CatalogAction::Classify { title } => {
                let series = classifier.classify(title).await.context("Failed to classify")?;
                Ok(if series.is_empty() { "(no matching series)".to_string() } else { series })
            }
            CatalogAction::AddMapping { japanese_key, chinese_name } => {
                let mapping = classifier
                    .add_mapping(japanese_key, chinese_name)
                    .await
                    .context("Failed to add keyword rule")?;
                Ok(formatter.format_mappings(std::slice::from_ref(&mapping)))
            }
            CatalogAction::ListMappings => {
                let mappings = classifier.mappings().await.context("Failed to read keyword rules")?;
                Ok(formatter.format_mappings(&mappings))
            }
            CatalogAction::RemoveMapping { chinese_name } => {
                let removed = classifier
                    .remove_mapping(chinese_name)
                    .await
                    .with_context(|| format!("Failed to remove rules for {}", chinese_name))?;
                Ok(format!("Removed {} keyword rule(s) for {}", removed, chinese_name))
            }
            CatalogAction::Category { url, purpose, series } => {
                let assignment = match (purpose, series) {
                    (Some(p), Some(s)) => classifier.set_category(url, *p, Some(s.as_str())).await,
                    (Some(p), None) => classifier.set_purpose(url, *p).await,
                    (None, Some(s)) => classifier.set_series(url, s).await,
                    (None, None) => {
                        let current = store.category(url).await.context("Failed to read category")?;
                        return match current {
                            Some(assignment) => Ok(formatter.format_category(&assignment)),
                            None => Ok(format!("No category assigned to {}", url)),
                        };
                    }
                }
                .with_context(|| format!("Failed to update category for {}", url))?;

                Ok(formatter.format_category(&assignment))
            }
        }
    }
}
