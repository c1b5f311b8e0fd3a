//! Keyword-to-series mapping and per-url category assignments.

use crate::catalog::models::{CategoryAssignment, KeywordMapping, PurposeCategory};
use crate::catalog::store::CatalogStore;
use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// In-memory view of the keyword rules, ordered for longest-match lookup.
#[derive(Debug, Clone, Default)]
pub struct SeriesMapping {
    /// (japanese_key, chinese_name), longest key first
    entries: Vec<(String, String)>,
}

impl SeriesMapping {
    /// Loads every rule from the store.
    pub async fn load(store: &dyn CatalogStore) -> Result<Self, StorageError> {
        let rules = store.keyword_mappings().await?;
        debug!("Loaded {} keyword rules", rules.len());
        Ok(Self::from_rules(rules))
    }

    /// Builds the lookup from rules in id order.
    ///
    /// A key that appears twice keeps its first position and its last name.
    /// Keys of equal length stay in id order after sorting.
    pub fn from_rules(mut rules: Vec<KeywordMapping>) -> Self {
        rules.sort_by_key(|r| r.id);

        let mut entries: Vec<(String, String)> = Vec::with_capacity(rules.len());
        let mut positions: HashMap<String, usize> = HashMap::new();

        for rule in rules {
            if rule.japanese_key.trim().is_empty() {
                continue;
            }
            match positions.get(&rule.japanese_key) {
                Some(&idx) => entries[idx].1 = rule.chinese_name,
                None => {
                    positions.insert(rule.japanese_key.clone(), entries.len());
                    entries.push((rule.japanese_key, rule.chinese_name));
                }
            }
        }

        entries.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));
        Self { entries }
    }

    /// Returns the series of the longest key contained in the title, or "" when none matches.
    pub fn classify(&self, title: &str) -> String {
        if title.trim().is_empty() {
            return String::new();
        }

        self.entries
            .iter()
            .find(|(key, _)| title.contains(key.as_str()))
            .map(|(_, name)| name.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Store-backed classifier and category editor.
pub struct SeriesClassifier {
    store: Arc<dyn CatalogStore>,
}

impl SeriesClassifier {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Classifies a title against the current rules, reloading them on every call.
    pub async fn classify(&self, title: &str) -> Result<String, StorageError> {
        let mapping = SeriesMapping::load(self.store.as_ref()).await?;
        Ok(mapping.classify(title))
    }

    /// Adds a keyword rule.
    pub async fn add_mapping(
        &self,
        japanese_key: &str,
        chinese_name: &str,
    ) -> Result<KeywordMapping, StorageError> {
        let key = japanese_key.trim();
        let name = chinese_name.trim();
        if key.is_empty() || name.is_empty() {
            return Err(StorageError::Invalid(
                "keyword and series name must not be blank".to_string(),
            ));
        }

        let mapping = self.store.insert_mapping(key, name).await?;
        info!("Added keyword rule #{}: {} -> {}", mapping.id, key, name);
        Ok(mapping)
    }

    /// Removes every rule that maps to the given series name.
    pub async fn remove_mapping(&self, chinese_name: &str) -> Result<usize, StorageError> {
        let removed = self.store.delete_mappings_by_name(chinese_name).await?;
        if removed == 0 {
            return Err(StorageError::NotFound(chinese_name.to_string()));
        }
        info!("Removed {} keyword rule(s) for {}", removed, chinese_name);
        Ok(removed)
    }

    /// Returns every rule in id order.
    pub async fn mappings(&self) -> Result<Vec<KeywordMapping>, StorageError> {
        self.store.keyword_mappings().await
    }

    /// Sets the purpose category, keeping any series name.
    pub async fn set_purpose(
        &self,
        url: &str,
        purpose: PurposeCategory,
    ) -> Result<CategoryAssignment, StorageError> {
        let mut assignment = self.current(url).await?;
        assignment.purpose_category = purpose;
        self.store.upsert_category(assignment.clone()).await?;
        Ok(assignment)
    }

    /// Sets the series name, keeping the purpose category. A blank name clears it.
    pub async fn set_series(
        &self,
        url: &str,
        series_name: &str,
    ) -> Result<CategoryAssignment, StorageError> {
        let mut assignment = self.current(url).await?;
        assignment.series_name = non_blank(series_name);
        self.store.upsert_category(assignment.clone()).await?;
        Ok(assignment)
    }

    /// Replaces both fields of the assignment.
    pub async fn set_category(
        &self,
        url: &str,
        purpose: PurposeCategory,
        series_name: Option<&str>,
    ) -> Result<CategoryAssignment, StorageError> {
        let assignment = CategoryAssignment {
            url: url.to_string(),
            purpose_category: purpose,
            series_name: series_name.and_then(non_blank),
        };
        self.store.upsert_category(assignment.clone()).await?;
        Ok(assignment)
    }

    async fn current(&self, url: &str) -> Result<CategoryAssignment, StorageError> {
        Ok(self.store.category(url).await?.unwrap_or_else(|| CategoryAssignment::new(url)))
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
