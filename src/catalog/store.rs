//! Typed storage interface and a local JSON-backed implementation.

use crate::catalog::models::{CategoryAssignment, KeywordMapping};
use crate::error::StorageError;
use crate::surugaya::{ListingSnapshot, TrackedUrl};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Storage collaborator for the catalog - enables mocking for tests.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns every tracked url in registration order.
    async fn tracked_urls(&self) -> Result<Vec<TrackedUrl>, StorageError>;

    async fn tracked_url(&self, url: &str) -> Result<Option<TrackedUrl>, StorageError>;

    /// Registers a url. Fails with `Conflict` if it is already tracked.
    async fn insert_tracked(&self, tracked: TrackedUrl) -> Result<(), StorageError>;

    async fn delete_tracked(&self, url: &str) -> Result<bool, StorageError>;

    async fn upsert_snapshots(
        &self,
        snapshots: Vec<ListingSnapshot>,
    ) -> Result<Vec<ListingSnapshot>, StorageError>;

    async fn snapshots(&self) -> Result<Vec<ListingSnapshot>, StorageError>;

    async fn delete_snapshot(&self, url: &str) -> Result<bool, StorageError>;

    async fn keyword_mappings(&self) -> Result<Vec<KeywordMapping>, StorageError>;

    async fn insert_mapping(
        &self,
        japanese_key: &str,
        chinese_name: &str,
    ) -> Result<KeywordMapping, StorageError>;

    async fn delete_mappings_by_name(&self, chinese_name: &str) -> Result<usize, StorageError>;

    async fn category(&self, url: &str) -> Result<Option<CategoryAssignment>, StorageError>;

    async fn upsert_category(&self, assignment: CategoryAssignment) -> Result<(), StorageError>;

    async fn categories(&self) -> Result<Vec<CategoryAssignment>, StorageError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    tracked: Vec<TrackedUrl>,
    #[serde(default)]
    snapshots: BTreeMap<String, ListingSnapshot>,
    #[serde(default)]
    mappings: Vec<KeywordMapping>,
    #[serde(default)]
    next_mapping_id: u64,
    #[serde(default)]
    categories: BTreeMap<String, CategoryAssignment>,
}

/// Store kept in memory, optionally mirrored to a JSON file after every write.
///
/// A write only becomes visible once it has been saved.
pub struct LocalStore {
    path: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl LocalStore {
    /// Creates a store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self { path: None, state: RwLock::new(StoreState::default()) }
    }

    /// Opens a file-backed store, starting empty if the file does not exist yet.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {} not found, starting empty", path.display());
                StoreState::default()
            }
            Err(e) => return Err(StorageError::Io(format!("{}: {}", path.display(), e))),
        };

        Ok(Self { path: Some(path), state: RwLock::new(state) })
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Applies `change` to a copy of the state and swaps it in after persisting.
    async fn write<T, F>(&self, change: F) -> Result<T, StorageError>
    where
        T: Send,
        F: FnOnce(&mut StoreState) -> Result<T, StorageError> + Send,
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        let result = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(result)
    }

    async fn persist(&self, state: &StoreState) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(format!("{}: {}", parent.display(), e)))?;
        }

        // Atomic replace
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {}", path.display(), e)))?;

        debug!("Persisted store to {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for LocalStore {
    async fn tracked_urls(&self) -> Result<Vec<TrackedUrl>, StorageError> {
        Ok(self.state.read().await.tracked.clone())
    }

    async fn tracked_url(&self, url: &str) -> Result<Option<TrackedUrl>, StorageError> {
        Ok(self.state.read().await.tracked.iter().find(|t| t.url == url).cloned())
    }

    async fn insert_tracked(&self, tracked: TrackedUrl) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.tracked.iter().any(|t| t.url == tracked.url) {
            return Err(StorageError::Conflict(tracked.url));
        }
        state.tracked.push(tracked);
        self.persist(&state).await
    }

    async fn delete_tracked(&self, url: &str) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        let before = state.tracked.len();
        state.tracked.retain(|t| t.url != url);
        if state.tracked.len() == before {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    async fn upsert_snapshots(
        &self,
        snapshots: Vec<ListingSnapshot>,
    ) -> Result<Vec<ListingSnapshot>, StorageError> {
        let mut state = self.state.write().await;
        for snapshot in &snapshots {
            state.snapshots.insert(snapshot.url.clone(), snapshot.clone());
        }
        self.persist(&state).await?;
        Ok(snapshots)
    }

    async fn snapshots(&self) -> Result<Vec<ListingSnapshot>, StorageError> {
        Ok(self.state.read().await.snapshots.values().cloned().collect())
    }

    async fn delete_snapshot(&self, url: &str) -> Result<bool, StorageError> {
        let mut state = self.state.write().await;
        if state.snapshots.remove(url).is_none() {
            return Ok(false);
        }
        self.persist(&state).await?;
        Ok(true)
    }

    async fn keyword_mappings(&self) -> Result<Vec<KeywordMapping>, StorageError> {
        Ok(self.state.read().await.mappings.clone())
    }

    async fn insert_mapping(
        &self,
        japanese_key: &str,
        chinese_name: &str,
    ) -> Result<KeywordMapping, StorageError> {
        let mut state = self.state.write().await;
        state.next_mapping_id += 1;
        let mapping = KeywordMapping {
            id: state.next_mapping_id,
            japanese_key: japanese_key.to_string(),
            chinese_name: chinese_name.to_string(),
        };
        state.mappings.push(mapping.clone());
        self.persist(&state).await?;
        Ok(mapping)
    }

    async fn delete_mappings_by_name(&self, chinese_name: &str) -> Result<usize, StorageError> {
        let mut state = self.state.write().await;
        let before = state.mappings.len();
        state.mappings.retain(|m| m.chinese_name != chinese_name);
        let removed = before - state.mappings.len();
        if removed > 0 {
            self.persist(&state).await?;
        }
        Ok(removed)
    }

    async fn category(&self, url: &str) -> Result<Option<CategoryAssignment>, StorageError> {
        Ok(self.state.read().await.categories.get(url).cloned())
    }

    async fn upsert_category(&self, assignment: CategoryAssignment) -> Result<(), StorageError> {
        self.write(|state| {
            state.categories.insert(assignment.url.clone(), assignment);
            Ok(())
        })
        .await
    }

    async fn categories(&self) -> Result<Vec<CategoryAssignment>, StorageError> {
        Ok(self.state.read().await.categories.values().cloned().collect())
    }
}
