//! Wishlist catalog: storage, keyword classification and synchronization.

pub mod mapping;
pub mod models;
pub mod store;
pub mod sync;

pub use mapping::{SeriesClassifier, SeriesMapping};
pub use models::{CategoryAssignment, KeywordMapping, PurposeCategory};
pub use store::{CatalogStore, LocalStore};
pub use sync::{CatalogSync, ClassificationSummary, DelayPolicy, ItemFailure, SyncReport};
