//! surugaya-sync - Suruga-ya wishlist synchronizer and Letao cart client
//!
//! Listing pages are fetched through a FlareSolverr proxy, stored as
//! snapshots and classified into series by keyword rules. Selected items
//! can be forwarded to a Letao cart over a cached login session.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod format;
pub mod letao;
pub mod surugaya;

pub use catalog::{CatalogSync, SyncReport};
pub use config::Config;
pub use surugaya::{ListingSnapshot, TrackedUrl};
