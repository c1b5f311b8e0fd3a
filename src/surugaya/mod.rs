//! Suruga-ya specific modules: rendering proxy client, listing parser and data models.

pub mod models;
pub mod parser;
pub mod proxy;
pub mod selectors;

pub use models::{ListingSnapshot, TrackedUrl};
pub use parser::ListingExtractor;
pub use proxy::{FlareSolverrClient, PageFetcher};
