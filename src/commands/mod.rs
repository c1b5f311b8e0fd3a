//! CLI command implementations.

pub mod cart;
pub mod catalog;
pub mod sync;

pub use cart::{CartAction, CartCommand};
pub use catalog::{CatalogAction, CatalogCommand};
pub use sync::{SyncAction, SyncCommand};
