//! Data models for tracked wishlist urls and scraped listings.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A wishlist entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedUrl {
    /// Listing URL on suruga-ya.jp
    pub url: String,
    /// When the item was added to the wishlist
    pub created_at: DateTime<Utc>,
}

impl TrackedUrl {
    /// Creates a tracked url stamped with the current time.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), created_at: Utc::now() }
    }

    /// Creates a tracked url with an explicit creation time.
    pub fn at(url: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self { url: url.into(), created_at }
    }
}

/// Latest known state of a listing. One per url, superseded on every reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    /// Listing URL (reconciliation key)
    pub url: String,
    /// Listing title
    pub title: String,
    /// Absolute image URL, empty when none was found
    #[serde(default)]
    pub image_url: String,
    /// List price; zero when out of stock or unparseable
    pub current_price: Decimal,
    /// Discounted price when the listing shows a strike-through price
    pub sale_price: Option<Decimal>,
    /// Stock status text as shown by the site
    pub status: String,
    /// Carries the tracked url's creation time, not the scrape time
    pub last_updated: DateTime<Utc>,
}

impl ListingSnapshot {
    /// Returns the price a buyer would pay right now.
    pub fn effective_price(&self) -> Decimal {
        self.sale_price.unwrap_or(self.current_price)
    }

    /// Returns discount percentage if on sale.
    pub fn discount_percent(&self) -> Option<u8> {
        let sale = self.sale_price?;
        if self.current_price <= Decimal::ZERO || sale >= self.current_price {
            return None;
        }
        let pct = ((self.current_price - sale) / self.current_price * Decimal::from(100)).round();
        pct.to_u8().map(|p| p.min(99))
    }

    /// Returns the numeric listing id from the url's last path segment, if any.
    pub fn listing_id(&self) -> Option<&str> {
        let last = self.url.trim_end_matches('/').rsplit('/').next()?;
        (!last.is_empty() && last.chars().all(|c| c.is_ascii_digit())).then_some(last)
    }
}
