//! HTML parser for Suruga-ya product detail pages.

use crate::error::ExtractionError;
use crate::surugaya::models::ListingSnapshot;
use crate::surugaya::selectors::{challenge, product};
use chrono::Utc;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use std::str::FromStr;
use tracing::{debug, trace};

/// Default marketplace origin used to absolutize relative image paths.
pub const DEFAULT_MARKETPLACE_URL: &str = "https://www.suruga-ya.jp";

/// Title used when no heading could be found.
pub const TITLE_NOT_FOUND: &str = "title not found";

/// Status used for sold-out listings whose banner has no text.
pub const OUT_OF_STOCK_STATUS: &str = "品切れ中";

/// Status used when no stock marker is present.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Suffix appended to the status while a time sale runs.
pub const FLASH_SALE_SUFFIX: &str = " (タイムセール中)";

/// Fragments removed from price text before numeric parsing.
const PRICE_NOISE: [&str; 8] = ["(税込)", "（税込）", "税込", "円", "¥", "￥", ",", "，"];

/// Parser for rendered Suruga-ya listing pages.
pub struct ListingExtractor {
    marketplace_url: String,
}

impl ListingExtractor {
    /// Creates an extractor resolving relative links against the given origin.
    pub fn new(marketplace_url: impl Into<String>) -> Self {
        Self { marketplace_url: marketplace_url.into().trim_end_matches('/').to_string() }
    }

    /// Parses a rendered listing page into a snapshot.
    ///
    /// Missing fields fall back to defaults; only empty documents and challenge
    /// pages are reported as errors.
    pub fn extract(&self, html: &str, url: &str) -> Result<ListingSnapshot, ExtractionError> {
        if html.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }

        let document = Html::parse_document(html);
        self.check_for_challenge(&document)?;

        let title = self.parse_title(&document);
        debug!("Listing title: {}", title);

        let image_url = self.parse_image(&document).unwrap_or_default();

        let mut snapshot = ListingSnapshot {
            url: url.to_string(),
            title,
            image_url,
            current_price: Decimal::ZERO,
            sale_price: None,
            status: String::new(),
            last_updated: Utc::now(),
        };

        if let Some(banner) = document.select(&product::OUT_OF_STOCK).next() {
            // Price markup on sold-out pages is stale; ignore it entirely
            let text = element_text(banner);
            snapshot.status =
                if text.is_empty() { OUT_OF_STOCK_STATUS.to_string() } else { text };
        } else {
            self.apply_prices(&document, &mut snapshot);
            snapshot.status = self.parse_stock_status(&document);
        }

        if document.select(&product::FLASH_SALE).next().is_some() {
            snapshot.status.push_str(FLASH_SALE_SUFFIX);
        }

        trace!(
            "Extracted {}: price={} sale={:?} status={}",
            snapshot.url,
            snapshot.current_price,
            snapshot.sale_price,
            snapshot.status
        );

        Ok(snapshot)
    }

    /// Detects Cloudflare pages that FlareSolverr failed to solve.
    fn check_for_challenge(&self, document: &Html) -> Result<(), ExtractionError> {
        if document.select(&challenge::FORM).next().is_some() {
            return Err(ExtractionError::Challenge("challenge form present".to_string()));
        }

        let title = document.select(&challenge::TITLE).next().map(element_text).unwrap_or_default();
        if title.contains("Just a moment") || title.contains("Attention Required") {
            return Err(ExtractionError::Challenge(title));
        }

        Ok(())
    }

    fn parse_title(&self, document: &Html) -> String {
        first_text(document, product::TITLE_CANDIDATES.iter())
            .unwrap_or_else(|| TITLE_NOT_FOUND.to_string())
    }

    fn parse_image(&self, document: &Html) -> Option<String> {
        let src = product::IMAGE_CANDIDATES
            .iter()
            .find_map(|selector| document.select(selector).next())
            .and_then(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())?;

        Some(self.absolutize(src))
    }

    /// Old price becomes the list price and the buy price the sale price.
    /// A lone buy price is the list price.
    fn apply_prices(&self, document: &Html, snapshot: &mut ListingSnapshot) {
        let old =
            document.select(&product::PRICE_OLD).next().and_then(|e| parse_price(&element_text(e)));
        let buy =
            document.select(&product::PRICE_BUY).next().and_then(|e| parse_price(&element_text(e)));

        if let Some(old) = old {
            snapshot.current_price = old;
        }

        if let Some(buy) = buy {
            if snapshot.current_price > Decimal::ZERO {
                snapshot.sale_price = Some(buy);
            } else {
                snapshot.current_price = buy;
            }
        }
    }

    fn parse_stock_status(&self, document: &Html) -> String {
        first_text(document, [&*product::STOCK_TAG, &*product::POPULAR_TAG].into_iter())
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string())
    }

    fn absolutize(&self, src: &str) -> String {
        if src.starts_with("http") {
            src.to_string()
        } else if let Some(rest) = src.strip_prefix("//") {
            format!("https://{}", rest)
        } else if src.starts_with('/') {
            format!("{}{}", self.marketplace_url, src)
        } else {
            format!("{}/{}", self.marketplace_url, src)
        }
    }
}

impl Default for ListingExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKETPLACE_URL)
    }
}

/// Parses a yen price like "¥1,980 (税込)". Returns None for anything else.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let mut cleaned = text.to_string();
    for noise in PRICE_NOISE {
        cleaned = cleaned.replace(noise, "");
    }
    let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.is_empty() {
        return None;
    }

    Decimal::from_str(&cleaned).ok().filter(|price| !price.is_sign_negative())
}

/// Text of the first selector that matches a non-empty element.
fn first_text<'a>(document: &Html, selectors: impl Iterator<Item = &'a Selector>) -> Option<String> {
    selectors
        .filter_map(|selector| document.select(selector).next())
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
