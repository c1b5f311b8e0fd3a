//! CSS selectors for Suruga-ya listing pages.
//!
//! This file contains all CSS selectors used for parsing product detail pages.
//! Update this file when Suruga-ya changes their HTML structure.
//!
//! **Update process**: When parsing degrades, capture the rendered HTML from
//! FlareSolverr, update selectors, and extend the test fixture.

use scraper::Selector;
use std::sync::LazyLock;

/// Selectors for the product detail page.
pub mod product {
    use super::*;

    /// Title candidates, most specific first.
    pub static TITLE_CANDIDATES: LazyLock<[Selector; 3]> = LazyLock::new(|| {
        [
            Selector::parse("h1.h1_title_product").unwrap(),
            Selector::parse("h1#item_title").unwrap(),
            Selector::parse("h1").unwrap(),
        ]
    });

    /// Image candidates, most specific first.
    pub static IMAGE_CANDIDATES: LazyLock<[Selector; 2]> = LazyLock::new(|| {
        [Selector::parse("div.item_img img").unwrap(), Selector::parse("img.img-fluid").unwrap()]
    });

    /// Sold-out banner.
    pub static OUT_OF_STOCK: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div.out-of-stock-text").unwrap());

    /// Strike-through list price.
    pub static PRICE_OLD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.text-price-detail.price-old").unwrap());

    /// Price the buyer actually pays.
    pub static PRICE_BUY: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.text-price-detail.price-buy").unwrap());

    /// Stock tag (e.g. "中古", "新品").
    pub static STOCK_TAG: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.tag_product.blue-light > span").unwrap());

    /// Secondary tag used when no stock tag is present.
    pub static POPULAR_TAG: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("span.tag_product.tag_popular").unwrap());

    /// Time-sale banner.
    pub static FLASH_SALE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div.flash_sale").unwrap());
}

/// Selectors for pages FlareSolverr failed to get past.
pub mod challenge {
    use super::*;

    /// Cloudflare challenge form.
    pub static FORM: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse("#challenge-form, #challenge-stage, #cf-challenge-running").unwrap()
    });

    /// Document title, checked for "Just a moment".
    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
}
