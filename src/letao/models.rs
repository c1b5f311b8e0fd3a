//! Cart request and outcome models for the Letao proxy-shopping service.

use crate::error::CartError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Image CDN used when only a Suruga-ya product id is known.
pub const SURUGAYA_IMAGE_CDN: &str = "https://cdn.suruga-ya.jp/database/pics_light/game";

/// One item to place in the Letao cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddToCartRequest {
    /// Suruga-ya listing url
    pub url: String,
    /// Product image; derived from `product_id` when blank
    pub image_url: String,
    /// Suruga-ya product id
    pub product_id: String,
    pub title: String,
    /// Variant description (condition, edition)
    pub spec: String,
    /// Unit price in yen as displayed, e.g. "1,980"
    pub unit_price: String,
    /// Defaults to "1"
    pub quantity: String,
    /// Note for the shopper
    pub comment: String,
}

impl AddToCartRequest {
    /// Checks the fields the cart endpoint requires.
    pub fn validate(&self) -> Result<(), CartError> {
        let missing: Vec<&str> = [
            ("url", self.url.trim().is_empty()),
            ("title", self.title.trim().is_empty()),
            ("unit_price", self.cleaned_unit_price().is_empty()),
            ("image_url", self.effective_image_url().is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CartError::Invalid(format!("missing required field(s): {}", missing.join(", "))))
        }
    }

    /// Returns the image url, deriving it from the product id when none was given.
    pub fn effective_image_url(&self) -> Option<String> {
        let image = self.image_url.trim();
        if !image.is_empty() {
            return Some(image.to_string());
        }

        let id = self.product_id.trim();
        (!id.is_empty()).then(|| format!("{}/{}.jpg", SURUGAYA_IMAGE_CDN, id))
    }

    /// Unit price without thousands separators or whitespace.
    pub fn cleaned_unit_price(&self) -> String {
        self.unit_price.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect()
    }

    pub fn quantity_or_default(&self) -> &str {
        match self.quantity.trim() {
            "" => "1",
            q => q,
        }
    }

    /// Form fields for the cart endpoint.
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("save", "add".to_string()),
            ("url", self.url.trim().to_string()),
            ("img", self.effective_image_url().unwrap_or_default()),
            ("title", self.title.trim().to_string()),
            ("spec", self.spec.clone()),
            ("unit_price", self.cleaned_unit_price()),
            ("quantity", self.quantity_or_default().to_string()),
            ("comment", self.comment.clone()),
        ]
    }
}

/// Cart endpoint reply before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCartResponse {
    pub http_status: u16,
    /// Body with `\uXXXX` escapes already decoded
    pub body: String,
}

/// JSON envelope returned by Letao endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CartEnvelope {
    /// Numeric or string code
    pub code: Value,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "cartNum")]
    pub cart_num: Option<Value>,
    #[serde(default, rename = "cartHostNum")]
    pub cart_host_num: Option<Value>,
}

impl CartEnvelope {
    /// Parses an envelope; None when the body is not one.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body.trim()).ok()
    }

    /// The code as a number, accepting `200` and `"200"` alike.
    pub fn code(&self) -> Option<i64> {
        match &self.code {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Interpreted result of one cart-add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartOutcome {
    pub success: bool,
    pub message: String,
    /// Envelope code, 422 for cart-level rejections, or the HTTP status for non-JSON bodies
    pub status_code: i64,
    pub raw_response: String,
}

/// Per-item line of a batch add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItemResult {
    pub title: String,
    pub url: String,
    pub success: bool,
    pub message: String,
    pub status_code: i64,
}

/// Result of adding several items in sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchCartOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<CartItemResult>,
}

impl BatchCartOutcome {
    pub fn all_success(&self) -> bool {
        self.failed == 0
    }

    pub(crate) fn push(&mut self, result: CartItemResult) {
        self.total += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }
}
