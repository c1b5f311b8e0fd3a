//! Category assignments and keyword rules.

use serde::{Deserialize, Serialize};

/// Why an item sits on the wishlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurposeCategory {
    #[default]
    Unclassified,
    Personal,
    Gift,
    Resale,
}

impl std::str::FromStr for PurposeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unclassified" | "none" => Ok(PurposeCategory::Unclassified),
            "personal" => Ok(PurposeCategory::Personal),
            "gift" => Ok(PurposeCategory::Gift),
            "resale" => Ok(PurposeCategory::Resale),
            _ => Err(format!(
                "Unknown purpose category: {}. Use: unclassified, personal, gift, resale",
                s
            )),
        }
    }
}

impl std::fmt::Display for PurposeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PurposeCategory::Unclassified => write!(f, "unclassified"),
            PurposeCategory::Personal => write!(f, "personal"),
            PurposeCategory::Gift => write!(f, "gift"),
            PurposeCategory::Resale => write!(f, "resale"),
        }
    }
}

/// Per-url classification. Created on first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub url: String,
    #[serde(default)]
    pub purpose_category: PurposeCategory,
    #[serde(default)]
    pub series_name: Option<String>,
}

impl CategoryAssignment {
    /// Creates an unclassified assignment with no series.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), purpose_category: PurposeCategory::default(), series_name: None }
    }
}

/// A substring rule mapping a Japanese title fragment to a series name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMapping {
    /// Store-assigned, increasing
    pub id: u64,
    pub japanese_key: String,
    pub chinese_name: String,
}
