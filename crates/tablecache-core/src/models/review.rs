use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;

/// Lowest and highest accepted star rating.
pub const RATING_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(deserialize_with = "lenient::u64_or_string")]
    pub restaurant_id: u64,
    pub name: String,
    #[serde(deserialize_with = "lenient::u8_or_string")]
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Review {
    pub fn stars(&self) -> String {
        let filled = self.rating.min(*RATING_RANGE.end()) as usize;
        format!("{}{}", "★".repeat(filled), "☆".repeat(*RATING_RANGE.end() as usize - filled))
    }
}

/// A review as submitted by the user, before the server has assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub restaurant_id: u64,
    pub name: String,
    pub rating: u8,
    pub comments: String,
}

impl NewReview {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("reviewer name must not be empty".to_string());
        }
        if !RATING_RANGE.contains(&self.rating) {
            return Err(format!(
                "rating must be between {} and {}, got {}",
                RATING_RANGE.start(),
                RATING_RANGE.end(),
                self.rating
            ));
        }
        Ok(())
    }
}
