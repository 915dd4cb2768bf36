//! Reconciliation of legacy review payloads.
//!
//! Older review rows stored per-item ratings as a JSON array embedded in the
//! overall comment field, and the field names drifted over time
//! (`rating` vs `rating_value`, `itemId` vs `kpi_item_id`). That payload is
//! decoded here, exactly once, at the storage boundary. The engine only ever
//! sees first-class rating records.

use crate::db::models::CreateItemRating;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LegacyPayloadError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Deserialize)]
struct LegacyItemRating {
    #[serde(alias = "itemId", alias = "kpiItemId")]
    kpi_item_id: Option<i64>,
    #[serde(alias = "rating")]
    rating_value: Option<f64>,
    comment: Option<String>,
    #[serde(alias = "actualValue")]
    actual_value: Option<f64>,
    #[serde(alias = "targetValue")]
    target_value: Option<f64>,
    #[serde(alias = "goalWeight")]
    goal_weight: Option<f64>,
}

/// Decode a legacy JSON-encoded rating list from a review comment field.
///
/// Returns `None` when the comment is ordinary prose rather than a legacy
/// payload. Entries without an item id are rejected rather than dropped,
/// since a partial import would silently skew aggregates.
pub fn parse_legacy_item_ratings(
    comment: &str,
) -> Result<Option<Vec<CreateItemRating>>, LegacyPayloadError> {
    let trimmed = comment.trim();
    if !trimmed.starts_with('[') {
        return Ok(None);
    }

    let entries: Vec<LegacyItemRating> = serde_json::from_str(trimmed)?;

    let mut ratings = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.into_iter().enumerate() {
        let kpi_item_id = entry.kpi_item_id.ok_or_else(|| {
            LegacyPayloadError::InvalidPayload(format!("entry {} has no item id", idx))
        })?;

        ratings.push(CreateItemRating {
            kpi_item_id,
            rating_value: entry.rating_value,
            comment: entry.comment,
            actual_value: entry.actual_value,
            target_value: entry.target_value,
            goal_weight: entry.goal_weight,
            qualitative_rating: None,
        });
    }

    Ok(Some(ratings))
}
