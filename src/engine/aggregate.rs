//! Item rating aggregation.
//!
//! Pure computation: given a KPI's items and one rater's rating records,
//! produce per-item contributions and the aggregate total under the resolved
//! calculation method. Qualitative items never enter a numerator, denominator,
//! or weight sum. A missing or malformed rating counts as 0 — flagging
//! "Not submitted" from absence is the caller's concern, not an error here.

use crate::engine::config::CalculationMethod;
use crate::db::models::{CreateItemRating, ItemRating, KpiItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::engine::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaterRole {
    Employee,
    Manager,
}

impl RaterRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaterRole::Employee => "employee",
            RaterRole::Manager => "manager",
        }
    }
}

impl FromStr for RaterRole {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "employee" => Ok(RaterRole::Employee),
            "manager" => Ok(RaterRole::Manager),
            other => Err(EngineError::validation(
                "rater_role",
                format!("unknown rater role: {}", other),
            )),
        }
    }
}

impl fmt::Display for RaterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rater's input for one item, decoupled from where it came from
/// (a stored row, a submission DTO, or a decoded legacy payload).
#[derive(Debug, Clone, PartialEq)]
pub struct RatingInput {
    pub kpi_item_id: i64,
    pub rating_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub target_value: Option<f64>,
    pub goal_weight: Option<f64>,
}

impl From<&ItemRating> for RatingInput {
    fn from(rating: &ItemRating) -> Self {
        RatingInput {
            kpi_item_id: rating.kpi_item_id,
            rating_value: rating.rating_value,
            actual_value: rating.actual_value,
            target_value: rating.target_value,
            goal_weight: rating.goal_weight,
        }
    }
}

impl From<&CreateItemRating> for RatingInput {
    fn from(rating: &CreateItemRating) -> Self {
        RatingInput {
            kpi_item_id: rating.kpi_item_id,
            rating_value: rating.rating_value,
            actual_value: rating.actual_value,
            target_value: rating.target_value,
            goal_weight: rating.goal_weight,
        }
    }
}

/// Aggregation result. `total_weight` is informational: under goal-weight
/// mode it is expected to be close to 1.0 but is surfaced, never corrected.
/// `degenerate` marks the zero-eligible-items case (an all-qualitative KPI is
/// valid), where `total` is 0 by definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub per_item: HashMap<i64, f64>,
    pub total: f64,
    pub total_weight: f64,
    pub rated_item_count: usize,
    pub degenerate: bool,
}

impl Aggregate {
    fn empty(degenerate: bool) -> Self {
        Aggregate {
            per_item: HashMap::new(),
            total: 0.0,
            total_weight: 0.0,
            rated_item_count: 0,
            degenerate,
        }
    }
}

/// Percentage of target achieved. Zero targets yield 0 rather than a
/// division error.
pub fn percentage_obtained(actual_value: f64, target_value: f64) -> f64 {
    if target_value == 0.0 {
        0.0
    } else {
        (actual_value / target_value) * 100.0
    }
}

/// Aggregate one rater's ratings over a KPI's items.
///
/// `ratings` must be the records of the given `rater_role`; the role only
/// changes behavior under actual-vs-target mode, which has no employee
/// numeric aggregate.
pub fn aggregate(
    items: &[KpiItem],
    ratings: &[RatingInput],
    method: CalculationMethod,
    rater_role: RaterRole,
) -> Aggregate {
    let eligible: Vec<&KpiItem> = items.iter().filter(|item| !item.is_qualitative).collect();
    if eligible.is_empty() {
        return Aggregate::empty(true);
    }

    let by_item: HashMap<i64, &RatingInput> = ratings
        .iter()
        .map(|rating| (rating.kpi_item_id, rating))
        .collect();

    let rated_item_count = eligible
        .iter()
        .filter(|item| {
            by_item
                .get(&item.id)
                .and_then(|rating| rating.rating_value)
                .is_some()
        })
        .count();

    match method {
        CalculationMethod::Normal => {
            let mut per_item = HashMap::new();
            let mut sum = 0.0;
            for item in &eligible {
                let value = by_item
                    .get(&item.id)
                    .and_then(|rating| rating.rating_value)
                    .unwrap_or(0.0);
                per_item.insert(item.id, value);
                sum += value;
            }
            Aggregate {
                per_item,
                total: sum / eligible.len() as f64,
                total_weight: 0.0,
                rated_item_count,
                degenerate: false,
            }
        }
        CalculationMethod::GoalWeight => {
            let mut per_item = HashMap::new();
            let mut total = 0.0;
            let mut total_weight = 0.0;
            for item in &eligible {
                let value = by_item
                    .get(&item.id)
                    .and_then(|rating| rating.rating_value)
                    .unwrap_or(0.0);
                let contribution = value * item.goal_weight;
                per_item.insert(item.id, contribution);
                total += contribution;
                total_weight += item.goal_weight;
            }
            Aggregate {
                per_item,
                total,
                total_weight,
                rated_item_count,
                degenerate: false,
            }
        }
        CalculationMethod::ActualVsTarget => {
            // Only the manager produces a numeric aggregate in this mode.
            if rater_role != RaterRole::Manager {
                return Aggregate::empty(false);
            }

            let mut per_item = HashMap::new();
            let mut total = 0.0;
            let mut total_weight = 0.0;
            for item in &eligible {
                let rating = by_item.get(&item.id);
                let actual = rating
                    .and_then(|r| r.actual_value)
                    .or(item.actual_value)
                    .unwrap_or(0.0);
                let target = rating
                    .and_then(|r| r.target_value)
                    .or(item.target_value)
                    .unwrap_or(0.0);
                let weight = rating
                    .and_then(|r| r.goal_weight)
                    .unwrap_or(item.goal_weight);

                let contribution = percentage_obtained(actual, target) * weight;
                per_item.insert(item.id, contribution);
                total += contribution;
                total_weight += weight;
            }
            Aggregate {
                per_item,
                total,
                total_weight,
                rated_item_count,
                degenerate: false,
            }
        }
    }
}
