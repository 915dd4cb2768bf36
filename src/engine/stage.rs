//! Stage label derivation.
//!
//! Every presentation surface used to re-derive "where is this KPI?" with its
//! own branching, and the copies drifted. This is the single replacement: a
//! total pure function of the KPI status, the review status, and the
//! rejection resolution flag. Two callers given the same inputs always agree.

use crate::engine::state::{KpiStatus, ResolutionStatus, ReviewStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    GoalSetting,
    SelfRating,
    ManagerReview,
    Confirmation,
    Completed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub label: &'static str,
    pub category: StageCategory,
}

const fn stage(label: &'static str, category: StageCategory) -> Stage {
    Stage { label, category }
}

/// Collapse the lifecycle state into a human-readable stage.
///
/// `self_rating_enabled` only matters before a review row exists: with
/// self-rating disabled the next actor after acknowledgement is the manager.
pub fn derive_stage(
    kpi_status: KpiStatus,
    review_status: Option<ReviewStatus>,
    resolution: ResolutionStatus,
    self_rating_enabled: bool,
) -> Stage {
    if kpi_status == KpiStatus::Pending {
        return stage(
            "KPI Setting - Awaiting Acknowledgement",
            StageCategory::GoalSetting,
        );
    }

    match review_status {
        None => {
            if self_rating_enabled {
                stage("Awaiting Employee Self Rating", StageCategory::SelfRating)
            } else {
                stage("Awaiting Manager Rating", StageCategory::ManagerReview)
            }
        }
        Some(ReviewStatus::Pending) => {
            stage("Awaiting Employee Self Rating", StageCategory::SelfRating)
        }
        Some(ReviewStatus::EmployeeSubmitted) => {
            stage("Awaiting Manager Rating", StageCategory::ManagerReview)
        }
        Some(ReviewStatus::ManagerSubmitted) => stage(
            "Awaiting Employee Confirmation",
            StageCategory::Confirmation,
        ),
        Some(ReviewStatus::Completed) => stage("KPI Review Completed", StageCategory::Completed),
        Some(ReviewStatus::Rejected) => match resolution {
            ResolutionStatus::None => stage(
                "Rating Rejected - Awaiting HR Resolution",
                StageCategory::Rejected,
            ),
            ResolutionStatus::Resolved => stage(
                "Rating Rejected - Resolution Recorded",
                StageCategory::Rejected,
            ),
        },
    }
}
