//! The review lifecycle state machine.
//!
//! Authoritative status of a KPI review and the guards on every transition:
//!
//! ```text
//! NONE -> PENDING -> EMPLOYEE_SUBMITTED -> MANAGER_SUBMITTED -> COMPLETED
//!                                                            -> REJECTED
//! ```
//!
//! When self-rating is disabled for the KPI's period, the manager initiates
//! instead and `MANAGER_SUBMITTED` is reached without an `EMPLOYEE_SUBMITTED`
//! predecessor. `REJECTED` carries the orthogonal resolution sub-flag.
//!
//! Every transition is a compare-and-swap on the stored status: the caller
//! supplies the state it read, and a mismatch is refused with a
//! `StateConflict`, never silently overwritten. This gates payroll-adjacent
//! approvals, so illegal transitions are hard errors.

use crate::db::models::{CreateAccomplishment, KpiItem};
use crate::engine::aggregate::{aggregate, Aggregate, RaterRole, RatingInput};
use crate::engine::config::{CalculationMethod, CalculationSettings};
use crate::engine::error::EngineError;
use crate::engine::normalize::normalize;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MIN_ACCOMPLISHMENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiStatus {
    Pending,
    Acknowledged,
}

impl KpiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KpiStatus::Pending => "pending",
            KpiStatus::Acknowledged => "acknowledged",
        }
    }
}

impl FromStr for KpiStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(KpiStatus::Pending),
            "acknowledged" => Ok(KpiStatus::Acknowledged),
            other => Err(EngineError::validation(
                "kpi_status",
                format!("unknown KPI status: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    EmployeeSubmitted,
    ManagerSubmitted,
    Completed,
    Rejected,
}

impl ReviewStatus {
    /// Canonical stored form. `manager_submitted` is written for the state
    /// some callers still spell `awaiting_employee_confirmation`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::EmployeeSubmitted => "employee_submitted",
            ReviewStatus::ManagerSubmitted => "manager_submitted",
            ReviewStatus::Completed => "completed",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "employee_submitted" => Ok(ReviewStatus::EmployeeSubmitted),
            // Legacy alias, accepted on read and rewritten on write.
            "manager_submitted" | "awaiting_employee_confirmation" => {
                Ok(ReviewStatus::ManagerSubmitted)
            }
            "completed" => Ok(ReviewStatus::Completed),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(EngineError::validation(
                "review_status",
                format!("unknown review status: {}", other),
            )),
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    None,
    Resolved,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStatus::None => "none",
            ResolutionStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for ResolutionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ResolutionStatus::None),
            "resolved" => Ok(ResolutionStatus::Resolved),
            other => Err(EngineError::validation(
                "rejection_resolved_status",
                format!("unknown resolution status: {}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationAction {
    Approve,
    Reject,
}

impl FromStr for ConfirmationAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ConfirmationAction::Approve),
            "reject" => Ok(ConfirmationAction::Reject),
            other => Err(EngineError::validation(
                "action",
                format!("unknown confirmation action: {}", other),
            )),
        }
    }
}

fn status_name(status: Option<ReviewStatus>) -> String {
    match status {
        Some(status) => status.as_str().to_string(),
        None => "none".to_string(),
    }
}

/// Compare-and-swap precondition: the stored status must match what the
/// caller read. A mismatch means another actor got there first.
pub fn ensure_expected(
    stored: Option<ReviewStatus>,
    expected: Option<ReviewStatus>,
) -> Result<(), EngineError> {
    if stored == expected {
        Ok(())
    } else {
        Err(EngineError::conflict(
            status_name(expected),
            status_name(stored),
        ))
    }
}

fn ensure_acknowledged(kpi_status: KpiStatus) -> Result<(), EngineError> {
    if kpi_status == KpiStatus::Acknowledged {
        Ok(())
    } else {
        Err(EngineError::validation(
            "kpi_status",
            "KPI must be acknowledged before review can begin",
        ))
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Guard for `NONE/PENDING -> EMPLOYEE_SUBMITTED`.
pub fn validate_self_rating_submission(
    kpi_status: KpiStatus,
    settings: &CalculationSettings,
    current: Option<ReviewStatus>,
    items: &[KpiItem],
    ratings: &[RatingInput],
    accomplishments: &[CreateAccomplishment],
    signature: Option<&str>,
    review_date: Option<NaiveDate>,
) -> Result<(), EngineError> {
    ensure_acknowledged(kpi_status)?;

    if !settings.self_rating_enabled() {
        return Err(EngineError::validation(
            "config",
            "employee self-rating is disabled for this period",
        ));
    }

    match current {
        None | Some(ReviewStatus::Pending) => {}
        Some(other) => {
            return Err(EngineError::conflict("pending", other.as_str()));
        }
    }

    if accomplishments.len() < MIN_ACCOMPLISHMENTS {
        return Err(EngineError::validation(
            "accomplishments",
            format!("at least {} accomplishments are required", MIN_ACCOMPLISHMENTS),
        ));
    }
    for (idx, accomplishment) in accomplishments.iter().enumerate() {
        if accomplishment.title.trim().is_empty() {
            return Err(EngineError::validation(
                "accomplishments",
                format!("accomplishment {} has an empty title", idx + 1),
            ));
        }
        if accomplishment.employee_rating.is_none() {
            return Err(EngineError::validation(
                "accomplishments",
                format!("accomplishment {} has no rating", idx + 1),
            ));
        }
    }

    for item in items.iter().filter(|item| !item.is_qualitative) {
        let rated = ratings
            .iter()
            .find(|rating| rating.kpi_item_id == item.id)
            .and_then(|rating| rating.rating_value)
            .map(|value| value > 0.0)
            .unwrap_or(false);
        if !rated {
            return Err(EngineError::validation(
                "ratings",
                format!("item \"{}\" has not been rated", item.title),
            ));
        }
    }

    if !has_text(signature) {
        return Err(EngineError::validation(
            "signature",
            "a signature is required",
        ));
    }
    if review_date.is_none() {
        return Err(EngineError::validation(
            "review_date",
            "a review date is required",
        ));
    }

    Ok(())
}

/// Guard for the manager rating submission. From `EMPLOYEE_SUBMITTED`, or
/// directly from no review at all when self-rating is disabled for the KPI's
/// period (the manager-initiated path).
pub fn validate_manager_submission(
    kpi_status: KpiStatus,
    settings: &CalculationSettings,
    current: Option<ReviewStatus>,
) -> Result<(), EngineError> {
    ensure_acknowledged(kpi_status)?;

    match current {
        Some(ReviewStatus::EmployeeSubmitted) => Ok(()),
        None if !settings.self_rating_enabled() => Ok(()),
        None => Err(EngineError::conflict("employee_submitted", "none")),
        Some(other) => Err(EngineError::conflict("employee_submitted", other.as_str())),
    }
}

/// Guard for `MANAGER_SUBMITTED -> COMPLETED | REJECTED`.
pub fn validate_confirmation(
    current: Option<ReviewStatus>,
    action: ConfirmationAction,
    note: Option<&str>,
    signature: Option<&str>,
) -> Result<ReviewStatus, EngineError> {
    match current {
        Some(ReviewStatus::ManagerSubmitted) => {}
        other => {
            return Err(EngineError::conflict("manager_submitted", status_name(other)));
        }
    }

    match action {
        ConfirmationAction::Approve => {
            if !has_text(signature) {
                return Err(EngineError::validation(
                    "signature",
                    "a signature is required to approve",
                ));
            }
            Ok(ReviewStatus::Completed)
        }
        ConfirmationAction::Reject => {
            if !has_text(note) {
                return Err(EngineError::validation(
                    "rejection_note",
                    "a rejection note is required",
                ));
            }
            Ok(ReviewStatus::Rejected)
        }
    }
}

/// Guard for HR resolution of a rejection. Changes only the sub-flag, never
/// `review_status`.
pub fn validate_resolution(
    current: Option<ReviewStatus>,
    resolution: ResolutionStatus,
    note: Option<&str>,
) -> Result<(), EngineError> {
    match current {
        Some(ReviewStatus::Rejected) => {}
        other => {
            return Err(EngineError::conflict("rejected", status_name(other)));
        }
    }

    if resolution == ResolutionStatus::Resolved {
        return Err(EngineError::conflict("unresolved rejection", "resolved"));
    }

    if !has_text(note) {
        return Err(EngineError::validation(
            "resolution_note",
            "a resolution note is required",
        ));
    }

    Ok(())
}

/// Computed rating fields for a submission: the raw aggregate plus the value
/// stored in the `_final_` column.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub aggregate: Aggregate,
    pub final_rating: f64,
}

/// Employee aggregate, snapped to the allowed self-rating set under
/// normal/goal-weight calculation. Actual-vs-target has no employee numeric
/// aggregate and is never snapped.
pub fn employee_rating_outcome(
    items: &[KpiItem],
    ratings: &[RatingInput],
    settings: &CalculationSettings,
) -> RatingOutcome {
    let method = settings.method();
    let aggregate = aggregate(items, ratings, method, RaterRole::Employee);
    let final_rating = match method {
        CalculationMethod::ActualVsTarget => aggregate.total,
        _ => {
            if aggregate.degenerate {
                0.0
            } else {
                normalize(aggregate.total)
            }
        }
    };
    RatingOutcome {
        aggregate,
        final_rating,
    }
}

/// Manager aggregate. Never snapped, whatever the method.
pub fn manager_rating_outcome(
    items: &[KpiItem],
    ratings: &[RatingInput],
    settings: &CalculationSettings,
) -> RatingOutcome {
    let aggregate = aggregate(items, ratings, settings.method(), RaterRole::Manager);
    RatingOutcome {
        final_rating: aggregate.total,
        aggregate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, is_qualitative: bool) -> KpiItem {
        KpiItem {
            id,
            kpi_id: 1,
            title: format!("Item {}", id),
            description: None,
            target_value: Some(100.0),
            actual_value: None,
            measure_unit: None,
            goal_weight: 0.5,
            is_qualitative,
            qualitative_rating: None,
            display_order: id,
        }
    }

    fn rating(kpi_item_id: i64, value: f64) -> RatingInput {
        RatingInput {
            kpi_item_id,
            rating_value: Some(value),
            actual_value: None,
            target_value: None,
            goal_weight: None,
        }
    }

    fn accomplishment(title: &str) -> CreateAccomplishment {
        CreateAccomplishment {
            title: title.to_string(),
            description: None,
            employee_rating: Some(1.25),
        }
    }

    fn settings() -> CalculationSettings {
        CalculationSettings::default_config()
    }

    fn valid_submission_parts() -> (Vec<KpiItem>, Vec<RatingInput>, Vec<CreateAccomplishment>) {
        (
            vec![item(1, false), item(2, false)],
            vec![rating(1, 1.25), rating(2, 1.5)],
            vec![accomplishment("Shipped rollout"), accomplishment("Cut costs")],
        )
    }

    #[test]
    fn test_review_status_accepts_both_labels_for_one_state() {
        let canonical: ReviewStatus = "manager_submitted".parse().unwrap();
        let alias: ReviewStatus = "awaiting_employee_confirmation".parse().unwrap();
        assert_eq!(canonical, alias);
        assert_eq!(canonical.as_str(), "manager_submitted");
    }

    #[test]
    fn test_self_rating_submission_happy_path() {
        let (items, ratings, accomplishments) = valid_submission_parts();
        validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("E. Signature"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap();
    }

    #[test]
    fn test_self_rating_requires_acknowledged_kpi() {
        let (items, ratings, accomplishments) = valid_submission_parts();
        let err = validate_self_rating_submission(
            KpiStatus::Pending,
            &settings(),
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "kpi_status", .. }));
    }

    #[test]
    fn test_self_rating_requires_enough_accomplishments() {
        let (items, ratings, _) = valid_submission_parts();
        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &ratings,
            &[accomplishment("Only one")],
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "accomplishments", .. }));
    }

    #[test]
    fn test_self_rating_rejects_unrated_accomplishment() {
        let (items, ratings, mut accomplishments) = valid_submission_parts();
        accomplishments[1].employee_rating = None;
        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "accomplishments", .. }));
    }

    #[test]
    fn test_self_rating_requires_every_numeric_item_rated() {
        let (items, _, accomplishments) = valid_submission_parts();
        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &[rating(1, 1.25), rating(2, 0.0)],
            &accomplishments,
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "ratings", .. }));
    }

    #[test]
    fn test_self_rating_skips_qualitative_items() {
        let items = vec![item(1, false), item(2, true)];
        let (_, _, accomplishments) = valid_submission_parts();
        validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &[rating(1, 1.5)],
            &accomplishments,
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap();
    }

    #[test]
    fn test_self_rating_requires_signature_and_date() {
        let (items, ratings, accomplishments) = valid_submission_parts();
        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("   "),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "signature", .. }));

        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &settings(),
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("sig"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "review_date", .. }));
    }

    #[test]
    fn test_self_rating_rejected_when_disabled() {
        let (items, ratings, accomplishments) = valid_submission_parts();
        let mut config = settings();
        config.enable_employee_self_rating = false;
        let err = validate_self_rating_submission(
            KpiStatus::Acknowledged,
            &config,
            None,
            &items,
            &ratings,
            &accomplishments,
            Some("sig"),
            Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "config", .. }));
    }

    #[test]
    fn test_self_rating_from_wrong_state_is_a_conflict() {
        let (items, ratings, accomplishments) = valid_submission_parts();
        for stored in [
            ReviewStatus::EmployeeSubmitted,
            ReviewStatus::ManagerSubmitted,
            ReviewStatus::Completed,
            ReviewStatus::Rejected,
        ] {
            let err = validate_self_rating_submission(
                KpiStatus::Acknowledged,
                &settings(),
                Some(stored),
                &items,
                &ratings,
                &accomplishments,
                Some("sig"),
                Some(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()),
            )
            .unwrap_err();
            assert!(matches!(err, EngineError::StateConflict { .. }));
        }
    }

    #[test]
    fn test_manager_submission_requires_employee_submitted() {
        validate_manager_submission(
            KpiStatus::Acknowledged,
            &settings(),
            Some(ReviewStatus::EmployeeSubmitted),
        )
        .unwrap();

        for stored in [
            Some(ReviewStatus::Pending),
            Some(ReviewStatus::ManagerSubmitted),
            Some(ReviewStatus::Completed),
            Some(ReviewStatus::Rejected),
            None,
        ] {
            let err =
                validate_manager_submission(KpiStatus::Acknowledged, &settings(), stored)
                    .unwrap_err();
            assert!(matches!(err, EngineError::StateConflict { .. }));
        }
    }

    #[test]
    fn test_manager_initiates_when_self_rating_disabled() {
        let mut config = settings();
        config.enable_employee_self_rating = false;

        validate_manager_submission(KpiStatus::Acknowledged, &config, None).unwrap();

        // An existing half-done review still conflicts.
        let err = validate_manager_submission(
            KpiStatus::Acknowledged,
            &config,
            Some(ReviewStatus::Completed),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[test]
    fn test_confirmation_guards() {
        let next = validate_confirmation(
            Some(ReviewStatus::ManagerSubmitted),
            ConfirmationAction::Approve,
            None,
            Some("sig"),
        )
        .unwrap();
        assert_eq!(next, ReviewStatus::Completed);

        let next = validate_confirmation(
            Some(ReviewStatus::ManagerSubmitted),
            ConfirmationAction::Reject,
            Some("I disagree with item 2"),
            None,
        )
        .unwrap();
        assert_eq!(next, ReviewStatus::Rejected);

        let err = validate_confirmation(
            Some(ReviewStatus::ManagerSubmitted),
            ConfirmationAction::Approve,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "signature", .. }));

        let err = validate_confirmation(
            Some(ReviewStatus::ManagerSubmitted),
            ConfirmationAction::Reject,
            Some(""),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "rejection_note", .. }));
    }

    #[test]
    fn test_confirmation_from_any_other_state_is_a_conflict() {
        for stored in [
            None,
            Some(ReviewStatus::Pending),
            Some(ReviewStatus::EmployeeSubmitted),
            Some(ReviewStatus::Completed),
            Some(ReviewStatus::Rejected),
        ] {
            let err = validate_confirmation(
                stored,
                ConfirmationAction::Approve,
                None,
                Some("sig"),
            )
            .unwrap_err();
            assert!(matches!(err, EngineError::StateConflict { .. }));
        }
    }

    #[test]
    fn test_resolution_guards() {
        validate_resolution(
            Some(ReviewStatus::Rejected),
            ResolutionStatus::None,
            Some("Re-rated after discussion"),
        )
        .unwrap();

        let err = validate_resolution(
            Some(ReviewStatus::Rejected),
            ResolutionStatus::Resolved,
            Some("again"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));

        let err =
            validate_resolution(Some(ReviewStatus::Rejected), ResolutionStatus::None, None)
                .unwrap_err();
        assert!(matches!(err, EngineError::Validation { field: "resolution_note", .. }));

        let err = validate_resolution(
            Some(ReviewStatus::Completed),
            ResolutionStatus::None,
            Some("note"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[test]
    fn test_compare_and_swap_precondition() {
        ensure_expected(Some(ReviewStatus::Pending), Some(ReviewStatus::Pending)).unwrap();
        ensure_expected(None, None).unwrap();

        let err =
            ensure_expected(Some(ReviewStatus::Rejected), Some(ReviewStatus::ManagerSubmitted))
                .unwrap_err();
        assert_eq!(
            err,
            EngineError::conflict("manager_submitted", "rejected")
        );
    }

    #[test]
    fn test_employee_outcome_is_normalized() {
        let items = vec![item(1, false), item(2, false)];
        let ratings = vec![rating(1, 1.25), rating(2, 1.5)];
        let outcome = employee_rating_outcome(&items, &ratings, &settings());
        // Raw average 1.375 ties between 1.25 and 1.50; lower wins.
        assert!((outcome.aggregate.total - 1.375).abs() < 1e-9);
        assert_eq!(outcome.final_rating, 1.25);
    }

    #[test]
    fn test_manager_outcome_is_never_snapped() {
        let items = vec![item(1, false), item(2, false)];
        let ratings = vec![rating(1, 1.25), rating(2, 1.5)];
        let outcome = manager_rating_outcome(&items, &ratings, &settings());
        assert!((outcome.final_rating - 1.375).abs() < 1e-9);
    }
}
