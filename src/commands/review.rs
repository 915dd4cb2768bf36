use crate::commands::config::settings_for;
use crate::commands::kpi::{load_items, load_kpi};
use crate::db::models::{
    Accomplishment, CreateAccomplishment, CreateItemRating, ItemRating, Kpi, KpiItem, KpiReview,
};
use crate::engine::state::{
    self, ConfirmationAction, ResolutionStatus, ReviewStatus,
};
use crate::engine::{
    derive_stage, percentage_obtained, CalculationMethod, CalculationSettings, EngineError,
    KpiStatus, Period, RaterRole, RatingInput, StageCategory,
};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const QUALITATIVE_RATINGS: [&str; 3] = ["exceeds", "meets", "needs_improvement"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfRatingSubmission {
    pub kpi_id: i64,
    pub ratings: Vec<CreateItemRating>,
    pub accomplishments: Vec<CreateAccomplishment>,
    pub overall_comment: Option<String>,
    pub signature: String,
    pub review_date: NaiveDate,
    /// Review status the caller last read; `None` means "no review row yet".
    pub expected_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRatingSubmission {
    pub kpi_id: i64,
    pub ratings: Vec<CreateItemRating>,
    pub comment: Option<String>,
    pub expected_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationSubmission {
    pub review_id: i64,
    pub action: String,
    pub note: Option<String>,
    pub signature: Option<String>,
    pub expected_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSubmission {
    pub review_id: i64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewWithAccomplishments {
    #[serde(flatten)]
    pub review: KpiReview,
    pub accomplishments: Vec<Accomplishment>,
}

/// Stage of a KPI as shown on every surface, plus the config facts the UI
/// flags alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStageView {
    pub label: String,
    pub category: StageCategory,
    pub method_name: String,
    pub config_is_default: bool,
}

fn parse_expected(expected: Option<&str>) -> Result<Option<ReviewStatus>> {
    match expected {
        Some(value) => Ok(Some(ReviewStatus::from_str(value)?)),
        None => Ok(None),
    }
}

async fn load_review_by_kpi(
    conn: &mut SqliteConnection,
    kpi_id: i64,
) -> Result<Option<KpiReview>> {
    let review = sqlx::query_as::<_, KpiReview>("SELECT * FROM kpi_reviews WHERE kpi_id = ?")
        .bind(kpi_id)
        .fetch_optional(conn)
        .await?;
    Ok(review)
}

async fn load_review(conn: &mut SqliteConnection, review_id: i64) -> Result<KpiReview> {
    sqlx::query_as::<_, KpiReview>("SELECT * FROM kpi_reviews WHERE id = ?")
        .bind(review_id)
        .fetch_optional(conn)
        .await?
        .ok_or(Error::not_found("Review", review_id))
}

async fn load_accomplishments(
    conn: &mut SqliteConnection,
    review_id: i64,
) -> Result<Vec<Accomplishment>> {
    let accomplishments = sqlx::query_as::<_, Accomplishment>(
        "SELECT * FROM review_accomplishments WHERE review_id = ? ORDER BY display_order, id",
    )
    .bind(review_id)
    .fetch_all(conn)
    .await?;
    Ok(accomplishments)
}

async fn settings_for_kpi(
    conn: &mut SqliteConnection,
    kpi: &Kpi,
) -> Result<CalculationSettings> {
    let period = Period::from_str(&kpi.period)?;
    settings_for(conn, kpi.department_id, period).await
}

fn ensure_known_items(items: &[KpiItem], ratings: &[CreateItemRating]) -> Result<()> {
    for rating in ratings {
        if !items.iter().any(|item| item.id == rating.kpi_item_id) {
            return Err(EngineError::validation(
                "ratings",
                format!("item {} does not belong to this KPI", rating.kpi_item_id),
            )
            .into());
        }
    }
    Ok(())
}

/// Upsert one rater's item ratings. Derived percentage fields are only
/// written for the manager under actual-vs-target mode; everything else
/// stores them as NULL.
async fn upsert_item_ratings(
    conn: &mut SqliteConnection,
    items: &[KpiItem],
    ratings: &[CreateItemRating],
    role: RaterRole,
    method: CalculationMethod,
) -> Result<()> {
    for rating in ratings {
        let Some(item) = items.iter().find(|item| item.id == rating.kpi_item_id) else {
            return Err(EngineError::validation(
                "ratings",
                format!("item {} does not belong to this KPI", rating.kpi_item_id),
            )
            .into());
        };

        let (percentage, weighted_percentage) =
            if role == RaterRole::Manager && method == CalculationMethod::ActualVsTarget {
                let actual = rating.actual_value.or(item.actual_value).unwrap_or(0.0);
                let target = rating.target_value.or(item.target_value).unwrap_or(0.0);
                let weight = rating.goal_weight.unwrap_or(item.goal_weight);
                let percentage = percentage_obtained(actual, target);
                (Some(percentage), Some(percentage * weight))
            } else {
                (None, None)
            };

        sqlx::query(
            r#"
            INSERT INTO item_ratings
                (kpi_item_id, rater_role, rating_value, comment, actual_value,
                 target_value, goal_weight, percentage_value_obtained,
                 manager_rating_percentage, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(kpi_item_id, rater_role) DO UPDATE
            SET rating_value = excluded.rating_value,
                comment = excluded.comment,
                actual_value = excluded.actual_value,
                target_value = excluded.target_value,
                goal_weight = excluded.goal_weight,
                percentage_value_obtained = excluded.percentage_value_obtained,
                manager_rating_percentage = excluded.manager_rating_percentage
            "#,
        )
        .bind(rating.kpi_item_id)
        .bind(role.as_str())
        .bind(rating.rating_value)
        .bind(&rating.comment)
        .bind(rating.actual_value)
        .bind(rating.target_value)
        .bind(rating.goal_weight)
        .bind(percentage)
        .bind(weighted_percentage)
        .execute(&mut *conn)
        .await?;

        // Qualitative verdicts live on the item itself and are manager-only.
        if let Some(qualitative) = rating.qualitative_rating.as_deref() {
            if role != RaterRole::Manager {
                return Err(EngineError::validation(
                    "qualitative_rating",
                    "only the manager records qualitative ratings",
                )
                .into());
            }
            if !QUALITATIVE_RATINGS.contains(&qualitative) {
                return Err(EngineError::validation(
                    "qualitative_rating",
                    format!("unknown qualitative rating: {}", qualitative),
                )
                .into());
            }
            sqlx::query("UPDATE kpi_items SET qualitative_rating = ? WHERE id = ?")
                .bind(qualitative)
                .bind(rating.kpi_item_id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

fn rating_inputs(ratings: &[CreateItemRating]) -> Vec<RatingInput> {
    ratings.iter().map(RatingInput::from).collect()
}

pub async fn get_review(
    pool: &SqlitePool,
    kpi_id: i64,
) -> Result<Option<ReviewWithAccomplishments>> {
    let mut conn = pool.acquire().await?;
    let Some(review) = load_review_by_kpi(&mut *conn, kpi_id).await? else {
        return Ok(None);
    };
    let accomplishments = load_accomplishments(&mut *conn, review.id).await?;
    Ok(Some(ReviewWithAccomplishments {
        review,
        accomplishments,
    }))
}

pub async fn get_item_ratings(
    pool: &SqlitePool,
    kpi_id: i64,
    rater_role: &str,
) -> Result<Vec<ItemRating>> {
    let role = RaterRole::from_str(rater_role)?;
    let ratings = sqlx::query_as::<_, ItemRating>(
        r#"
        SELECT r.* FROM item_ratings r
        JOIN kpi_items i ON i.id = r.kpi_item_id
        WHERE i.kpi_id = ? AND r.rater_role = ?
        ORDER BY i.display_order, i.id
        "#,
    )
    .bind(kpi_id)
    .bind(role.as_str())
    .fetch_all(pool)
    .await?;
    Ok(ratings)
}

/// Stage label for a KPI, derived once for every surface.
pub async fn get_review_stage(pool: &SqlitePool, kpi_id: i64) -> Result<ReviewStageView> {
    let mut conn = pool.acquire().await?;
    let kpi = load_kpi(&mut *conn, kpi_id).await?;
    let settings = settings_for_kpi(&mut *conn, &kpi).await?;
    let review = load_review_by_kpi(&mut *conn, kpi_id).await?;

    let kpi_status = KpiStatus::from_str(&kpi.status)?;
    let (review_status, resolution) = match &review {
        Some(review) => (
            Some(ReviewStatus::from_str(&review.review_status)?),
            ResolutionStatus::from_str(&review.rejection_resolved_status)?,
        ),
        None => (None, ResolutionStatus::None),
    };

    let stage = derive_stage(
        kpi_status,
        review_status,
        resolution,
        settings.self_rating_enabled(),
    );
    debug!(kpi_id, stage = stage.label, "stage derived");

    Ok(ReviewStageView {
        label: stage.label.to_string(),
        category: stage.category,
        method_name: settings.method_name().to_string(),
        config_is_default: settings.is_default,
    })
}

/// Employee self-rating: `NONE/PENDING -> EMPLOYEE_SUBMITTED`.
///
/// The whole submission runs in one transaction; the status-qualified
/// update makes the compare-and-swap hold even against a concurrent writer.
pub async fn submit_self_rating(
    pool: &SqlitePool,
    submission: SelfRatingSubmission,
) -> Result<ReviewWithAccomplishments> {
    let expected = parse_expected(submission.expected_status.as_deref())?;

    let mut tx = pool.begin().await?;

    let kpi = load_kpi(&mut *tx, submission.kpi_id).await?;
    let items = load_items(&mut *tx, submission.kpi_id).await?;
    let settings = settings_for_kpi(&mut *tx, &kpi).await?;

    let existing = load_review_by_kpi(&mut *tx, submission.kpi_id).await?;
    let current = existing
        .as_ref()
        .map(|review| ReviewStatus::from_str(&review.review_status))
        .transpose()?;

    state::ensure_expected(current, expected)?;
    ensure_known_items(&items, &submission.ratings)?;

    let inputs = rating_inputs(&submission.ratings);
    state::validate_self_rating_submission(
        KpiStatus::from_str(&kpi.status)?,
        &settings,
        current,
        &items,
        &inputs,
        &submission.accomplishments,
        Some(&submission.signature),
        Some(submission.review_date),
    )?;

    let outcome = state::employee_rating_outcome(&items, &inputs, &settings);

    upsert_item_ratings(
        &mut *tx,
        &items,
        &submission.ratings,
        RaterRole::Employee,
        settings.method(),
    )
    .await?;

    let review = match &existing {
        Some(existing) => sqlx::query_as::<_, KpiReview>(
            r#"
            UPDATE kpi_reviews
            SET review_status = 'employee_submitted',
                employee_rating = ?,
                employee_final_rating = ?,
                employee_comment = ?,
                employee_signature = ?,
                review_date = ?,
                updated_at = datetime('now')
            WHERE id = ? AND review_status = 'pending'
            RETURNING *
            "#,
        )
        .bind(outcome.aggregate.total)
        .bind(outcome.final_rating)
        .bind(&submission.overall_comment)
        .bind(&submission.signature)
        .bind(submission.review_date)
        .bind(existing.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EngineError::conflict("pending", "changed concurrently"))?,
        None => sqlx::query_as::<_, KpiReview>(
            r#"
            INSERT INTO kpi_reviews
                (kpi_id, employee_id, manager_id, review_status, employee_rating,
                 employee_final_rating, employee_comment, employee_signature,
                 review_date, rejection_resolved_status, created_at, updated_at)
            VALUES (?, ?, ?, 'employee_submitted', ?, ?, ?, ?, ?, 'none',
                    datetime('now'), datetime('now'))
            RETURNING *
            "#,
        )
        .bind(kpi.id)
        .bind(kpi.employee_id)
        .bind(kpi.manager_id)
        .bind(outcome.aggregate.total)
        .bind(outcome.final_rating)
        .bind(&submission.overall_comment)
        .bind(&submission.signature)
        .bind(submission.review_date)
        .fetch_one(&mut *tx)
        .await?,
    };

    // Replace the accomplishment list wholesale; order is the input order.
    sqlx::query("DELETE FROM review_accomplishments WHERE review_id = ?")
        .bind(review.id)
        .execute(&mut *tx)
        .await?;
    for (idx, accomplishment) in submission.accomplishments.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO review_accomplishments
                (review_id, title, description, employee_rating, display_order)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(review.id)
        .bind(&accomplishment.title)
        .bind(&accomplishment.description)
        .bind(accomplishment.employee_rating)
        .bind(idx as i64)
        .execute(&mut *tx)
        .await?;
    }

    let accomplishments = load_accomplishments(&mut *tx, review.id).await?;
    tx.commit().await?;

    info!(
        kpi_id = kpi.id,
        review_id = review.id,
        rating = outcome.final_rating,
        "self rating submitted"
    );
    Ok(ReviewWithAccomplishments {
        review,
        accomplishments,
    })
}

/// Manager rating: `EMPLOYEE_SUBMITTED -> MANAGER_SUBMITTED`, or the
/// manager-initiated `NONE -> MANAGER_SUBMITTED` when self-rating is disabled
/// for the KPI's period. Manager aggregates are never snapped.
pub async fn submit_manager_rating(
    pool: &SqlitePool,
    submission: ManagerRatingSubmission,
) -> Result<ReviewWithAccomplishments> {
    let expected = parse_expected(submission.expected_status.as_deref())?;

    let mut tx = pool.begin().await?;

    let kpi = load_kpi(&mut *tx, submission.kpi_id).await?;
    let items = load_items(&mut *tx, submission.kpi_id).await?;
    let settings = settings_for_kpi(&mut *tx, &kpi).await?;

    let existing = load_review_by_kpi(&mut *tx, submission.kpi_id).await?;
    let current = existing
        .as_ref()
        .map(|review| ReviewStatus::from_str(&review.review_status))
        .transpose()?;

    state::ensure_expected(current, expected)?;
    ensure_known_items(&items, &submission.ratings)?;
    state::validate_manager_submission(KpiStatus::from_str(&kpi.status)?, &settings, current)?;

    let inputs = rating_inputs(&submission.ratings);
    let outcome = state::manager_rating_outcome(&items, &inputs, &settings);

    upsert_item_ratings(
        &mut *tx,
        &items,
        &submission.ratings,
        RaterRole::Manager,
        settings.method(),
    )
    .await?;

    let review = match &existing {
        Some(existing) => sqlx::query_as::<_, KpiReview>(
            r#"
            UPDATE kpi_reviews
            SET review_status = 'manager_submitted',
                manager_rating = ?,
                manager_final_rating = ?,
                manager_comment = ?,
                updated_at = datetime('now')
            WHERE id = ? AND review_status = 'employee_submitted'
            RETURNING *
            "#,
        )
        .bind(outcome.aggregate.total)
        .bind(outcome.final_rating)
        .bind(&submission.comment)
        .bind(existing.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| EngineError::conflict("employee_submitted", "changed concurrently"))?,
        None => sqlx::query_as::<_, KpiReview>(
            r#"
            INSERT INTO kpi_reviews
                (kpi_id, employee_id, manager_id, review_status, manager_rating,
                 manager_final_rating, manager_comment, rejection_resolved_status,
                 created_at, updated_at)
            VALUES (?, ?, ?, 'manager_submitted', ?, ?, ?, 'none',
                    datetime('now'), datetime('now'))
            RETURNING *
            "#,
        )
        .bind(kpi.id)
        .bind(kpi.employee_id)
        .bind(kpi.manager_id)
        .bind(outcome.aggregate.total)
        .bind(outcome.final_rating)
        .bind(&submission.comment)
        .fetch_one(&mut *tx)
        .await?,
    };

    let accomplishments = load_accomplishments(&mut *tx, review.id).await?;
    tx.commit().await?;

    info!(
        kpi_id = kpi.id,
        review_id = review.id,
        rating = outcome.final_rating,
        "manager rating submitted"
    );
    Ok(ReviewWithAccomplishments {
        review,
        accomplishments,
    })
}

/// Employee confirmation: `MANAGER_SUBMITTED -> COMPLETED | REJECTED`.
/// Approval requires a signature; rejection requires a note and clears the
/// signature.
pub async fn submit_employee_confirmation(
    pool: &SqlitePool,
    submission: ConfirmationSubmission,
) -> Result<ReviewWithAccomplishments> {
    let expected = ReviewStatus::from_str(&submission.expected_status)?;
    let action = ConfirmationAction::from_str(&submission.action)?;

    let mut tx = pool.begin().await?;

    let stored = load_review(&mut *tx, submission.review_id).await?;
    let current = ReviewStatus::from_str(&stored.review_status)?;

    state::ensure_expected(Some(current), Some(expected))?;
    let next = state::validate_confirmation(
        Some(current),
        action,
        submission.note.as_deref(),
        submission.signature.as_deref(),
    )?;

    let review = match next {
        ReviewStatus::Completed => sqlx::query_as::<_, KpiReview>(
            r#"
            UPDATE kpi_reviews
            SET review_status = 'completed',
                employee_signature = ?,
                updated_at = datetime('now')
            WHERE id = ? AND review_status = 'manager_submitted'
            RETURNING *
            "#,
        )
        .bind(&submission.signature)
        .bind(submission.review_id)
        .fetch_optional(&mut *tx)
        .await?,
        _ => sqlx::query_as::<_, KpiReview>(
            r#"
            UPDATE kpi_reviews
            SET review_status = 'rejected',
                employee_rejection_note = ?,
                employee_signature = NULL,
                rejection_resolved_status = 'none',
                updated_at = datetime('now')
            WHERE id = ? AND review_status = 'manager_submitted'
            RETURNING *
            "#,
        )
        .bind(&submission.note)
        .bind(submission.review_id)
        .fetch_optional(&mut *tx)
        .await?,
    }
    .ok_or_else(|| EngineError::conflict("manager_submitted", "changed concurrently"))?;

    let accomplishments = load_accomplishments(&mut *tx, review.id).await?;
    tx.commit().await?;

    info!(
        review_id = review.id,
        status = review.review_status.as_str(),
        "employee confirmation recorded"
    );
    Ok(ReviewWithAccomplishments {
        review,
        accomplishments,
    })
}

/// HR resolution of a rejection: flips the sub-flag, leaves `review_status`
/// alone.
pub async fn resolve_rejection(
    pool: &SqlitePool,
    submission: ResolutionSubmission,
) -> Result<ReviewWithAccomplishments> {
    let mut tx = pool.begin().await?;

    let stored = load_review(&mut *tx, submission.review_id).await?;
    let current = ReviewStatus::from_str(&stored.review_status)?;
    let resolution = ResolutionStatus::from_str(&stored.rejection_resolved_status)?;

    state::validate_resolution(Some(current), resolution, Some(&submission.note))?;

    let review = sqlx::query_as::<_, KpiReview>(
        r#"
        UPDATE kpi_reviews
        SET rejection_resolved_status = 'resolved',
            rejection_resolved_note = ?,
            updated_at = datetime('now')
        WHERE id = ? AND review_status = 'rejected' AND rejection_resolved_status = 'none'
        RETURNING *
        "#,
    )
    .bind(&submission.note)
    .bind(submission.review_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| EngineError::conflict("unresolved rejection", "changed concurrently"))?;

    let accomplishments = load_accomplishments(&mut *tx, review.id).await?;
    tx.commit().await?;

    info!(review_id = review.id, "rejection resolved");
    Ok(ReviewWithAccomplishments {
        review,
        accomplishments,
    })
}
