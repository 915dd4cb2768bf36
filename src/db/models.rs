use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Kpi {
    pub id: i64,
    pub employee_id: i64,
    pub manager_id: i64,
    pub department_id: i64,
    pub period: String,
    pub quarter: Option<i64>,
    pub year: i64,
    pub status: String,
    pub employee_signature: Option<String>,
    pub manager_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KpiItem {
    pub id: i64,
    pub kpi_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub target_value: Option<f64>,
    pub actual_value: Option<f64>,
    pub measure_unit: Option<String>,
    pub goal_weight: f64,
    pub is_qualitative: bool,
    pub qualitative_rating: Option<String>,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemRating {
    pub id: i64,
    pub kpi_item_id: i64,
    pub rater_role: String,
    pub rating_value: Option<f64>,
    pub comment: Option<String>,
    pub actual_value: Option<f64>,
    pub target_value: Option<f64>,
    pub goal_weight: Option<f64>,
    pub percentage_value_obtained: Option<f64>,
    pub manager_rating_percentage: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KpiReview {
    pub id: i64,
    pub kpi_id: i64,
    pub employee_id: i64,
    pub manager_id: i64,
    pub review_status: String,
    pub employee_rating: Option<f64>,
    pub employee_final_rating: Option<f64>,
    pub manager_rating: Option<f64>,
    pub manager_final_rating: Option<f64>,
    pub employee_comment: Option<String>,
    pub manager_comment: Option<String>,
    pub employee_signature: Option<String>,
    pub review_date: Option<NaiveDate>,
    pub employee_rejection_note: Option<String>,
    pub rejection_resolved_status: String,
    pub rejection_resolved_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Accomplishment {
    pub id: i64,
    pub review_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub employee_rating: Option<f64>,
    pub display_order: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CalculationConfigRow {
    pub id: i64,
    pub department_id: i64,
    pub period: String,
    pub use_goal_weight: bool,
    pub use_actual_values: bool,
    pub use_normal_calculation: bool,
    pub enable_employee_self_rating: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// DTOs for creating new records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKpi {
    pub employee_id: i64,
    pub manager_id: i64,
    pub department_id: i64,
    pub period: String,
    pub quarter: Option<i64>,
    pub year: i64,
    pub manager_signature: Option<String>,
    pub items: Vec<CreateKpiItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateKpiItem {
    pub title: String,
    pub description: Option<String>,
    pub target_value: Option<f64>,
    pub measure_unit: Option<String>,
    pub goal_weight: f64,
    pub is_qualitative: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemRating {
    pub kpi_item_id: i64,
    pub rating_value: Option<f64>,
    pub comment: Option<String>,
    pub actual_value: Option<f64>,
    pub target_value: Option<f64>,
    pub goal_weight: Option<f64>,
    pub qualitative_rating: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccomplishment {
    pub title: String,
    pub description: Option<String>,
    pub employee_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveCalculationConfig {
    pub department_id: i64,
    pub period: String,
    pub use_goal_weight: bool,
    pub use_actual_values: bool,
    pub use_normal_calculation: bool,
    pub enable_employee_self_rating: bool,
}
