use crate::db::models::{CalculationConfigRow, SaveCalculationConfig};
use crate::engine::{CalculationSettings, Period};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::debug;

/// Config as seen by callers: the resolved settings plus the method name and
/// the defaulted-from-absence flag for UI notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub department_id: i64,
    pub period: Period,
    #[serde(flatten)]
    pub settings: CalculationSettings,
    pub method_name: String,
}

/// Resolve the calculation settings for a department/period, falling back to
/// the default config when none is stored. The fallback is not an error;
/// `settings.is_default` is the only trace of it.
pub(crate) async fn settings_for(
    conn: &mut SqliteConnection,
    department_id: i64,
    period: Period,
) -> Result<CalculationSettings> {
    let row = sqlx::query_as::<_, CalculationConfigRow>(
        "SELECT * FROM calculation_configs WHERE department_id = ? AND period = ?",
    )
    .bind(department_id)
    .bind(period.as_str())
    .fetch_optional(conn)
    .await?;

    match row {
        Some(row) => Ok(CalculationSettings {
            use_goal_weight: row.use_goal_weight,
            use_actual_values: row.use_actual_values,
            use_normal_calculation: row.use_normal_calculation,
            enable_employee_self_rating: row.enable_employee_self_rating,
            is_default: false,
        }),
        None => {
            debug!(department_id, period = period.as_str(), "no stored calculation config, using defaults");
            Ok(CalculationSettings::default_config())
        }
    }
}

pub async fn get_calculation_config(
    pool: &SqlitePool,
    department_id: i64,
    period: &str,
) -> Result<ResolvedConfig> {
    let period = Period::from_str(period)?;
    let mut conn = pool.acquire().await?;
    let settings = settings_for(&mut *conn, department_id, period).await?;

    Ok(ResolvedConfig {
        department_id,
        period,
        method_name: settings.method_name().to_string(),
        settings,
    })
}

pub async fn save_calculation_config(
    pool: &SqlitePool,
    config: SaveCalculationConfig,
) -> Result<CalculationConfigRow> {
    let period = Period::from_str(&config.period)?;

    // Mutual exclusivity is enforced here, on write; every read path relies
    // on it holding.
    let settings = CalculationSettings {
        use_goal_weight: config.use_goal_weight,
        use_actual_values: config.use_actual_values,
        use_normal_calculation: config.use_normal_calculation,
        enable_employee_self_rating: config.enable_employee_self_rating,
        is_default: false,
    };
    settings.validate()?;

    let row = sqlx::query_as::<_, CalculationConfigRow>(
        r#"
        INSERT INTO calculation_configs
            (department_id, period, use_goal_weight, use_actual_values,
             use_normal_calculation, enable_employee_self_rating, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))
        ON CONFLICT(department_id, period) DO UPDATE
        SET use_goal_weight = excluded.use_goal_weight,
            use_actual_values = excluded.use_actual_values,
            use_normal_calculation = excluded.use_normal_calculation,
            enable_employee_self_rating = excluded.enable_employee_self_rating,
            updated_at = datetime('now')
        RETURNING *
        "#,
    )
    .bind(config.department_id)
    .bind(period.as_str())
    .bind(config.use_goal_weight)
    .bind(config.use_actual_values)
    .bind(config.use_normal_calculation)
    .bind(config.enable_employee_self_rating)
    .fetch_one(pool)
    .await?;

    Ok(row)
}
