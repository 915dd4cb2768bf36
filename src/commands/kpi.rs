use crate::db::models::{CreateKpi, Kpi, KpiItem};
use crate::engine::{EngineError, KpiStatus, Period};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiWithItems {
    #[serde(flatten)]
    pub kpi: Kpi,
    pub items: Vec<KpiItem>,
}

pub(crate) async fn load_kpi(conn: &mut SqliteConnection, kpi_id: i64) -> Result<Kpi> {
    sqlx::query_as::<_, Kpi>("SELECT * FROM kpis WHERE id = ?")
        .bind(kpi_id)
        .fetch_optional(conn)
        .await?
        .ok_or(Error::not_found("KPI", kpi_id))
}

pub(crate) async fn load_items(conn: &mut SqliteConnection, kpi_id: i64) -> Result<Vec<KpiItem>> {
    let items = sqlx::query_as::<_, KpiItem>(
        "SELECT * FROM kpi_items WHERE kpi_id = ? ORDER BY display_order, id",
    )
    .bind(kpi_id)
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Goal setting: insert a KPI with its items in one transaction. Item weight
/// sums are stored as given; a sum away from 1.0 is surfaced at aggregation
/// time, not rejected here.
pub async fn create_kpi(pool: &SqlitePool, request: CreateKpi) -> Result<KpiWithItems> {
    let period = Period::from_str(&request.period)?;
    match period {
        Period::Quarterly => {
            if !matches!(request.quarter, Some(1..=4)) {
                return Err(EngineError::validation(
                    "quarter",
                    "quarterly KPIs require a quarter between 1 and 4",
                )
                .into());
            }
        }
        Period::Yearly => {
            if request.quarter.is_some() {
                return Err(EngineError::validation(
                    "quarter",
                    "yearly KPIs must not carry a quarter",
                )
                .into());
            }
        }
    }
    if request.items.is_empty() {
        return Err(EngineError::validation("items", "a KPI needs at least one item").into());
    }

    let mut tx = pool.begin().await?;

    let kpi = sqlx::query_as::<_, Kpi>(
        r#"
        INSERT INTO kpis
            (employee_id, manager_id, department_id, period, quarter, year,
             status, manager_signature, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, datetime('now'), datetime('now'))
        RETURNING *
        "#,
    )
    .bind(request.employee_id)
    .bind(request.manager_id)
    .bind(request.department_id)
    .bind(period.as_str())
    .bind(request.quarter)
    .bind(request.year)
    .bind(&request.manager_signature)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(request.items.len());
    for (idx, item) in request.items.iter().enumerate() {
        let row = sqlx::query_as::<_, KpiItem>(
            r#"
            INSERT INTO kpi_items
                (kpi_id, title, description, target_value, measure_unit,
                 goal_weight, is_qualitative, display_order)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(kpi.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.target_value)
        .bind(&item.measure_unit)
        .bind(item.goal_weight)
        .bind(item.is_qualitative)
        .bind(idx as i64)
        .fetch_one(&mut *tx)
        .await?;
        items.push(row);
    }

    tx.commit().await?;

    info!(kpi_id = kpi.id, employee_id = kpi.employee_id, "KPI created");
    Ok(KpiWithItems { kpi, items })
}

/// Employee acknowledgement: the only legal KPI status transition,
/// `pending -> acknowledged`. The update is status-qualified so a second
/// acknowledgement fails instead of silently rewriting the signature.
pub async fn acknowledge_kpi(
    pool: &SqlitePool,
    kpi_id: i64,
    employee_signature: &str,
) -> Result<Kpi> {
    if employee_signature.trim().is_empty() {
        return Err(EngineError::validation("signature", "a signature is required").into());
    }

    let mut conn = pool.acquire().await?;
    let kpi = load_kpi(&mut *conn, kpi_id).await?;
    let status = KpiStatus::from_str(&kpi.status)?;

    let updated = sqlx::query_as::<_, Kpi>(
        r#"
        UPDATE kpis
        SET status = 'acknowledged', employee_signature = ?, updated_at = datetime('now')
        WHERE id = ? AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(employee_signature)
    .bind(kpi_id)
    .fetch_optional(&mut *conn)
    .await?;

    match updated {
        Some(kpi) => {
            info!(kpi_id, "KPI acknowledged");
            Ok(kpi)
        }
        None => Err(EngineError::conflict("pending", status.as_str()).into()),
    }
}

pub async fn get_kpi(pool: &SqlitePool, kpi_id: i64) -> Result<KpiWithItems> {
    let mut conn = pool.acquire().await?;
    let kpi = load_kpi(&mut *conn, kpi_id).await?;
    let items = load_items(&mut *conn, kpi_id).await?;
    Ok(KpiWithItems { kpi, items })
}
