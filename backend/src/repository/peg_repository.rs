//! Executes the JSONB-expansion query and maps rows to [`PegSample`]s (C4).

use super::query_builder::{build_peg_query, BoundParam, QueryBuilderInput};
use crate::models::peg::PegSample;
use crate::time_range::TimeRange;
use crate::utils::error::AppError;
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PegRepository {
    pool: PgPool,
}

impl PegRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the JSONB expansion query inside a transaction that is rolled
    /// back on any error before the connection returns to the pool (spec
    /// §4.4 "Connection management").
    pub async fn fetch_peg_data(
        &self,
        table: &str,
        time_range: &TimeRange,
        input: &QueryBuilderInput,
    ) -> Result<Vec<PegSample>, AppError> {
        let (sql, params) = build_peg_query(table, time_range, input);

        let mut tx = self.pool.begin().await.map_err(AppError::from)?;

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = match param {
                BoundParam::Text(s) => query.bind(s.clone()),
                BoundParam::TextArray(v) => query.bind(v.clone()),
                BoundParam::Int(i) => query.bind(*i),
                BoundParam::Timestamp(ts) => query.bind(*ts),
            };
        }

        let rows = match query.fetch_all(&mut *tx).await {
            Ok(rows) => rows,
            Err(err) => {
                tx.rollback().await.ok();
                return Err(AppError::Database {
                    message: err.to_string(),
                    query_preview: preview(&sql),
                    param_keys: placeholder_names(params.len()),
                });
            },
        };

        tx.commit().await.map_err(AppError::from)?;

        let mut samples = Vec::with_capacity(rows.len());
        for row in rows {
            let peg_name: String = row.try_get("peg_name").map_err(AppError::from)?;
            let value: Option<f64> = row.try_get("value").map_err(AppError::from)?;
            let Some(value) = value else { continue };
            let index_name: Option<String> = row.try_get("index_name").map_err(AppError::from)?;
            let dimension_value: String = row.try_get("dimension_value").map_err(AppError::from)?;
            let dimension_kind: String = row.try_get("dimension_kind").map_err(AppError::from)?;
            let timestamp = row.try_get("timestamp").map_err(AppError::from)?;
            let family_id: i64 = row.try_get("family_id").map_err(AppError::from)?;
            let ne: Option<String> = row.try_get("ne").map_err(AppError::from)?;
            let swname: Option<String> = row.try_get("swname").map_err(AppError::from)?;
            let rel_ver: Option<String> = row.try_get("rel_ver").map_err(AppError::from)?;

            let dimensions = if dimension_kind == "object" {
                Some(format!("{}={}", index_name.unwrap_or_default(), dimension_value))
            } else {
                None
            };

            samples.push(PegSample { timestamp, family_id, peg_name, value, ne, swname, rel_ver, dimensions });
        }

        Ok(samples)
    }
}

/// A query preview with no literal filter values — only the static SQL
/// skeleton, matching spec §7's "no raw query literal values" rule.
fn preview(sql: &str) -> String {
    sql.lines().next().unwrap_or(sql).to_string()
}

fn placeholder_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("${i}")).collect()
}
