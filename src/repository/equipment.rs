//! Equipment domain methods on Repository
//!
//! Mutating methods take a connection so callers can run them inside the
//! transaction that also clears the caches.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{types::Json, FromRow, SqliteConnection};

use super::Repository;
use crate::{
    cache::RecordSource,
    error::{AppError, AppResult},
    models::{EquipmentRecord, Regime},
};

/// Where a new record lands in store order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Manual creation: shown first
    Top,
    /// Imports: appended in file order
    Bottom,
}

#[derive(Debug, FromRow)]
struct EquipmentRow {
    data: Json<EquipmentRecord>,
    has_history: bool,
}

fn map_write_error(e: sqlx::Error, record: &EquipmentRecord) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return if db.message().contains("log_number") {
                AppError::Conflict(format!(
                    "Log number '{}' already exists in {}",
                    record.log_number,
                    record.regime.label()
                ))
            } else {
                AppError::Conflict(format!(
                    "Serial number '{}' already exists in {}",
                    record.serial,
                    record.regime.label()
                ))
            };
        }
    }
    AppError::Database(e)
}

impl Repository {
    /// All records of a regime in store order, `has_history` derived from the notes table
    pub async fn equipment_load(
        &self,
        conn: &mut SqliteConnection,
        regime: Regime,
    ) -> AppResult<Vec<EquipmentRecord>> {
        let rows = sqlx::query_as::<_, EquipmentRow>(
            r#"
            SELECT e.data,
                   EXISTS (
                       SELECT 1 FROM history_notes h
                       WHERE h.regime = e.regime AND h.equipment_serial = e.serial
                   ) AS has_history
            FROM equipment e
            WHERE e.regime = ?
            ORDER BY e.position, e.id
            "#,
        )
        .bind(regime.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut record = row.data.0;
                record.has_history = row.has_history;
                record
            })
            .collect())
    }

    pub async fn equipment_insert(
        &self,
        conn: &mut SqliteConnection,
        record: &EquipmentRecord,
        placement: Placement,
    ) -> AppResult<()> {
        let position_sql = match placement {
            Placement::Top => "SELECT COALESCE(MIN(position), 1) - 1 FROM equipment WHERE regime = ?",
            Placement::Bottom => "SELECT COALESCE(MAX(position), 0) + 1 FROM equipment WHERE regime = ?",
        };
        let position: i64 = sqlx::query_scalar(position_sql)
            .bind(record.regime.as_str())
            .fetch_one(&mut *conn)
            .await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO equipment (regime, serial, log_number, position, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.regime.as_str())
        .bind(&record.serial)
        .bind(&record.log_number)
        .bind(position)
        .bind(Json(record))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, record))?;
        Ok(())
    }

    /// Replace the record currently stored under `current_serial`.
    pub async fn equipment_update(
        &self,
        conn: &mut SqliteConnection,
        current_serial: &str,
        record: &EquipmentRecord,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE equipment
            SET serial = ?, log_number = ?, data = ?, updated_at = ?
            WHERE regime = ? AND serial = ?
            "#,
        )
        .bind(&record.serial)
        .bind(&record.log_number)
        .bind(Json(record))
        .bind(Utc::now())
        .bind(record.regime.as_str())
        .bind(current_serial)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, record))?;

        if result.rows_affected() == 0 {
            return Err(AppError::EquipmentNotFound(current_serial.to_string()));
        }
        Ok(())
    }

    pub async fn equipment_delete(
        &self,
        conn: &mut SqliteConnection,
        regime: Regime,
        serial: &str,
    ) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM equipment WHERE regime = ? AND serial = ?")
            .bind(regime.as_str())
            .bind(serial)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::EquipmentNotFound(serial.to_string()));
        }
        Ok(())
    }

    pub async fn equipment_count(&self, regime: Regime) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM equipment WHERE regime = ?")
            .bind(regime.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RecordSource for Repository {
    async fn load_regime(&self, regime: Regime) -> AppResult<Vec<EquipmentRecord>> {
        let mut conn = self.pool.acquire().await?;
        self.equipment_load(&mut conn, regime).await
    }
}
