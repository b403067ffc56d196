//! Training record persistence

use chrono::Utc;
use sqlx::{types::Json, SqliteConnection};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::training::{TrainingFields, TrainingRecord, TrainingRow},
};

const TRAINING_COLUMNS: &str = "id, employee_id, name, department, machine_trainer_assignments, \
     last_trained_date, next_due_date, created_at, updated_at";

impl Repository {
    pub async fn training_list(&self) -> AppResult<Vec<TrainingRecord>> {
        let rows = sqlx::query_as::<_, TrainingRow>(&format!(
            "SELECT {} FROM training_records ORDER BY name, id",
            TRAINING_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(TrainingRecord::from).collect())
    }

    pub async fn training_get(&self, id: i64) -> AppResult<TrainingRecord> {
        sqlx::query_as::<_, TrainingRow>(&format!(
            "SELECT {} FROM training_records WHERE id = ?",
            TRAINING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(TrainingRecord::from)
        .ok_or_else(|| AppError::NotFound(format!("Training record {} not found", id)))
    }

    pub async fn training_count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM training_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn training_create(&self, fields: &TrainingFields) -> AppResult<TrainingRecord> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO training_records
                (employee_id, name, department, machine_trainer_assignments,
                 last_trained_date, next_due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&fields.employee_id)
        .bind(&fields.name)
        .bind(&fields.department)
        .bind(Json(&fields.machine_trainer_assignments))
        .bind(fields.last_trained_date)
        .bind(fields.next_due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.training_get(id).await
    }

    pub async fn training_update(&self, id: i64, fields: &TrainingFields) -> AppResult<TrainingRecord> {
        let result = sqlx::query(
            r#"
            UPDATE training_records
            SET employee_id = ?, name = ?, department = ?, machine_trainer_assignments = ?,
                last_trained_date = ?, next_due_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.employee_id)
        .bind(&fields.name)
        .bind(&fields.department)
        .bind(Json(&fields.machine_trainer_assignments))
        .bind(fields.last_trained_date)
        .bind(fields.next_due_date)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Training record {} not found", id)));
        }
        self.training_get(id).await
    }

    pub async fn training_delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM training_records WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Training record {} not found", id)));
        }
        Ok(())
    }

    pub async fn training_exists(&self, conn: &mut SqliteConnection, id: i64) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM training_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(found.is_some())
    }

    /// Insert inside a batch. An explicit `id` is kept so exported files
    /// import back under the same ids.
    pub async fn training_insert(
        &self,
        conn: &mut SqliteConnection,
        id: Option<i64>,
        fields: &TrainingFields,
    ) -> AppResult<i64> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO training_records
                (id, employee_id, name, department, machine_trainer_assignments,
                 last_trained_date, next_due_date, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(&fields.employee_id)
        .bind(&fields.name)
        .bind(&fields.department)
        .bind(Json(&fields.machine_trainer_assignments))
        .bind(fields.last_trained_date)
        .bind(fields.next_due_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(id)
    }

    /// Overwrite inside a batch. Returns false when `id` does not exist.
    pub async fn training_overwrite(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        fields: &TrainingFields,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE training_records
            SET employee_id = ?, name = ?, department = ?, machine_trainer_assignments = ?,
                last_trained_date = ?, next_due_date = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.employee_id)
        .bind(&fields.name)
        .bind(&fields.department)
        .bind(Json(&fields.machine_trainer_assignments))
        .bind(fields.last_trained_date)
        .bind(fields.next_due_date)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete inside a batch. Returns false when `id` does not exist.
    pub async fn training_remove(&self, conn: &mut SqliteConnection, id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM training_records WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
