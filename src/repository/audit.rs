//! Audit trail persistence

use chrono::Utc;
use sqlx::{types::Json, QueryBuilder, Sqlite};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::audit::{AuditEntry, AuditEvent, AuditQuery, AuditRow},
};

const AUDIT_COLUMNS: &str =
    "id, created_at, event_type, user_id, performed_by, description, status, details";

/// Append the filter clauses of `query` to a statement ending in `WHERE 1 = 1`.
fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &AuditQuery) {
    if let Some(event_type) = query.event_type {
        builder.push(" AND event_type = ").push_bind(event_type.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(name) = query.performed_by.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        builder.push(" AND performed_by = ").push_bind(name.to_string());
    }
    if let Some(from) = query.from.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        builder.push(" AND created_at >= ").push_bind(from.and_utc());
    }
    if let Some(to) = query
        .to
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        builder.push(" AND created_at < ").push_bind(to.and_utc());
    }
    if let Some(text) = query.q.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", text.to_lowercase());
        builder
            .push(" AND (LOWER(description) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(REPLACE(event_type, '_', ' ')) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(performed_by) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

impl Repository {
    /// Append one entry, then drop the oldest entries beyond `keep`.
    pub async fn audit_insert(&self, event: &AuditEvent, keep: u32) -> AppResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO audit_log (created_at, event_type, user_id, performed_by, description, status, details)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(Utc::now())
        .bind(event.event_type.as_str())
        .bind(event.actor.user_id)
        .bind(&event.actor.name)
        .bind(&event.description)
        .bind(event.status.as_str())
        .bind(Json(&event.details))
        .fetch_one(&self.pool)
        .await?;

        if keep > 0 {
            sqlx::query(
                "DELETE FROM audit_log WHERE id NOT IN (SELECT id FROM audit_log ORDER BY id DESC LIMIT ?)",
            )
            .bind(i64::from(keep))
            .execute(&self.pool)
            .await?;
        }
        Ok(id)
    }

    /// Filtered entries, newest first
    pub async fn audit_search(&self, query: &AuditQuery) -> AppResult<Vec<AuditEntry>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM audit_log WHERE 1 = 1",
            AUDIT_COLUMNS
        ));
        push_filters(&mut builder, query);

        let limit = query.limit.unwrap_or(100).clamp(1, 1000);
        let offset = query.offset.unwrap_or(0).max(0);
        builder
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<AuditRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                AuditEntry::try_from(row)
                    .map_err(|e| AppError::Internal(format!("Corrupt audit entry: {}", e)))
            })
            .collect()
    }

    pub async fn audit_count(&self, query: &AuditQuery) -> AppResult<i64> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM audit_log WHERE 1 = 1");
        push_filters(&mut builder, query);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }
}
