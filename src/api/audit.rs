//! Audit trail endpoints (admin only)

use axum::{
    extract::{Query, State},
    response::Response,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        audit::{AuditPage, AuditQuery},
        Actor,
    },
};

use super::{import_export::csv_download, AuthenticatedUser};

/// Search the audit trail, newest first
#[utoipa::path(
    get,
    path = "/audit",
    tag = "audit",
    security(("bearer_auth" = [])),
    params(AuditQuery),
    responses(
        (status = 200, description = "Matching audit entries", body = AuditPage),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn list_audit(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> AppResult<Json<AuditPage>> {
    claims.require_admin()?;
    let page = state.services.audit.search(&query).await?;
    Ok(Json(page))
}

/// Export matching audit entries as CSV
#[utoipa::path(
    get,
    path = "/audit/export",
    tag = "audit",
    security(("bearer_auth" = [])),
    params(AuditQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 403, description = "Admin privileges required")
    )
)]
pub async fn export_audit(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<AuditQuery>,
) -> AppResult<Response> {
    claims.require_admin()?;
    let csv = state
        .services
        .audit
        .export_csv(&query, &Actor::from(&claims))
        .await?;
    Ok(csv_download(csv, "audit_log"))
}
