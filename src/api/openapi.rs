//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{audit, auth, equipment, health, history, import_export, training, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MedTrack API",
        version = "1.0.0",
        description = "Hospital equipment maintenance tracking REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_role,
        users::delete_user,
        // Equipment
        equipment::list_equipment,
        equipment::dashboard,
        equipment::get_equipment,
        equipment::create_equipment,
        equipment::update_equipment,
        equipment::delete_equipment,
        equipment::bulk_delete,
        equipment::recalculate_statuses,
        // Import / export
        import_export::import_csv,
        import_export::export_csv,
        import_export::import_training_csv,
        import_export::export_training_csv,
        import_export::import_auto,
        // History
        history::list_equipment_history,
        history::add_note,
        history::get_note,
        history::update_note,
        history::delete_note,
        history::add_attachments,
        history::download_attachment,
        history::delete_attachment,
        history::search,
        history::cleanup_orphans,
        // Training
        training::list_training,
        training::get_training,
        training::create_training,
        training::update_training,
        training::delete_training,
        training::bulk_delete_training,
        // Audit
        audit::list_audit,
        audit::export_audit,
    ),
    components(
        schemas(
            // Users
            crate::models::user::Role,
            crate::models::user::User,
            crate::models::user::LoginRequest,
            crate::models::user::LoginResponse,
            crate::models::user::CreateUser,
            crate::models::user::UpdateRole,
            // Equipment
            crate::models::Regime,
            crate::models::MaintenanceStatus,
            crate::models::QuarterVisit,
            crate::models::Maintenance,
            crate::models::EquipmentRecord,
            crate::models::EquipmentLinks,
            crate::models::EquipmentView,
            crate::models::EquipmentListing,
            crate::models::DashboardStats,
            crate::models::EquipmentInput,
            crate::models::equipment::QuarterInput,
            crate::models::equipment::BulkDeleteRequest,
            crate::models::equipment::EquipmentPage,
            crate::models::BulkDeleteReport,
            crate::models::RecalculateReport,
            crate::models::ImportReport,
            crate::models::CsvKind,
            crate::models::AutoImportReport,
            // History
            crate::models::HistoryNote,
            crate::models::HistoryAttachment,
            crate::models::history::CreateNote,
            crate::models::history::UpdateNote,
            crate::models::history::CleanupReport,
            // Training
            crate::models::MachineTrainer,
            crate::models::TrainingRecord,
            crate::models::training::TrainingInput,
            crate::models::training::TrainingBulkDeleteRequest,
            crate::models::TrainingBulkDeleteReport,
            // Audit
            crate::models::AuditEventType,
            crate::models::AuditStatus,
            crate::models::AuditEntry,
            crate::models::audit::AuditPage,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "users", description = "User management"),
        (name = "equipment", description = "PPM and OCM equipment records"),
        (name = "import-export", description = "CSV import and export"),
        (name = "history", description = "Maintenance history notes and attachments"),
        (name = "training", description = "Staff training records"),
        (name = "audit", description = "Audit trail of changes and system events")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
