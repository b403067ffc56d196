//! Data models for MedTrack

pub mod audit;
pub mod enums;
pub mod equipment;
pub mod history;
pub mod import_report;
pub mod training;
pub mod user;

// Re-export commonly used types
pub use audit::{Actor, AuditEntry, AuditEvent, AuditEventType, AuditStatus};
pub use enums::{MaintenanceStatus, Regime};
pub use equipment::{
    DashboardStats, EquipmentInput, EquipmentLinks, EquipmentListing, EquipmentRecord,
    EquipmentView, Maintenance, QuarterVisit,
};
pub use history::{HistoryAttachment, HistoryNote};
pub use import_report::{
    AutoImportReport, BulkDeleteReport, CsvKind, ImportReport, RecalculateReport,
    TrainingBulkDeleteReport,
};
pub use training::{MachineTrainer, TrainingRecord};
pub use user::{Role, User, UserClaims};
