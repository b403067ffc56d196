//! Reports returned by batch operations.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Regime;

/// Outcome of a CSV or legacy JSON import
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ImportReport {
    pub added_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    /// One message per skipped row, prefixed with its row number
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn changed(&self) -> bool {
        self.added_count + self.updated_count > 0
    }

    pub fn skip(&mut self, row: usize, message: impl std::fmt::Display) {
        self.skipped_count += 1;
        self.errors.push(format!("Row {}: {}", row, message));
    }
}

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub deleted_count: usize,
    /// Identifiers that did not resolve to a record
    pub not_found: Vec<String>,
}

/// Outcome of a status recalculation
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RecalculateReport {
    pub checked: usize,
    pub changed: usize,
}

/// Outcome of a training bulk delete
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TrainingBulkDeleteReport {
    pub deleted_count: usize,
    /// Requested ids with no training record
    pub not_found: Vec<i64>,
}

/// Kind of data a CSV file holds, told apart by its header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CsvKind {
    Ppm,
    Ocm,
    Training,
}

impl From<Regime> for CsvKind {
    fn from(regime: Regime) -> Self {
        match regime {
            Regime::Ppm => CsvKind::Ppm,
            Regime::Ocm => CsvKind::Ocm,
        }
    }
}

impl CsvKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsvKind::Ppm => "ppm",
            CsvKind::Ocm => "ocm",
            CsvKind::Training => "training",
        }
    }
}

/// Outcome of an import whose kind was detected from the header
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AutoImportReport {
    pub data_type: CsvKind,
    #[serde(flatten)]
    pub report: ImportReport,
}
