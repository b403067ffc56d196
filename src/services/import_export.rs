//! CSV import and export of equipment and training records
//!
//! Column names follow the spreadsheet layout the hospital already uses:
//! `SERIAL`, `LOG_Number`, `PPM_Q_I.date`, `Service_Date` and so on. Import
//! matches headers case-insensitively and treats spaces and dots as `_`, so
//! `PPM_Q_I.date`, `ppm q i date` and `PPM_Q_I_DATE` name the same column.
//! Training files use the lowercase JSON field names. Every import and
//! export is audited.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{
    cache::{CacheCoordinator, Scope},
    error::{AppError, AppResult},
    models::{
        audit::{Actor, AuditEvent, AuditEventType, AuditStatus},
        equipment::{format_date, QuarterInput},
        training::TrainingInput,
        AutoImportReport, CsvKind, EquipmentInput, EquipmentRecord, EquipmentView, ImportReport,
        Maintenance, MachineTrainer, MaintenanceStatus, Regime, TrainingRecord,
    },
    repository::{Placement, Repository},
};

use super::{audit::AuditService, commit_invalidated, equipment::ensure_unique, today};

const QUARTER_LABELS: [&str; 4] = ["I", "II", "III", "IV"];

/// Department recorded for OCM rows from files without that column
const UNKNOWN_DEPARTMENT: &str = "N/A";

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .map(|c| match c {
            ' ' | '.' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Columns a file must carry to be importable for `regime`
fn required_columns(regime: Regime) -> &'static [&'static str] {
    match regime {
        Regime::Ppm => &["SERIAL", "LOG_Number", "MODEL", "MANUFACTURER", "Department"],
        Regime::Ocm => &["SERIAL", "LOG_Number", "MODEL", "MANUFACTURER", "Service_Date"],
    }
}

const TRAINING_REQUIRED: [&str; 3] = ["employee_id", "name", "department"];

const TRAINING_COLUMNS: [&str; 7] = [
    "id",
    "employee_id",
    "name",
    "department",
    "machine_trainer_assignments",
    "last_trained_date",
    "next_due_date",
];

fn missing_columns<'a>(headers: &[String], required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|column| !headers.contains(&normalize_header(column)))
        .collect()
}

/// Tell the kind of a file from its normalized header. PPM is tried first
/// and needs at least one quarter column, since its identity columns are a
/// subset of OCM's.
pub fn detect_kind(headers: &[String]) -> Option<CsvKind> {
    let has_quarter = headers.iter().any(|h| h.starts_with("ppm_q_"));
    if has_quarter && missing_columns(headers, required_columns(Regime::Ppm)).is_empty() {
        Some(CsvKind::Ppm)
    } else if missing_columns(headers, required_columns(Regime::Ocm)).is_empty() {
        Some(CsvKind::Ocm)
    } else if missing_columns(headers, &TRAINING_REQUIRED).is_empty() {
        Some(CsvKind::Training)
    } else {
        None
    }
}

/// Export column order
fn export_columns(regime: Regime) -> Vec<String> {
    let mut columns: Vec<String> = [
        "NO",
        "Department",
        "Name",
        "MODEL",
        "SERIAL",
        "MANUFACTURER",
        "LOG_Number",
        "Installation_Date",
        "Warranty_End",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    match regime {
        Regime::Ppm => {
            for label in QUARTER_LABELS {
                columns.push(format!("PPM_Q_{}.date", label));
                columns.push(format!("PPM_Q_{}.engineer", label));
            }
        }
        Regime::Ocm => {
            columns.extend(
                ["Service_Date", "Engineer", "Next_Maintenance"]
                    .iter()
                    .map(|c| c.to_string()),
            );
        }
    }
    columns.push("Status".to_string());
    columns
}

/// A parsed file: normalized header plus numbered rows. Rows the reader
/// could not split carry the error instead.
struct CsvTable {
    headers: Vec<String>,
    rows: Vec<(usize, Result<CsvRow, String>)>,
}

impl CsvTable {
    fn read(data: &[u8]) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| AppError::BadRequest(format!("Unreadable CSV header: {}", e)))?
            .iter()
            .map(normalize_header)
            .collect();

        let rows = reader
            .records()
            .enumerate()
            .map(|(index, result)| {
                let row = result.map_err(|e| e.to_string()).map(|record| CsvRow {
                    values: headers
                        .iter()
                        .cloned()
                        .zip(record.iter().map(str::to_string))
                        .collect(),
                });
                (index + 1, row)
            })
            .collect();
        Ok(Self { headers, rows })
    }
}

/// One data row keyed by normalized header
struct CsvRow {
    values: HashMap<String, String>,
}

impl CsvRow {
    fn get(&self, column: &str) -> Option<String> {
        self.values
            .get(&normalize_header(column))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn text(&self, column: &str) -> String {
        self.get(column).unwrap_or_default()
    }

    fn into_input(self, regime: Regime) -> Result<EquipmentInput, String> {
        let status = self
            .get("Status")
            .map(|s| s.parse::<MaintenanceStatus>())
            .transpose()?;

        let mut input = EquipmentInput {
            serial: self.text("SERIAL"),
            name: self.get("Name").or_else(|| self.get("EQUIPMENT")),
            department: self.text("Department"),
            model: self.text("MODEL"),
            manufacturer: self.text("MANUFACTURER"),
            log_number: self.text("LOG_Number"),
            installation_date: self.get("Installation_Date"),
            warranty_end: self.get("Warranty_End"),
            status,
            ..Default::default()
        };

        match regime {
            Regime::Ppm => {
                input.quarters = QUARTER_LABELS
                    .iter()
                    .map(|label| QuarterInput {
                        date: self.get(&format!("PPM_Q_{}.date", label)),
                        engineer: self.get(&format!("PPM_Q_{}.engineer", label)),
                    })
                    .collect();
            }
            Regime::Ocm => {
                if input.department.is_empty() {
                    input.department = UNKNOWN_DEPARTMENT.to_string();
                }
                input.service_date = self.get("Service_Date");
                input.next_maintenance = self.get("Next_Maintenance");
                input.engineer = self.get("Engineer");
            }
        }
        Ok(input)
    }

    /// Training row with its optional `id`. Assignments come from the
    /// `machine_trainer_assignments` JSON column, or from the older
    /// comma-separated `trained_on_machines` plus one `trainer`.
    fn into_training(self) -> Result<(Option<i64>, TrainingInput), String> {
        // Training exports fill empty cells with `N/A`.
        let value = |column: &str| self.get(column).filter(|v| !v.eq_ignore_ascii_case("n/a"));
        let id = value("id")
            .map(|raw| {
                raw.parse::<i64>()
                    .map_err(|_| format!("Invalid training id: {}", raw))
            })
            .transpose()?;

        let machine_trainer_assignments = match value("machine_trainer_assignments") {
            Some(raw) => serde_json::from_str::<Vec<MachineTrainer>>(&raw)
                .map_err(|e| format!("Invalid machine_trainer_assignments: {}", e))?,
            None => {
                let trainer = value("trainer");
                value("trained_on_machines")
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(|machine| MachineTrainer {
                        machine: machine.to_string(),
                        trainer: trainer.clone(),
                    })
                    .collect()
            }
        };

        Ok((
            id,
            TrainingInput {
                employee_id: self.text("employee_id"),
                name: self.text("name"),
                department: self.text("department"),
                machine_trainer_assignments,
                last_trained_date: value("last_trained_date"),
                next_due_date: value("next_due_date"),
            },
        ))
    }
}

fn training_row(record: &TrainingRecord) -> AppResult<Vec<String>> {
    let assignments = serde_json::to_string(&record.machine_trainer_assignments)
        .map_err(|e| AppError::Internal(format!("Cannot encode assignments: {}", e)))?;
    Ok(vec![
        record.id.to_string(),
        record.employee_id.clone(),
        record.name.clone(),
        record.department.clone(),
        assignments,
        format_date(record.last_trained_date),
        format_date(record.next_due_date),
    ])
}

fn export_row(view: &EquipmentView) -> Vec<String> {
    let record = &view.record;
    let mut row = vec![
        view.no.map(|n| n.to_string()).unwrap_or_default(),
        record.department.clone(),
        record.name.clone().unwrap_or_default(),
        record.model.clone(),
        record.serial.clone(),
        record.manufacturer.clone(),
        record.log_number.clone(),
        format_date(record.installation_date),
        format_date(record.warranty_end),
    ];
    match &record.maintenance {
        Maintenance::Ppm { quarters } => {
            for index in 0..QUARTER_LABELS.len() {
                let visit = quarters.get(index);
                row.push(format_date(visit.and_then(|q| q.date)));
                row.push(visit.and_then(|q| q.engineer.clone()).unwrap_or_default());
            }
        }
        Maintenance::Ocm {
            service_date,
            next_maintenance,
            engineer,
        } => {
            row.push(format_date(*service_date));
            row.push(engineer.clone().unwrap_or_default());
            row.push(format_date(*next_maintenance));
        }
    }
    row.push(record.status.as_str().to_string());
    row
}

fn write_csv<R, I>(header: &[String], rows: R) -> AppResult<String>
where
    R: IntoIterator<Item = I>,
    I: IntoIterator<Item = String>,
{
    let write_error = |e: csv::Error| AppError::Internal(format!("CSV write failed: {}", e));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(write_error)?;
    for row in rows {
        writer
            .write_record(row.into_iter().collect::<Vec<_>>())
            .map_err(write_error)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV is not UTF-8: {}", e)))
}

/// Audit event for a finished or failed import
fn import_event(kind: CsvKind, actor: &Actor, result: &AppResult<ImportReport>) -> AuditEvent {
    let mut event = AuditEvent::new(
        AuditEventType::BulkImport,
        actor,
        format!("CSV import of {} data", kind.as_str()),
    )
    .detail("data_type", kind);
    if let Ok(report) = result {
        event = event
            .detail("added_count", report.added_count)
            .detail("updated_count", report.updated_count)
            .detail("skipped_count", report.skipped_count);
        if report.skipped_count > 0 {
            event = event.status(AuditStatus::Warning);
        }
    }
    event.outcome(result)
}

#[derive(Clone)]
pub struct ImportExportService {
    repository: Repository,
    cache: Arc<CacheCoordinator>,
    audit: AuditService,
}

impl ImportExportService {
    pub fn new(repository: Repository, cache: Arc<CacheCoordinator>, audit: AuditService) -> Self {
        Self {
            repository,
            cache,
            audit,
        }
    }

    /// Import an equipment CSV file. Rows are upserted by raw serial; bad
    /// rows are skipped and reported. The batch commits in one transaction.
    pub async fn import_csv(
        &self,
        regime: Regime,
        data: &[u8],
        actor: &Actor,
    ) -> AppResult<ImportReport> {
        let result = async {
            let table = CsvTable::read(data)?;
            self.import_equipment(regime, table).await
        }
        .await;
        self.audit
            .record(import_event(regime.into(), actor, &result))
            .await;
        result
    }

    /// Import a training CSV file, upserting by `id`.
    pub async fn import_training_csv(&self, data: &[u8], actor: &Actor) -> AppResult<ImportReport> {
        let result = async {
            let table = CsvTable::read(data)?;
            self.import_training(table).await
        }
        .await;
        self.audit
            .record(import_event(CsvKind::Training, actor, &result))
            .await;
        result
    }

    /// Import a file whose kind is told from its header.
    pub async fn import_auto(&self, data: &[u8], actor: &Actor) -> AppResult<AutoImportReport> {
        let table = CsvTable::read(data)?;
        let Some(kind) = detect_kind(&table.headers) else {
            let error = AppError::BadRequest(
                "Unable to determine CSV type - required columns missing".to_string(),
            );
            self.audit
                .record(
                    AuditEvent::new(
                        AuditEventType::BulkImport,
                        actor,
                        "CSV import of undetermined data",
                    )
                    .detail("columns", &table.headers)
                    .detail("error", error.to_string())
                    .status(AuditStatus::Failed),
                )
                .await;
            return Err(error);
        };
        tracing::info!("Detected {} data in uploaded CSV", kind.as_str());

        let result = match kind {
            CsvKind::Ppm => self.import_equipment(Regime::Ppm, table).await,
            CsvKind::Ocm => self.import_equipment(Regime::Ocm, table).await,
            CsvKind::Training => self.import_training(table).await,
        };
        self.audit
            .record(import_event(kind, actor, &result).detail("detected", true))
            .await;
        result.map(|report| AutoImportReport {
            data_type: kind,
            report,
        })
    }

    async fn import_equipment(&self, regime: Regime, table: CsvTable) -> AppResult<ImportReport> {
        let missing = missing_columns(&table.headers, required_columns(regime));
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required columns for {}: {}",
                regime.label(),
                missing.join(", ")
            )));
        }

        let mut report = ImportReport::default();
        let mut rows = Vec::new();
        for (row_number, row) in table.rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    report.skip(row_number, e);
                    continue;
                }
            };
            if row.get("SERIAL").is_none() {
                report.skip(row_number, "Empty SERIAL");
                continue;
            }
            match row.into_input(regime) {
                Ok(input) => rows.push((row_number, input)),
                Err(e) => report.skip(row_number, e),
            }
        }

        self.upsert_batch(regime, rows, &mut report).await?;
        tracing::info!(
            "{} CSV import: added {}, updated {}, skipped {}",
            regime.label(),
            report.added_count,
            report.updated_count,
            report.skipped_count
        );
        Ok(report)
    }

    /// Upsert training rows in one transaction. A row whose `id` exists
    /// replaces that record; any other row is inserted, keeping its `id`
    /// when it has one.
    async fn import_training(&self, table: CsvTable) -> AppResult<ImportReport> {
        let missing = missing_columns(&table.headers, &TRAINING_REQUIRED);
        if !missing.is_empty() {
            return Err(AppError::Validation(format!(
                "Missing required columns for training: {}",
                missing.join(", ")
            )));
        }

        let mut report = ImportReport::default();
        let mut tx = self.repository.begin().await?;
        for (row_number, row) in table.rows {
            let parsed = row.and_then(|row| row.into_training()).and_then(|(id, input)| {
                input
                    .into_fields()
                    .map(|fields| (id, fields))
                    .map_err(|e| e.to_string())
            });
            let (id, fields) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    report.skip(row_number, e);
                    continue;
                }
            };

            let exists = match id {
                Some(id) => self.repository.training_exists(&mut tx, id).await?,
                None => false,
            };
            match (id, exists) {
                (Some(id), true) => {
                    self.repository.training_overwrite(&mut tx, id, &fields).await?;
                    report.updated_count += 1;
                }
                _ => {
                    self.repository.training_insert(&mut tx, id, &fields).await?;
                    report.added_count += 1;
                }
            }
        }

        if report.changed() {
            tx.commit().await?;
        } else {
            tx.rollback().await?;
        }
        tracing::info!(
            "Training CSV import: added {}, updated {}, skipped {}",
            report.added_count,
            report.updated_count,
            report.skipped_count
        );
        Ok(report)
    }

    /// Upsert `rows` in one transaction keyed by raw serial. New records go
    /// to the end of the store order. Caches are cleared once, and only when
    /// something changed.
    pub(crate) async fn upsert_batch(
        &self,
        regime: Regime,
        rows: Vec<(usize, EquipmentInput)>,
        report: &mut ImportReport,
    ) -> AppResult<()> {
        let today = today();
        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let mut records: Vec<EquipmentRecord> =
            self.repository.equipment_load(&mut tx, regime).await?;

        for (row_number, input) in rows {
            let record = match input.into_record(regime, today) {
                Ok(record) => record,
                Err(e) => {
                    report.skip(row_number, e);
                    continue;
                }
            };
            let existing = records.iter().position(|r| r.serial == record.serial);
            let current_serial = existing.map(|i| records[i].serial.clone());
            if let Err(e) = ensure_unique(&records, &record, current_serial.as_deref()) {
                report.skip(row_number, e);
                continue;
            }

            match existing {
                Some(index) => {
                    self.repository
                        .equipment_update(&mut tx, &record.serial, &record)
                        .await?;
                    records[index] = record;
                    report.updated_count += 1;
                }
                None => {
                    self.repository
                        .equipment_insert(&mut tx, &record, Placement::Bottom)
                        .await?;
                    records.push(record);
                    report.added_count += 1;
                }
            }
        }

        if report.changed() {
            commit_invalidated(&gate, tx, Scope::Regime(regime)).await?;
        } else {
            tx.rollback().await?;
        }
        Ok(())
    }

    /// Export a regime as CSV in store order.
    pub async fn export_csv(&self, regime: Regime, actor: &Actor) -> AppResult<String> {
        let result = async {
            let listing = self.cache.listing(regime).await?;
            let csv = write_csv(&export_columns(regime), listing.rows.iter().map(export_row))?;
            Ok((csv, listing.rows.len()))
        }
        .await;
        self.record_export(regime.into(), actor, &result).await;
        result.map(|(csv, _)| csv)
    }

    /// Export training records as CSV, assignments encoded as JSON.
    pub async fn export_training_csv(&self, actor: &Actor) -> AppResult<String> {
        let result = async {
            let records = self.repository.training_list().await?;
            let rows = records
                .iter()
                .map(training_row)
                .collect::<AppResult<Vec<_>>>()?;
            let header: Vec<String> = TRAINING_COLUMNS.iter().map(|c| c.to_string()).collect();
            Ok((write_csv(&header, rows)?, records.len()))
        }
        .await;
        self.record_export(CsvKind::Training, actor, &result).await;
        result.map(|(csv, _)| csv)
    }

    async fn record_export(&self, kind: CsvKind, actor: &Actor, result: &AppResult<(String, usize)>) {
        let mut event = AuditEvent::new(
            AuditEventType::DataExport,
            actor,
            format!("Exported {} data as CSV", kind.as_str()),
        )
        .detail("data_type", kind);
        if let Ok((_, rows)) = result {
            event = event.detail("rows", rows);
        }
        self.audit.record(event.outcome(result)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        CsvRow {
            values: pairs
                .iter()
                .map(|(k, v)| (normalize_header(k), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_header_normalization() {
        assert_eq!(normalize_header("PPM_Q_I.date"), "ppm_q_i_date");
        assert_eq!(normalize_header(" Log Number "), "log_number");
        assert_eq!(normalize_header("\u{feff}SERIAL"), "serial");
        assert_eq!(normalize_header("LOG_Number"), normalize_header("log_number"));
    }

    #[test]
    fn test_ppm_row_reads_quarter_columns() {
        let input = row(&[
            ("SERIAL", "SN-1"),
            ("LOG_Number", "L1"),
            ("MODEL", "M"),
            ("MANUFACTURER", "X"),
            ("Department", "ICU"),
            ("ppm q ii date", "01/06/2026"),
            ("PPM_Q_II.engineer", "Jane"),
            ("Status", "overdue"),
        ])
        .into_input(Regime::Ppm)
        .unwrap();
        assert_eq!(input.quarters.len(), 4);
        assert_eq!(input.quarters[1].date.as_deref(), Some("01/06/2026"));
        assert_eq!(input.quarters[1].engineer.as_deref(), Some("Jane"));
        assert!(input.quarters[0].date.is_none());
        assert_eq!(input.status, Some(MaintenanceStatus::Overdue));
    }

    #[test]
    fn test_ocm_row_without_department() {
        let input = row(&[
            ("SERIAL", "SW3266#"),
            ("LOG_Number", "L2"),
            ("MODEL", "M"),
            ("MANUFACTURER", "X"),
            ("Service_Date", "2026-01-15"),
        ])
        .into_input(Regime::Ocm)
        .unwrap();
        assert_eq!(input.department, UNKNOWN_DEPARTMENT);
        assert_eq!(input.service_date.as_deref(), Some("2026-01-15"));
        assert!(row(&[("SERIAL", "A"), ("Status", "broken")])
            .into_input(Regime::Ocm)
            .is_err());
    }

    #[test]
    fn test_export_columns_import_back() {
        for regime in Regime::ALL {
            let normalized: Vec<String> =
                export_columns(regime).iter().map(|c| normalize_header(c)).collect();
            for column in required_columns(regime) {
                assert!(normalized.contains(&normalize_header(column)), "{}", column);
            }
        }
    }

    fn headers(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| normalize_header(c)).collect()
    }

    #[test]
    fn test_detect_kind_from_header() {
        let ppm = headers(&[
            "NO", "Department", "Name", "MODEL", "SERIAL", "MANUFACTURER", "LOG_Number",
            "PPM_Q_I.date",
        ]);
        assert_eq!(detect_kind(&ppm), Some(CsvKind::Ppm));

        let ocm = headers(&[
            "Department", "MODEL", "SERIAL", "MANUFACTURER", "LOG_Number", "Service_Date",
            "Engineer",
        ]);
        assert_eq!(detect_kind(&ocm), Some(CsvKind::Ocm));

        // Identity columns alone are not enough for PPM.
        let bare = headers(&["Department", "MODEL", "SERIAL", "MANUFACTURER", "LOG_Number"]);
        assert_eq!(detect_kind(&bare), None);

        let training = headers(&TRAINING_COLUMNS);
        assert_eq!(detect_kind(&training), Some(CsvKind::Training));
        assert_eq!(detect_kind(&headers(&["id", "name"])), None);
    }

    #[test]
    fn test_training_row_reads_assignments() {
        let (id, input) = row(&[
            ("id", "12"),
            ("employee_id", "E-4"),
            ("name", "Nadia"),
            ("department", "ICU"),
            (
                "machine_trainer_assignments",
                r#"[{"machine": "Ventilator", "trainer": "Omar"}]"#,
            ),
            ("last_trained_date", "N/A"),
        ])
        .into_training()
        .unwrap();
        assert_eq!(id, Some(12));
        assert_eq!(input.machine_trainer_assignments.len(), 1);
        assert_eq!(input.machine_trainer_assignments[0].trainer.as_deref(), Some("Omar"));
        assert!(input.last_trained_date.is_none());

        let (id, input) = row(&[
            ("id", "N/A"),
            ("employee_id", "E-5"),
            ("name", "Sami"),
            ("department", "ER"),
            ("trained_on_machines", "Defibrillator, Monitor"),
            ("trainer", "Lina"),
        ])
        .into_training()
        .unwrap();
        assert_eq!(id, None);
        assert_eq!(input.machine_trainer_assignments.len(), 2);
        assert_eq!(input.machine_trainer_assignments[1].machine, "Monitor");

        assert!(row(&[("id", "7"), ("machine_trainer_assignments", "[oops")])
            .into_training()
            .is_err());
        assert!(row(&[("id", "x7")]).into_training().is_err());
    }
}
