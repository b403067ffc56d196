//! One-shot import of the JSON files the system kept before the database.
//!
//! Runs at startup. A regime is imported only while its table is empty, and
//! history only while no note exists, so restarting never duplicates data.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    cache::{CacheCoordinator, Scope},
    error::{AppError, AppResult},
    identifier,
    models::{
        audit::{Actor, AuditEvent, AuditEventType, AuditStatus},
        equipment::QuarterInput,
        training::TrainingInput,
        EquipmentInput, HistoryAttachment, ImportReport, MachineTrainer, MaintenanceStatus,
        Regime,
    },
    repository::{
        history::{NewNote, NoteEdit},
        Repository,
    },
};

use super::{
    audit::AuditService,
    commit_invalidated,
    import_export::ImportExportService,
    uploads::{UploadStore, UploadedFile},
    Services,
};

/// Accept strings, numbers and nulls; the old files were not consistent.
fn lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
struct LegacyQuarter {
    #[serde(default, deserialize_with = "lenient")]
    engineer: Option<String>,
    #[serde(default, deserialize_with = "lenient", alias = "date")]
    quarter_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LegacyEquipment {
    #[serde(default, rename = "SERIAL", alias = "Serial", deserialize_with = "lenient")]
    serial: Option<String>,
    #[serde(default, rename = "Name", alias = "EQUIPMENT", deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, rename = "Department", deserialize_with = "lenient")]
    department: Option<String>,
    #[serde(default, rename = "MODEL", alias = "Model", deserialize_with = "lenient")]
    model: Option<String>,
    #[serde(
        default,
        rename = "MANUFACTURER",
        alias = "Manufacturer",
        deserialize_with = "lenient"
    )]
    manufacturer: Option<String>,
    #[serde(
        default,
        rename = "LOG_Number",
        alias = "Log_Number",
        alias = "LOG_NO",
        deserialize_with = "lenient"
    )]
    log_number: Option<String>,
    #[serde(default, rename = "Installation_Date", deserialize_with = "lenient")]
    installation_date: Option<String>,
    #[serde(default, rename = "Warranty_End", deserialize_with = "lenient")]
    warranty_end: Option<String>,
    #[serde(default, rename = "PPM_Q_I")]
    q1: Option<LegacyQuarter>,
    #[serde(default, rename = "PPM_Q_II")]
    q2: Option<LegacyQuarter>,
    #[serde(default, rename = "PPM_Q_III")]
    q3: Option<LegacyQuarter>,
    #[serde(default, rename = "PPM_Q_IV")]
    q4: Option<LegacyQuarter>,
    #[serde(default, rename = "Service_Date", deserialize_with = "lenient")]
    service_date: Option<String>,
    #[serde(default, rename = "Engineer", alias = "ENGINEER", deserialize_with = "lenient")]
    engineer: Option<String>,
    #[serde(default, rename = "Next_Maintenance", deserialize_with = "lenient")]
    next_maintenance: Option<String>,
    #[serde(default, rename = "Status", deserialize_with = "lenient")]
    status: Option<String>,
}

impl LegacyEquipment {
    fn into_input(self, regime: Regime) -> EquipmentInput {
        let quarters = match regime {
            Regime::Ppm => [self.q1, self.q2, self.q3, self.q4]
                .into_iter()
                .map(|q| {
                    let q = q.unwrap_or_default();
                    QuarterInput {
                        date: q.quarter_date,
                        engineer: q.engineer,
                    }
                })
                .collect(),
            Regime::Ocm => Vec::new(),
        };
        // A status the current rules do not know is recomputed instead.
        let status = self
            .status
            .and_then(|s| s.parse::<MaintenanceStatus>().ok());

        EquipmentInput {
            serial: self.serial.unwrap_or_default(),
            name: self.name,
            department: self.department.unwrap_or_else(|| "N/A".to_string()),
            model: self.model.unwrap_or_default(),
            manufacturer: self.manufacturer.unwrap_or_default(),
            log_number: self.log_number.unwrap_or_default(),
            installation_date: self.installation_date,
            warranty_end: self.warranty_end,
            quarters,
            service_date: self.service_date,
            next_maintenance: self.next_maintenance,
            engineer: self.engineer,
            status,
        }
    }
}

/// Either a list of machines or a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MachineList {
    List(Vec<String>),
    Text(String),
}

impl MachineList {
    fn into_names(self) -> Vec<String> {
        let names = match self {
            MachineList::List(names) => names,
            MachineList::Text(text) => text.split(',').map(str::to_string).collect(),
        };
        names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct LegacyTraining {
    #[serde(default, deserialize_with = "lenient")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    department: Option<String>,
    #[serde(default)]
    machine_trainer_assignments: Option<Vec<MachineTrainer>>,
    #[serde(default)]
    trained_on_machines: Option<MachineList>,
    #[serde(default, deserialize_with = "lenient")]
    trainer: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_trained_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    next_due_date: Option<String>,
}

impl LegacyTraining {
    /// Older files list machines with one trainer for all of them.
    fn into_input(self) -> TrainingInput {
        let machine_trainer_assignments = match self.machine_trainer_assignments {
            Some(assignments) => assignments,
            None => self
                .trained_on_machines
                .map(MachineList::into_names)
                .unwrap_or_default()
                .into_iter()
                .map(|machine| MachineTrainer {
                    machine,
                    trainer: self.trainer.clone(),
                })
                .collect(),
        };
        TrainingInput {
            employee_id: self.employee_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            department: self.department.unwrap_or_default(),
            machine_trainer_assignments,
            last_trained_date: self.last_trained_date,
            next_due_date: self.next_due_date,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyAttachment {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    original_filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    stored_filename: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    file_path: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    mime_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    upload_date: Option<String>,
}

/// A note from `equipment_history.json`. Authors are usernames there.
#[derive(Debug, Deserialize)]
struct LegacyNote {
    #[serde(default, deserialize_with = "lenient")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    equipment_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    equipment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    author_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    author_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    note_text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_modified_by: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    last_modified_by_name: Option<String>,
    #[serde(default)]
    attachments: Vec<LegacyAttachment>,
}

/// `YYYY-MM-DD HH:MM:SS` as the old files wrote it, or RFC 3339
fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}

fn parse_uuid(raw: Option<&str>) -> Uuid {
    raw.and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(Uuid::new_v4)
}

async fn read_array<T: for<'de> Deserialize<'de>>(path: &Path) -> AppResult<Option<Vec<T>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("{} is not valid: {}", path.display(), e)))
}

pub struct LegacyImporter {
    repository: Repository,
    cache: Arc<CacheCoordinator>,
    uploads: UploadStore,
    import_export: ImportExportService,
    audit: AuditService,
}

impl LegacyImporter {
    pub fn new(services: &Services) -> Self {
        Self {
            repository: services.repository.clone(),
            cache: services.cache.clone(),
            uploads: services.uploads.clone(),
            import_export: services.import_export.clone(),
            audit: services.audit.clone(),
        }
    }

    async fn record(&self, data_type: &str, path: &Path, report: &ImportReport) {
        let status = if report.skipped_count > 0 {
            AuditStatus::Warning
        } else {
            AuditStatus::Success
        };
        self.audit
            .record(
                AuditEvent::new(
                    AuditEventType::BulkImport,
                    &Actor::system(),
                    format!("Legacy import of {} data from {}", data_type, path.display()),
                )
                .detail("data_type", data_type)
                .detail("added_count", report.added_count)
                .detail("skipped_count", report.skipped_count)
                .status(status),
            )
            .await;
    }

    /// Import every legacy file whose target table is still empty. History
    /// goes last so its notes can resolve against the imported records.
    pub async fn import_if_empty(&self, json_dir: &Path) -> AppResult<()> {
        for regime in Regime::ALL {
            if self.repository.equipment_count(regime).await? > 0 {
                continue;
            }
            let path = json_dir.join(format!("{}.json", regime.as_str()));
            if let Some(report) = self.import_equipment(regime, &path).await? {
                tracing::info!(
                    "Imported {} legacy {} record(s) from {}, skipped {}",
                    report.added_count,
                    regime.label(),
                    path.display(),
                    report.skipped_count
                );
                for error in &report.errors {
                    tracing::warn!("Legacy {} import: {}", regime.label(), error);
                }
                self.record(regime.as_str(), &path, &report).await;
            }
        }

        if self.repository.training_count().await? == 0 {
            let path = json_dir.join("training.json");
            let imported = self.import_training(&path).await?;
            if imported > 0 {
                tracing::info!("Imported {} legacy training record(s)", imported);
                let report = ImportReport {
                    added_count: imported,
                    ..Default::default()
                };
                self.record("training", &path, &report).await;
            }
        }

        if self.repository.history_count().await? == 0 {
            let path = json_dir.join("equipment_history.json");
            if let Some(report) = self.import_history(json_dir, &path).await? {
                tracing::info!(
                    "Imported {} legacy history note(s) from {}, skipped {}",
                    report.added_count,
                    path.display(),
                    report.skipped_count
                );
                for error in &report.errors {
                    tracing::warn!("Legacy history import: {}", error);
                }
                if report.added_count > 0 {
                    self.record("history", &path, &report).await;
                }
            }
        }
        Ok(())
    }

    async fn import_equipment(&self, regime: Regime, path: &Path) -> AppResult<Option<ImportReport>> {
        let Some(entries) = read_array::<LegacyEquipment>(path).await? else {
            return Ok(None);
        };
        let rows = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| (index + 1, entry.into_input(regime)))
            .collect();
        let mut report = ImportReport::default();
        self.import_export
            .upsert_batch(regime, rows, &mut report)
            .await?;
        Ok(Some(report))
    }

    async fn import_training(&self, path: &Path) -> AppResult<usize> {
        let Some(entries) = read_array::<LegacyTraining>(path).await? else {
            return Ok(0);
        };
        let mut imported = 0;
        for (index, entry) in entries.into_iter().enumerate() {
            match entry.into_input().into_fields() {
                Ok(fields) => {
                    self.repository.training_create(&fields).await?;
                    imported += 1;
                }
                Err(e) => tracing::warn!("Legacy training entry {} skipped: {}", index + 1, e),
            }
        }
        Ok(imported)
    }

    /// Import notes under the canonical serial of the record they name,
    /// copying attachment files into the upload store. One transaction;
    /// the caches are cleared on commit so `has_history` is rebuilt.
    async fn import_history(&self, json_dir: &Path, path: &Path) -> AppResult<Option<ImportReport>> {
        let Some(entries) = read_array::<LegacyNote>(path).await? else {
            return Ok(None);
        };
        let mut report = ImportReport::default();
        if entries.is_empty() {
            return Ok(Some(report));
        }

        let gate = self.cache.begin_write().await;
        let mut tx = self.repository.begin().await?;
        let ppm = self.repository.equipment_load(&mut tx, Regime::Ppm).await?;
        let ocm = self.repository.equipment_load(&mut tx, Regime::Ocm).await?;

        let mut written: Vec<HistoryAttachment> = Vec::new();
        let result = async {
            for (index, entry) in entries.into_iter().enumerate() {
                let row_number = index + 1;
                let Some(regime) = entry
                    .equipment_type
                    .as_deref()
                    .and_then(|t| t.parse::<Regime>().ok())
                else {
                    report.skip(row_number, "Unknown equipment_type");
                    continue;
                };
                let records = match regime {
                    Regime::Ppm => &ppm,
                    Regime::Ocm => &ocm,
                };
                let raw_serial = entry.equipment_id.clone().unwrap_or_default();
                let Some(located) = identifier::locate(&raw_serial, records) else {
                    report.skip(
                        row_number,
                        format!("No {} equipment {:?}", regime.label(), raw_serial),
                    );
                    continue;
                };
                let serial = located.record.serial.clone();
                let Some(note_text) = entry.note_text.as_deref().filter(|t| !t.is_empty()) else {
                    report.skip(row_number, "Empty note_text");
                    continue;
                };

                let author_name = entry
                    .author_name
                    .clone()
                    .or_else(|| entry.author_id.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                let author_id = self.user_id(entry.author_id.as_deref()).await?.unwrap_or(0);
                let editor_name = entry
                    .last_modified_by_name
                    .clone()
                    .or_else(|| entry.last_modified_by.clone());
                let edited = match (parse_timestamp(entry.updated_at.as_deref()), &editor_name) {
                    (Some(updated_at), Some(by_name)) => Some(NoteEdit {
                        updated_at,
                        by_id: self.user_id(entry.last_modified_by.as_deref()).await?,
                        by_name: by_name.as_str(),
                    }),
                    _ => None,
                };

                let note_id = parse_uuid(entry.id.as_deref());
                self.repository
                    .history_insert_note(
                        &mut tx,
                        &NewNote {
                            id: note_id,
                            regime,
                            equipment_serial: &serial,
                            author_id,
                            author_name: &author_name,
                            note_text,
                            created_at: parse_timestamp(entry.created_at.as_deref())
                                .unwrap_or_else(Utc::now),
                            edited,
                        },
                    )
                    .await?;

                for legacy in &entry.attachments {
                    let Some(mut attachment) = self.copy_attachment(json_dir, note_id, legacy).await
                    else {
                        continue;
                    };
                    written.push(attachment.clone());
                    attachment.upload_date = parse_timestamp(legacy.upload_date.as_deref())
                        .unwrap_or(attachment.upload_date);
                    if let Some(id) = legacy.id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) {
                        attachment.id = id;
                    }
                    self.repository
                        .history_insert_attachment(&mut tx, &attachment)
                        .await?;
                }
                report.added_count += 1;
            }

            if report.added_count > 0 {
                commit_invalidated(&gate, tx, Scope::All).await
            } else {
                tx.rollback().await?;
                Ok(())
            }
        }
        .await;
        drop(gate);

        if let Err(e) = result {
            self.uploads.remove(&written).await;
            return Err(e);
        }
        Ok(Some(report))
    }

    async fn user_id(&self, username: Option<&str>) -> AppResult<Option<i64>> {
        match username {
            Some(username) => Ok(self
                .repository
                .users_get_by_username(username)
                .await?
                .map(|user| user.id)),
            None => Ok(None),
        }
    }

    /// Copy one attachment file into the upload store. Missing or rejected
    /// files are logged and skipped; the note is kept either way.
    async fn copy_attachment(
        &self,
        json_dir: &Path,
        note_id: Uuid,
        legacy: &LegacyAttachment,
    ) -> Option<HistoryAttachment> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(file_path) = legacy.file_path.as_deref() {
            let file_path = Path::new(file_path);
            if file_path.is_absolute() {
                candidates.push(file_path.to_path_buf());
            } else {
                candidates.push(json_dir.join(file_path));
            }
        }
        if let Some(stored) = legacy.stored_filename.as_deref() {
            candidates.push(json_dir.join(stored));
        }

        let mut bytes = None;
        for candidate in &candidates {
            if let Ok(found) = tokio::fs::read(candidate).await {
                bytes = Some(found);
                break;
            }
        }
        let Some(bytes) = bytes else {
            tracing::warn!(
                "Legacy attachment {:?} of note {} not found, skipped",
                legacy.original_filename,
                note_id
            );
            return None;
        };

        let file = UploadedFile {
            original_filename: legacy
                .original_filename
                .clone()
                .or_else(|| legacy.stored_filename.clone())
                .unwrap_or_default(),
            mime_type: legacy.mime_type.clone(),
            bytes,
        };
        match self.uploads.store(note_id, &file).await {
            Ok(attachment) => Some(attachment),
            Err(e) => {
                tracing::warn!(
                    "Legacy attachment {:?} of note {} skipped: {}",
                    file.original_filename,
                    note_id,
                    e
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_entry_with_legacy_field_names() {
        let entry: LegacyEquipment = serde_json::from_value(serde_json::json!({
            "NO": 3,
            "Department": "Radiology",
            "MODEL": "X-200",
            "SERIAL": "EU 2017/745",
            "MANUFACTURER": "Acme",
            "LOG_Number": 1042,
            "PPM_Q_I": {"engineer": "Sam", "quarter_date": "15/01/2026"},
            "PPM_Q_III": {"engineer": "", "quarter_date": "N/A"},
            "Status": "Upcoming"
        }))
        .unwrap();
        let input = entry.into_input(Regime::Ppm);
        assert_eq!(input.serial, "EU 2017/745");
        assert_eq!(input.log_number, "1042");
        assert_eq!(input.quarters.len(), 4);
        assert_eq!(input.quarters[0].engineer.as_deref(), Some("Sam"));
        assert!(input.quarters[1].date.is_none());
        assert!(input.quarters[2].engineer.is_none());
        assert_eq!(input.status, Some(MaintenanceStatus::Upcoming));
    }

    #[test]
    fn test_ocm_entry_with_mixed_case_names() {
        let entry: LegacyEquipment = serde_json::from_value(serde_json::json!({
            "Department": "ICU",
            "Name": "Monitor",
            "Model": "M1",
            "Serial": "SW3266#",
            "Manufacturer": "Beta",
            "Log_Number": "L-9",
            "Service_Date": "01/02/2026",
            "Engineer": "Ali",
            "Next_Maintenance": "01/02/2027",
            "Status": "Unknown"
        }))
        .unwrap();
        let input = entry.into_input(Regime::Ocm);
        assert_eq!(input.serial, "SW3266#");
        assert_eq!(input.model, "M1");
        assert_eq!(input.engineer.as_deref(), Some("Ali"));
        assert!(input.quarters.is_empty());
        assert!(input.status.is_none());
    }

    #[test]
    fn test_training_machines_become_assignments() {
        let entry: LegacyTraining = serde_json::from_value(serde_json::json!({
            "employee_id": 17,
            "name": "Nadia",
            "department": "ICU",
            "trained_on_machines": "Ventilator, Infusion Pump,",
            "trainer": "Omar"
        }))
        .unwrap();
        let input = entry.into_input();
        assert_eq!(input.employee_id, "17");
        assert_eq!(
            input.machine_trainer_assignments,
            vec![
                MachineTrainer {
                    machine: "Ventilator".to_string(),
                    trainer: Some("Omar".to_string())
                },
                MachineTrainer {
                    machine: "Infusion Pump".to_string(),
                    trainer: Some("Omar".to_string())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_and_blank_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = read_array::<LegacyTraining>(&dir.path().join("training.json"))
            .await
            .unwrap();
        assert!(missing.is_none());

        let blank = dir.path().join("ppm.json");
        tokio::fs::write(&blank, "  \n").await.unwrap();
        assert_eq!(read_array::<LegacyEquipment>(&blank).await.unwrap().map(|v| v.len()), Some(0));

        tokio::fs::write(&blank, "{not json").await.unwrap();
        assert!(read_array::<LegacyEquipment>(&blank).await.is_err());
    }
}
