//! Staff training records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use validator::Validate;

use super::equipment::parse_date;
use crate::error::{AppError, AppResult};

/// One machine an employee is trained on, with the trainer who signed it off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MachineTrainer {
    pub machine: String,
    pub trainer: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TrainingRow {
    id: i64,
    employee_id: String,
    name: String,
    department: String,
    machine_trainer_assignments: Json<Vec<MachineTrainer>>,
    last_trained_date: Option<NaiveDate>,
    next_due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TrainingRow> for TrainingRecord {
    fn from(row: TrainingRow) -> Self {
        TrainingRecord {
            id: row.id,
            employee_id: row.employee_id,
            name: row.name,
            department: row.department,
            machine_trainer_assignments: row.machine_trainer_assignments.0,
            last_trained_date: row.last_trained_date,
            next_due_date: row.next_due_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainingRecord {
    pub id: i64,
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub machine_trainer_assignments: Vec<MachineTrainer>,
    pub last_trained_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create or replace a training record
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct TrainingInput {
    #[validate(length(min = 1, message = "Employee ID is required"))]
    pub employee_id: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[serde(default)]
    pub machine_trainer_assignments: Vec<MachineTrainer>,
    /// `DD/MM/YYYY` or `YYYY-MM-DD`
    pub last_trained_date: Option<String>,
    pub next_due_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TrainingBulkDeleteRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// Validated training fields ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingFields {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub machine_trainer_assignments: Vec<MachineTrainer>,
    pub last_trained_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
}

impl TrainingInput {
    pub fn into_fields(self) -> AppResult<TrainingFields> {
        self.validate()?;
        let date = |field: &str, raw: Option<&str>| -> AppResult<Option<NaiveDate>> {
            match raw {
                Some(value) => {
                    parse_date(value).map_err(|e| AppError::Validation(format!("{}: {}", field, e)))
                }
                None => Ok(None),
            }
        };
        let last_trained_date = date("last_trained_date", self.last_trained_date.as_deref())?;
        let next_due_date = date("next_due_date", self.next_due_date.as_deref())?;

        let machine_trainer_assignments = self
            .machine_trainer_assignments
            .into_iter()
            .filter(|a| !a.machine.trim().is_empty())
            .map(|a| MachineTrainer {
                machine: a.machine.trim().to_string(),
                trainer: a
                    .trainer
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            })
            .collect();

        Ok(TrainingFields {
            employee_id: self.employee_id.trim().to_string(),
            name: self.name.trim().to_string(),
            department: self.department.trim().to_string(),
            machine_trainer_assignments,
            last_trained_date,
            next_due_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_drops_blank_machines_and_trainers() {
        let input = TrainingInput {
            employee_id: " E-17 ".to_string(),
            name: "Nadia".to_string(),
            department: "ICU".to_string(),
            machine_trainer_assignments: vec![
                MachineTrainer {
                    machine: "Ventilator".to_string(),
                    trainer: Some(" ".to_string()),
                },
                MachineTrainer {
                    machine: "  ".to_string(),
                    trainer: Some("Omar".to_string()),
                },
            ],
            last_trained_date: Some("12/01/2026".to_string()),
            next_due_date: None,
        };
        let fields = input.into_fields().unwrap();
        assert_eq!(fields.employee_id, "E-17");
        assert_eq!(
            fields.machine_trainer_assignments,
            vec![MachineTrainer {
                machine: "Ventilator".to_string(),
                trainer: None
            }]
        );
        assert_eq!(fields.last_trained_date, NaiveDate::from_ymd_opt(2026, 1, 12));
    }
}
