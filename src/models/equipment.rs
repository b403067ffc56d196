//! Equipment model: canonical record, regime-specific maintenance data,
//! derived views and dashboard statistics.

use chrono::{DateTime, Months, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::{MaintenanceStatus, Regime};
use crate::error::{AppError, AppResult};
use crate::identifier;

/// Parse a user-supplied date. Accepts `DD/MM/YYYY` and `YYYY-MM-DD`;
/// empty strings and `N/A` mean "no date".
pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
        return Ok(None);
    }
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map(Some)
        .map_err(|_| format!("Invalid date '{}': expected DD/MM/YYYY or YYYY-MM-DD", s))
}

fn parse_optional_date(field: &str, raw: Option<&str>) -> AppResult<Option<NaiveDate>> {
    match raw {
        None => Ok(None),
        Some(value) => {
            parse_date(value).map_err(|e| AppError::Validation(format!("{}: {}", field, e)))
        }
    }
}

/// Format a date the way CSV exports and legacy files carry it.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("n/a"))
}

/// Four quarterly visit dates at +3, +6, +9 and +12 months from `base`.
pub fn quarter_schedule(base: NaiveDate) -> [NaiveDate; 4] {
    let step = |months: u32| base.checked_add_months(Months::new(months)).unwrap_or(base);
    [step(3), step(6), step(9), step(12)]
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuarterVisit {
    pub date: Option<NaiveDate>,
    pub engineer: Option<String>,
}

impl QuarterVisit {
    fn has_engineer(&self) -> bool {
        self.engineer
            .as_deref()
            .map(|e| !e.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Regime-specific maintenance data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Maintenance {
    /// Quarters I..IV, always four entries
    Ppm { quarters: Vec<QuarterVisit> },
    Ocm {
        service_date: Option<NaiveDate>,
        next_maintenance: Option<NaiveDate>,
        engineer: Option<String>,
    },
}

impl Maintenance {
    pub fn regime(&self) -> Regime {
        match self {
            Maintenance::Ppm { .. } => Regime::Ppm,
            Maintenance::Ocm { .. } => Regime::Ocm,
        }
    }

    /// Status as of `today`.
    pub fn compute_status(&self, today: NaiveDate) -> MaintenanceStatus {
        match self {
            Maintenance::Ppm { quarters } => {
                let dated = quarters.iter().filter_map(|q| q.date.map(|d| (d, q)));
                let mut any_past = false;
                let mut any_future = false;
                for (date, visit) in dated {
                    if date < today {
                        if !visit.has_engineer() {
                            return MaintenanceStatus::Overdue;
                        }
                        any_past = true;
                    } else {
                        any_future = true;
                    }
                }
                if any_future {
                    MaintenanceStatus::Upcoming
                } else if any_past {
                    MaintenanceStatus::Maintained
                } else {
                    MaintenanceStatus::Upcoming
                }
            }
            Maintenance::Ocm {
                service_date,
                next_maintenance,
                ..
            } => match (service_date, next_maintenance) {
                (Some(service), Some(next)) if service >= next => MaintenanceStatus::Maintained,
                (_, Some(next)) if *next < today => MaintenanceStatus::Overdue,
                _ => MaintenanceStatus::Upcoming,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// EquipmentRecord
// ---------------------------------------------------------------------------

/// Canonical equipment record shared by both regimes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EquipmentRecord {
    /// Unique within the regime; may contain `#`, `/`, spaces, hyphens
    pub serial: String,
    pub regime: Regime,
    pub name: Option<String>,
    pub department: String,
    pub model: String,
    pub manufacturer: String,
    /// Unique within the regime
    pub log_number: String,
    pub installation_date: Option<NaiveDate>,
    pub warranty_end: Option<NaiveDate>,
    pub maintenance: Maintenance,
    pub status: MaintenanceStatus,
    /// Derived from the history table on every load
    #[serde(default)]
    pub has_history: bool,
}

impl EquipmentRecord {
    /// Structural checks that hold for every stored record.
    pub fn check(&self) -> AppResult<()> {
        if self.serial.trim().is_empty() {
            return Err(AppError::Validation("Serial number is required".to_string()));
        }
        if self.log_number.trim().is_empty() {
            return Err(AppError::Validation("Log number is required".to_string()));
        }
        if self.maintenance.regime() != self.regime {
            return Err(AppError::Validation(format!(
                "{} record carries {} maintenance data",
                self.regime.label(),
                self.maintenance.regime().label()
            )));
        }
        if let Maintenance::Ppm { quarters } = &self.maintenance {
            if quarters.len() != 4 {
                return Err(AppError::Validation(format!(
                    "PPM records need exactly 4 quarters, got {}",
                    quarters.len()
                )));
            }
        }
        Ok(())
    }

    pub fn refresh_status(&mut self, today: NaiveDate) -> bool {
        let status = self.maintenance.compute_status(today);
        let changed = status != self.status;
        self.status = status;
        changed
    }
}

// ---------------------------------------------------------------------------
// Input DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct QuarterInput {
    /// `DD/MM/YYYY` or `YYYY-MM-DD`
    pub date: Option<String>,
    pub engineer: Option<String>,
}

/// Create or replace an equipment record.
///
/// PPM records use `quarters`; OCM records use `service_date`,
/// `next_maintenance` and `engineer`. Missing PPM quarter dates are scheduled
/// every three months from the installation date (or today). A missing OCM
/// next maintenance date defaults to one year after the service date. The
/// status is computed unless supplied.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct EquipmentInput {
    #[validate(length(min = 1, max = 128, message = "Serial must be 1-128 characters"))]
    pub serial: String,
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[validate(length(min = 1, message = "Model is required"))]
    pub model: String,
    #[validate(length(min = 1, message = "Manufacturer is required"))]
    pub manufacturer: String,
    #[validate(length(min = 1, max = 128, message = "Log number must be 1-128 characters"))]
    pub log_number: String,
    pub installation_date: Option<String>,
    pub warranty_end: Option<String>,
    #[serde(default)]
    pub quarters: Vec<QuarterInput>,
    pub service_date: Option<String>,
    pub next_maintenance: Option<String>,
    pub engineer: Option<String>,
    pub status: Option<MaintenanceStatus>,
}

impl EquipmentInput {
    /// Build the canonical record, filling defaults relative to `today`.
    pub fn into_record(self, regime: Regime, today: NaiveDate) -> AppResult<EquipmentRecord> {
        self.validate()?;

        let installation_date =
            parse_optional_date("installation_date", self.installation_date.as_deref())?;
        let warranty_end = parse_optional_date("warranty_end", self.warranty_end.as_deref())?;

        let maintenance = match regime {
            Regime::Ppm => {
                if self.quarters.len() > 4 {
                    return Err(AppError::Validation(
                        "At most 4 quarters may be supplied".to_string(),
                    ));
                }
                let schedule = quarter_schedule(installation_date.unwrap_or(today));
                let mut supplied = self.quarters.into_iter();
                let mut quarters = Vec::with_capacity(4);
                for (index, default_date) in schedule.into_iter().enumerate() {
                    let input = supplied.next().unwrap_or_default();
                    let field = format!("quarters[{}].date", index);
                    let date = parse_optional_date(&field, input.date.as_deref())?
                        .unwrap_or(default_date);
                    quarters.push(QuarterVisit {
                        date: Some(date),
                        engineer: clean(input.engineer),
                    });
                }
                Maintenance::Ppm { quarters }
            }
            Regime::Ocm => {
                let service_date =
                    parse_optional_date("service_date", self.service_date.as_deref())?;
                let next_maintenance =
                    parse_optional_date("next_maintenance", self.next_maintenance.as_deref())?
                        .or_else(|| {
                            service_date.and_then(|d| d.checked_add_months(Months::new(12)))
                        });
                Maintenance::Ocm {
                    service_date,
                    next_maintenance,
                    engineer: clean(self.engineer),
                }
            }
        };

        let status = self
            .status
            .unwrap_or_else(|| maintenance.compute_status(today));

        let record = EquipmentRecord {
            serial: self.serial.trim().to_string(),
            regime,
            name: clean(self.name),
            department: self.department.trim().to_string(),
            model: self.model.trim().to_string(),
            manufacturer: self.manufacturer.trim().to_string(),
            log_number: self.log_number.trim().to_string(),
            installation_date,
            warranty_end,
            maintenance,
            status,
            has_history: false,
        };
        record.check()?;
        Ok(record)
    }
}

/// Bulk delete request
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    /// External identifiers (raw serials or URL tokens)
    pub identifiers: Vec<String>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Paths a client can follow for one record, built from its URL token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EquipmentLinks {
    /// GET/PUT/DELETE target for the record
    pub detail: String,
    pub history: String,
}

/// Record as served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EquipmentView {
    /// 1-based position in store order; present in listings only
    #[serde(rename = "NO", skip_serializing_if = "Option::is_none")]
    pub no: Option<usize>,
    pub url_token: String,
    pub links: EquipmentLinks,
    #[serde(flatten)]
    pub record: EquipmentRecord,
}

impl AsRef<EquipmentRecord> for EquipmentRecord {
    fn as_ref(&self) -> &EquipmentRecord {
        self
    }
}

impl AsRef<EquipmentRecord> for EquipmentView {
    fn as_ref(&self) -> &EquipmentRecord {
        &self.record
    }
}

impl EquipmentView {
    pub fn new(record: EquipmentRecord, no: Option<usize>) -> Self {
        Self {
            no,
            url_token: identifier::encode(&record.serial),
            links: identifier::links(record.regime, &record.serial),
            record,
        }
    }
}

/// Cached projection of a whole regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EquipmentListing {
    pub regime: Regime,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<EquipmentView>,
}

impl EquipmentListing {
    /// Number rows 1..N in store order.
    pub fn build(regime: Regime, records: Vec<EquipmentRecord>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| EquipmentView::new(record, Some(i + 1)))
            .collect();
        Self {
            regime,
            generated_at: Utc::now(),
            rows,
        }
    }
}

/// Listing query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct EquipmentQuery {
    /// Case-insensitive match on serial, name, model, manufacturer, department or log number
    pub search: Option<String>,
    pub status: Option<MaintenanceStatus>,
    pub department: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl EquipmentQuery {
    pub fn matches(&self, row: &EquipmentView) -> bool {
        let record = &row.record;
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(department) = self.department.as_deref() {
            if !record.department.eq_ignore_ascii_case(department.trim()) {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                [
                    Some(record.serial.as_str()),
                    record.name.as_deref(),
                    Some(record.model.as_str()),
                    Some(record.manufacturer.as_str()),
                    Some(record.department.as_str()),
                    Some(record.log_number.as_str()),
                ]
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Paginated listing response
#[derive(Debug, Serialize, ToSchema)]
pub struct EquipmentPage {
    pub items: Vec<EquipmentView>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

impl EquipmentPage {
    pub fn paginate(rows: Vec<EquipmentView>, page: Option<usize>, per_page: Option<usize>) -> Self {
        let per_page = per_page.unwrap_or(50).clamp(1, 500);
        let page = page.unwrap_or(1).max(1);
        let total = rows.len();
        let total_pages = total.div_ceil(per_page);
        let items = rows
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub regime: Regime,
    pub total: usize,
    pub upcoming: usize,
    pub overdue: usize,
    pub maintained: usize,
    pub with_history: usize,
    /// Record count per department, in first-seen order
    #[schema(value_type = Object)]
    pub departments: IndexMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

impl DashboardStats {
    pub fn from_records(regime: Regime, records: &[EquipmentRecord]) -> Self {
        let mut stats = DashboardStats {
            regime,
            total: records.len(),
            upcoming: 0,
            overdue: 0,
            maintained: 0,
            with_history: 0,
            departments: IndexMap::new(),
            generated_at: Utc::now(),
        };
        for record in records {
            match record.status {
                MaintenanceStatus::Upcoming => stats.upcoming += 1,
                MaintenanceStatus::Overdue => stats.overdue += 1,
                MaintenanceStatus::Maintained => stats.maintained += 1,
            }
            if record.has_history {
                stats.with_history += 1;
            }
            *stats
                .departments
                .entry(record.department.clone())
                .or_insert(0) += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn visit(d: NaiveDate, engineer: Option<&str>) -> QuarterVisit {
        QuarterVisit {
            date: Some(d),
            engineer: engineer.map(str::to_string),
        }
    }

    fn ocm_input(serial: &str) -> EquipmentInput {
        EquipmentInput {
            serial: serial.to_string(),
            department: "ICU".to_string(),
            model: "V60".to_string(),
            manufacturer: "Philips".to_string(),
            log_number: "LOG-1".to_string(),
            service_date: Some("01/03/2026".to_string()),
            engineer: Some("Ahmed".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("05/02/2026").unwrap(), Some(date(2026, 2, 5)));
        assert_eq!(parse_date("2026-02-05").unwrap(), Some(date(2026, 2, 5)));
        assert_eq!(parse_date(" N/A ").unwrap(), None);
        assert_eq!(parse_date("").unwrap(), None);
        assert!(parse_date("02-05-2026").is_err());
    }

    #[test]
    fn test_quarter_schedule_clamps_month_end() {
        let q = quarter_schedule(date(2025, 11, 30));
        assert_eq!(q[0], date(2026, 2, 28));
        assert_eq!(q[3], date(2026, 11, 30));
    }

    #[test]
    fn test_ppm_status_rules() {
        let today = date(2026, 6, 1);
        let overdue = Maintenance::Ppm {
            quarters: vec![
                visit(date(2026, 1, 1), Some("Ali")),
                visit(date(2026, 4, 1), None),
                visit(date(2026, 7, 1), None),
                visit(date(2026, 10, 1), None),
            ],
        };
        assert_eq!(overdue.compute_status(today), MaintenanceStatus::Overdue);

        let upcoming = Maintenance::Ppm {
            quarters: vec![
                visit(date(2026, 1, 1), Some("Ali")),
                visit(date(2026, 4, 1), Some("Ali")),
                visit(date(2026, 6, 1), None),
                visit(date(2026, 10, 1), None),
            ],
        };
        assert_eq!(upcoming.compute_status(today), MaintenanceStatus::Upcoming);

        let maintained = Maintenance::Ppm {
            quarters: vec![
                visit(date(2025, 3, 1), Some("Ali")),
                visit(date(2025, 6, 1), Some("Ali")),
                visit(date(2025, 9, 1), Some("Sara")),
                visit(date(2025, 12, 1), Some("Sara")),
            ],
        };
        assert_eq!(maintained.compute_status(today), MaintenanceStatus::Maintained);

        let undated = Maintenance::Ppm {
            quarters: vec![QuarterVisit { date: None, engineer: None }; 4],
        };
        assert_eq!(undated.compute_status(today), MaintenanceStatus::Upcoming);
    }

    #[test]
    fn test_ocm_status_rules() {
        let today = date(2026, 6, 1);
        let ocm = |service, next| Maintenance::Ocm {
            service_date: service,
            next_maintenance: next,
            engineer: None,
        };
        assert_eq!(
            ocm(Some(date(2026, 5, 1)), Some(date(2026, 5, 1))).compute_status(today),
            MaintenanceStatus::Maintained
        );
        assert_eq!(
            ocm(Some(date(2025, 1, 1)), Some(date(2026, 1, 1))).compute_status(today),
            MaintenanceStatus::Overdue
        );
        assert_eq!(
            ocm(None, Some(date(2026, 9, 1))).compute_status(today),
            MaintenanceStatus::Upcoming
        );
        assert_eq!(ocm(None, None).compute_status(today), MaintenanceStatus::Upcoming);
    }

    #[test]
    fn test_ppm_input_fills_quarters_from_installation_date() {
        let input = EquipmentInput {
            serial: "SN/100".to_string(),
            department: "Radiology".to_string(),
            model: "X1".to_string(),
            manufacturer: "GE".to_string(),
            log_number: "L100".to_string(),
            installation_date: Some("2026-01-15".to_string()),
            quarters: vec![QuarterInput {
                date: None,
                engineer: Some("  ".to_string()),
            }],
            ..Default::default()
        };
        let record = input.into_record(Regime::Ppm, date(2026, 2, 1)).unwrap();
        let Maintenance::Ppm { quarters } = &record.maintenance else {
            panic!("expected PPM maintenance");
        };
        assert_eq!(quarters.len(), 4);
        assert_eq!(quarters[0].date, Some(date(2026, 4, 15)));
        assert_eq!(quarters[3].date, Some(date(2027, 1, 15)));
        assert_eq!(quarters[0].engineer, None);
        assert_eq!(record.status, MaintenanceStatus::Upcoming);
    }

    #[test]
    fn test_ocm_input_defaults_next_maintenance() {
        let record = ocm_input("SW3266#")
            .into_record(Regime::Ocm, date(2026, 3, 2))
            .unwrap();
        assert_eq!(record.serial, "SW3266#");
        match record.maintenance {
            Maintenance::Ocm {
                next_maintenance, ..
            } => assert_eq!(next_maintenance, Some(date(2027, 3, 1))),
            _ => panic!("expected OCM maintenance"),
        }
    }

    #[test]
    fn test_input_rejects_bad_dates_and_missing_fields() {
        let mut bad_date = ocm_input("A1");
        bad_date.service_date = Some("31/31/2026".to_string());
        assert!(matches!(
            bad_date.into_record(Regime::Ocm, date(2026, 1, 1)),
            Err(AppError::Validation(_))
        ));

        let mut missing = ocm_input("A2");
        missing.log_number = String::new();
        assert!(missing.into_record(Regime::Ocm, date(2026, 1, 1)).is_err());
    }

    #[test]
    fn test_record_check_rejects_mismatched_maintenance() {
        let mut record = ocm_input("A3")
            .into_record(Regime::Ocm, date(2026, 1, 1))
            .unwrap();
        record.regime = Regime::Ppm;
        assert!(record.check().is_err());
    }

    #[test]
    fn test_dashboard_counts() {
        let today = date(2026, 3, 2);
        let mut a = ocm_input("A").into_record(Regime::Ocm, today).unwrap();
        a.has_history = true;
        let mut b = ocm_input("B").into_record(Regime::Ocm, today).unwrap();
        b.department = "ER".to_string();
        b.status = MaintenanceStatus::Overdue;
        let stats = DashboardStats::from_records(Regime::Ocm, &[a, b]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.upcoming, 1);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.with_history, 1);
        assert_eq!(stats.departments.get("ICU"), Some(&1));
        assert_eq!(stats.departments.keys().next().map(String::as_str), Some("ICU"));
    }

    #[test]
    fn test_pagination_bounds() {
        let page = EquipmentPage::paginate(Vec::new(), Some(3), Some(0));
        assert_eq!(page.per_page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_pagination_far_past_the_end() {
        let today = date(2026, 3, 2);
        let rows = ["A", "B"]
            .iter()
            .map(|s| {
                let record = ocm_input(s).into_record(Regime::Ocm, today).unwrap();
                EquipmentView::new(record, None)
            })
            .collect();
        let page = EquipmentPage::paginate(rows, Some(usize::MAX), Some(500));
        assert_eq!(page.total, 2);
        assert_eq!(page.page, usize::MAX);
        assert!(page.items.is_empty());
    }
}
