//! Shared domain enums

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Maintenance regime: each has its own record collection and field set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    /// Planned preventive maintenance, four quarterly visits per year
    Ppm,
    /// Operational/corrective maintenance, one service cycle at a time
    Ocm,
}

impl Regime {
    pub const ALL: [Regime; 2] = [Regime::Ppm, Regime::Ocm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Ppm => "ppm",
            Regime::Ocm => "ocm",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Regime::Ppm => "PPM",
            Regime::Ocm => "OCM",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ppm" => Ok(Regime::Ppm),
            "ocm" => Ok(Regime::Ocm),
            _ => Err(format!("Invalid regime: {}", s)),
        }
    }
}

// ---------------------------------------------------------------------------
// MaintenanceStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum MaintenanceStatus {
    Upcoming,
    Overdue,
    Maintained,
}

impl MaintenanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenanceStatus::Upcoming => "Upcoming",
            MaintenanceStatus::Overdue => "Overdue",
            MaintenanceStatus::Maintained => "Maintained",
        }
    }
}

impl std::fmt::Display for MaintenanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MaintenanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upcoming" => Ok(MaintenanceStatus::Upcoming),
            "overdue" => Ok(MaintenanceStatus::Overdue),
            "maintained" => Ok(MaintenanceStatus::Maintained),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regime_parse_is_case_insensitive() {
        assert_eq!("PPM".parse::<Regime>().unwrap(), Regime::Ppm);
        assert_eq!(" ocm ".parse::<Regime>().unwrap(), Regime::Ocm);
        assert!("training".parse::<Regime>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_display() {
        for status in [
            MaintenanceStatus::Upcoming,
            MaintenanceStatus::Overdue,
            MaintenanceStatus::Maintained,
        ] {
            assert_eq!(status.to_string().parse::<MaintenanceStatus>().unwrap(), status);
        }
    }
}
