use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;

/// Store-assigned record identity. Monotonic; never reused after deletion.
pub type IncidentId = i64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    Fire,
    Medical,
    Disaster,
    Security,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Severity {
    Critical,
    Serious,
    Minor,
    Fake,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Department {
    Medical,
    Fire,
    Police,
    #[serde(rename = "Disaster Management")]
    DisasterManagement,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IncidentStatus {
    Pending,
    Assigned,
    #[serde(rename = "En Route")]
    EnRoute,
    #[serde(rename = "On Scene")]
    OnScene,
    Resolved,
}

/// Generates `as_str`, `ALL`, `Display` and `FromStr` for the label enums above,
/// so SQLite columns, CLI flags and JSON all share one spelling.
macro_rules! labeled_enum {
    ($ty:ident, $code:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| {
                        v.as_str().eq_ignore_ascii_case(needle)
                            || format!("{v:?}").eq_ignore_ascii_case(needle)
                    })
                    .ok_or_else(|| {
                        AppError::validation($code, format!("Unknown {} value", stringify!($ty)))
                            .with_details(format!("value={s}"))
                    })
            }
        }
    };
}

labeled_enum!(Category, "VALIDATION_CATEGORY_UNKNOWN", {
    Fire => "Fire",
    Medical => "Medical",
    Disaster => "Disaster",
    Security => "Security",
    Other => "Other",
});

labeled_enum!(Severity, "VALIDATION_SEVERITY_UNKNOWN", {
    Critical => "Critical",
    Serious => "Serious",
    Minor => "Minor",
    Fake => "Fake",
});

labeled_enum!(Department, "VALIDATION_DEPARTMENT_UNKNOWN", {
    Medical => "Medical",
    Fire => "Fire",
    Police => "Police",
    DisasterManagement => "Disaster Management",
});

labeled_enum!(IncidentStatus, "VALIDATION_STATUS_UNKNOWN", {
    Pending => "Pending",
    Assigned => "Assigned",
    EnRoute => "En Route",
    OnScene => "On Scene",
    Resolved => "Resolved",
});

impl Severity {
    /// Priority rank used for dashboard ordering (higher sorts first).
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::Serious => 2,
            Severity::Minor => 1,
            Severity::Fake => 0,
        }
    }
}

impl IncidentStatus {
    /// Statuses a field unit works on.
    pub fn is_field_active(&self) -> bool {
        matches!(
            self,
            IncidentStatus::Assigned | IncidentStatus::EnRoute | IncidentStatus::OnScene
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lng_ok = self.lng.is_finite() && (-180.0..=180.0).contains(&self.lng);
        if lat_ok && lng_ok {
            return Ok(());
        }
        Err(
            AppError::validation("VALIDATION_LOCATION_INVALID", "Location is out of range")
                .with_details(format!("lat={}; lng={}", self.lat, self.lng)),
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Image,
    Audio,
}

/// Opaque pointer to a blob held by the external media store. Bytes never pass through here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceRef {
    pub kind: EvidenceKind,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub report: String,
    pub resolved_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub resolved_at: OffsetDateTime,
}

/// One reported emergency tracked through its lifecycle.
///
/// Notes:
/// - `revision` starts at 1 and is bumped by the store on every committed update; clients use it
///   to discard stale authoritative values.
/// - `description`, `location`, `evidence` and `created_at` are never rewritten after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Incident {
    pub id: IncidentId,
    pub revision: i64,
    pub category: Category,
    pub severity: Severity,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub evidence: Vec<EvidenceRef>,
    pub department: Option<Department>,
    pub status: IncidentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub resolution: Option<Resolution>,
}

impl Incident {
    /// Structural invariants every committed record must satisfy.
    pub fn check_invariants(&self) -> Result<(), AppError> {
        let resolved = self.status == IncidentStatus::Resolved;
        if resolved != self.resolution.is_some() {
            return Err(AppError::validation(
                "VALIDATION_RESOLUTION_MISMATCH",
                "Resolution must be present exactly when status is Resolved",
            )
            .with_details(format!("id={}; status={}", self.id, self.status)));
        }
        let dispatched = self.status != IncidentStatus::Pending;
        if dispatched != self.department.is_some() {
            return Err(AppError::validation(
                "VALIDATION_DEPARTMENT_MISMATCH",
                "Department must be present exactly when the incident has been dispatched",
            )
            .with_details(format!("id={}; status={}", self.id, self.status)));
        }
        Ok(())
    }
}

/// Reporter submission as received from the field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSubmission {
    pub category: Category,
    pub description: Option<String>,
    pub location: GeoPoint,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

impl ReportSubmission {
    pub fn new(category: Category, description: Option<&str>, location: GeoPoint) -> Self {
        Self {
            category,
            description: description.map(str::to_string),
            location,
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, kind: EvidenceKind, address: impl Into<String>) -> Self {
        self.evidence.push(EvidenceRef {
            kind,
            address: address.into(),
        });
        self
    }
}

/// Draft handed to the store; the store assigns `id` and `revision`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIncident {
    pub category: Category,
    pub severity: Severity,
    pub description: Option<String>,
    pub location: GeoPoint,
    pub evidence: Vec<EvidenceRef>,
    pub created_at: OffsetDateTime,
}

/// Predicate for store listings. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentFilter {
    pub statuses: Option<Vec<IncidentStatus>>,
    pub severity: Option<Severity>,
    pub department: Option<Department>,
}

impl IncidentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn field_tasks(department: Department) -> Self {
        Self {
            statuses: Some(vec![
                IncidentStatus::Assigned,
                IncidentStatus::EnRoute,
                IncidentStatus::OnScene,
            ]),
            severity: None,
            department: Some(department),
        }
    }

    pub fn matches(&self, incident: &Incident) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&incident.status) {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            if incident.severity != severity {
                return false;
            }
        }
        if let Some(department) = self.department {
            if incident.department != Some(department) {
                return false;
            }
        }
        true
    }
}
