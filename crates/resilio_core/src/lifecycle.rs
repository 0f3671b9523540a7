//! Incident lifecycle state machine.
//!
//! Allowed edges:
//! `Pending -> Assigned -> En Route -> On Scene -> Resolved`, plus `Pending -> Pending`
//! (authority re-triage) and removal from any status except `Resolved`.
//!
//! Everything here is pure: the service runs [`apply`] inside the store's atomic
//! read-modify-write, and client sessions run it to project optimistic values.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::{Category, Department, Incident, IncidentStatus, Resolution, Severity};
use crate::error::AppError;

/// A typed mutation intent together with the payload its edge requires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Transition {
    /// Authority revises triage without moving the record.
    Retriage {
        severity: Option<Severity>,
        category: Option<Category>,
    },
    /// Authority dispatches a department; severity may be revised in the same step.
    Dispatch {
        department: Department,
        severity: Option<Severity>,
    },
    BeginTravel,
    Arrive,
    Resolve { report: String, resolved_by: String },
}

impl Transition {
    pub fn target(&self) -> IncidentStatus {
        match self {
            Transition::Retriage { .. } => IncidentStatus::Pending,
            Transition::Dispatch { .. } => IncidentStatus::Assigned,
            Transition::BeginTravel => IncidentStatus::EnRoute,
            Transition::Arrive => IncidentStatus::OnScene,
            Transition::Resolve { .. } => IncidentStatus::Resolved,
        }
    }
}

/// Edge graph. A status never has an edge to itself except the re-triage loop on `Pending`.
pub fn is_allowed(from: IncidentStatus, to: IncidentStatus) -> bool {
    use IncidentStatus::*;
    matches!(
        (from, to),
        (Pending, Pending)
            | (Pending, Assigned)
            | (Assigned, EnRoute)
            | (EnRoute, OnScene)
            | (OnScene, Resolved)
    )
}

fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(
            "VALIDATION_TRANSITION_PAYLOAD",
            format!("{field} is required"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Compute the successor record for `transition`.
///
/// Edge validity is checked before payload validity, so a malformed request on the wrong edge
/// reports `InvalidTransition`. The returned record keeps `revision`; the store bumps it.
pub fn apply(
    current: &Incident,
    transition: &Transition,
    now: OffsetDateTime,
) -> Result<Incident, AppError> {
    let target = transition.target();
    if !is_allowed(current.status, target) {
        return Err(AppError::invalid_transition(format!(
            "Cannot move incident from {} to {}",
            current.status, target
        ))
        .with_details(format!("id={}; revision={}", current.id, current.revision)));
    }

    let mut next = current.clone();
    match transition {
        Transition::Retriage { severity, category } => {
            if severity.is_none() && category.is_none() {
                return Err(AppError::validation(
                    "VALIDATION_TRANSITION_PAYLOAD",
                    "Re-triage needs a severity or a category",
                ));
            }
            if let Some(severity) = severity {
                next.severity = *severity;
            }
            if let Some(category) = category {
                next.category = *category;
            }
        }
        Transition::Dispatch {
            department,
            severity,
        } => {
            next.department = Some(*department);
            if let Some(severity) = severity {
                next.severity = *severity;
            }
        }
        Transition::BeginTravel | Transition::Arrive => {}
        Transition::Resolve {
            report,
            resolved_by,
        } => {
            next.resolution = Some(Resolution {
                report: required_text("Resolution report", report)?,
                resolved_by: required_text("Resolved-by identity", resolved_by)?,
                resolved_at: now,
            });
        }
    }
    next.status = target;
    next.check_invariants()?;
    Ok(next)
}

/// Administrative removal is allowed from every status except `Resolved`.
pub fn check_removable(current: &Incident) -> Result<(), AppError> {
    if current.status == IncidentStatus::Resolved {
        return Err(AppError::invalid_transition(
            "Resolved incidents are retained and cannot be removed",
        )
        .with_details(format!("id={}", current.id)));
    }
    Ok(())
}

/// Transport-shaped transition: a target status plus whatever payload fields the caller sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRequest {
    pub target: Option<IncidentStatus>,
    pub department: Option<Department>,
    pub severity: Option<Severity>,
    pub category: Option<Category>,
    pub report: Option<String>,
    pub resolved_by: Option<String>,
}

impl TransitionRequest {
    pub fn to(target: IncidentStatus) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }
}

impl TryFrom<TransitionRequest> for Transition {
    type Error = AppError;

    fn try_from(req: TransitionRequest) -> Result<Self, Self::Error> {
        let missing = |field: &str| {
            AppError::validation(
                "VALIDATION_TRANSITION_PAYLOAD",
                format!("{field} is required for this transition"),
            )
        };
        let target = req.target.ok_or_else(|| missing("Target status"))?;
        Ok(match target {
            IncidentStatus::Pending => Transition::Retriage {
                severity: req.severity,
                category: req.category,
            },
            IncidentStatus::Assigned => Transition::Dispatch {
                department: req.department.ok_or_else(|| missing("Department"))?,
                severity: req.severity,
            },
            IncidentStatus::EnRoute => Transition::BeginTravel,
            IncidentStatus::OnScene => Transition::Arrive,
            IncidentStatus::Resolved => Transition::Resolve {
                report: req.report.ok_or_else(|| missing("Resolution report"))?,
                resolved_by: req.resolved_by.ok_or_else(|| missing("Resolved-by identity"))?,
            },
        })
    }
}
