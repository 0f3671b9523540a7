//! Field unit session: sees the open cases dispatched to its department and drives them on scene.

use resilio_core::domain::{Department, Incident, IncidentFilter, IncidentId};
use resilio_core::error::AppError;
use resilio_core::lifecycle::Transition;
use resilio_core::priority::{self, SeverityFilter};
use resilio_core::service::IncidentApi;

use crate::agent::{RoleScope, SyncAgent};
use crate::reconcile::Settlement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldUnitScope {
    callsign: String,
    department: Department,
    active_mission: Option<IncidentId>,
}

impl FieldUnitScope {
    pub fn new(callsign: &str, department: Department) -> Result<Self, AppError> {
        let callsign = callsign.trim();
        if callsign.is_empty() {
            return Err(AppError::validation(
                "VALIDATION_CALLSIGN_REQUIRED",
                "Field unit callsign is required",
            ));
        }
        Ok(Self {
            callsign: callsign.to_string(),
            department,
            active_mission: None,
        })
    }

    pub fn callsign(&self) -> &str {
        &self.callsign
    }

    pub fn department(&self) -> Department {
        self.department
    }
}

impl RoleScope for FieldUnitScope {
    fn role(&self) -> &'static str {
        "field_unit"
    }

    fn admits(&self, incident: &Incident) -> bool {
        incident.department == Some(self.department) && incident.status.is_field_active()
    }

    fn list_filter(&self) -> IncidentFilter {
        IncidentFilter::field_tasks(self.department)
    }

    fn on_dropped(&mut self, id: IncidentId) {
        if self.active_mission == Some(id) {
            self.active_mission = None;
        }
    }
}

pub type FieldUnitAgent = SyncAgent<FieldUnitScope>;

impl SyncAgent<FieldUnitScope> {
    pub fn open(
        api: &dyn IncidentApi,
        callsign: &str,
        department: Department,
    ) -> Result<Self, AppError> {
        Self::connect(api, FieldUnitScope::new(callsign, department)?)
    }

    /// Assigned work in priority order.
    pub fn tasks(&self) -> Vec<&Incident> {
        priority::order(self.records(), SeverityFilter::All)
    }

    pub fn open_mission(&mut self, id: IncidentId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.scope_mut().active_mission = Some(id);
        true
    }

    /// Closing the mission view does not cancel anything already sent.
    pub fn close_mission(&mut self) {
        self.scope_mut().active_mission = None;
    }

    pub fn active_mission(&self) -> Option<&Incident> {
        self.scope().active_mission.and_then(|id| self.get(id))
    }

    pub fn begin_travel(
        &mut self,
        api: &dyn IncidentApi,
        id: IncidentId,
    ) -> Result<Settlement, AppError> {
        self.transition(api, id, Transition::BeginTravel)
    }

    pub fn arrive(&mut self, api: &dyn IncidentApi, id: IncidentId) -> Result<Settlement, AppError> {
        self.transition(api, id, Transition::Arrive)
    }

    /// Submit the resolution report signed with this unit's callsign.
    pub fn resolve(
        &mut self,
        api: &dyn IncidentApi,
        id: IncidentId,
        report: &str,
    ) -> Result<Settlement, AppError> {
        let resolved_by = self.scope().callsign.clone();
        self.transition(
            api,
            id,
            Transition::Resolve {
                report: report.to_string(),
                resolved_by,
            },
        )
    }
}
