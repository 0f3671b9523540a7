//! Command dashboard session: sees every live case and acts as the dispatching authority.

use resilio_core::domain::{Category, Department, Incident, IncidentId, IncidentStatus, Severity};
use resilio_core::error::AppError;
use resilio_core::lifecycle::Transition;
use resilio_core::priority::{self, SeverityFilter};
use resilio_core::service::IncidentApi;

use crate::agent::{RoleScope, SyncAgent};
use crate::reconcile::Settlement;

/// Session-local dashboard state. Created with the session and discarded with it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardScope {
    unread: usize,
    filter: SeverityFilter,
    selected: Option<IncidentId>,
}

impl RoleScope for DashboardScope {
    fn role(&self) -> &'static str {
        "dashboard"
    }

    fn admits(&self, _incident: &Incident) -> bool {
        true
    }

    fn on_inserted(&mut self, _incident: &Incident, live: bool) {
        if live {
            self.unread += 1;
        }
    }

    fn on_dropped(&mut self, id: IncidentId) {
        if self.selected == Some(id) {
            self.selected = None;
        }
    }
}

pub type DashboardAgent = SyncAgent<DashboardScope>;

impl SyncAgent<DashboardScope> {
    pub fn open(api: &dyn IncidentApi) -> Result<Self, AppError> {
        Self::connect(api, DashboardScope::default())
    }

    pub fn dispatch(
        &mut self,
        api: &dyn IncidentApi,
        id: IncidentId,
        department: Department,
        severity: Option<Severity>,
    ) -> Result<Settlement, AppError> {
        self.transition(
            api,
            id,
            Transition::Dispatch {
                department,
                severity,
            },
        )
    }

    pub fn retriage(
        &mut self,
        api: &dyn IncidentApi,
        id: IncidentId,
        severity: Option<Severity>,
        category: Option<Category>,
    ) -> Result<Settlement, AppError> {
        self.transition(api, id, Transition::Retriage { severity, category })
    }

    /// Open cases in priority order under the active severity filter.
    pub fn feed(&self) -> Vec<&Incident> {
        priority::order(
            self.records()
                .filter(|r| r.status != IncidentStatus::Resolved),
            self.scope().filter,
        )
    }

    /// Closed cases, most recently resolved first.
    pub fn resolved(&self) -> Vec<&Incident> {
        let mut out: Vec<&Incident> = self
            .records()
            .filter(|r| r.status == IncidentStatus::Resolved)
            .collect();
        out.sort_by(|a, b| {
            let at = |r: &Incident| r.resolution.as_ref().map(|res| res.resolved_at);
            at(*b).cmp(&at(*a))
        });
        out
    }

    pub fn unread(&self) -> usize {
        self.scope().unread
    }

    pub fn mark_read(&mut self) {
        self.scope_mut().unread = 0;
    }

    pub fn filter(&self) -> SeverityFilter {
        self.scope().filter
    }

    pub fn set_filter(&mut self, filter: SeverityFilter) {
        self.scope_mut().filter = filter;
    }

    /// Select a case for the detail panel. Returns `false` if it is not in view.
    pub fn select(&mut self, id: IncidentId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.scope_mut().selected = Some(id);
        true
    }

    pub fn clear_selection(&mut self) {
        self.scope_mut().selected = None;
    }

    pub fn selected(&self) -> Option<&Incident> {
        self.scope().selected.and_then(|id| self.get(id))
    }
}
