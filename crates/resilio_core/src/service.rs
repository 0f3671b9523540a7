//! Server-authoritative incident service.
//!
//! Every accepted mutation is committed to the store first and then broadcast exactly once.
//! Rejected mutations never broadcast.

use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::config::ServiceConfig;
use crate::domain::{Incident, IncidentFilter, IncidentId, NewIncident, ReportSubmission};
use crate::error::AppError;
use crate::fanout::{Fanout, IncidentEvent, Subscription};
use crate::lifecycle::{self, Transition, TransitionRequest};
use crate::store::{IncidentStore, SqliteIncidentStore};
use crate::triage;

/// Transport-agnostic operations exposed to client sessions.
pub trait IncidentApi {
    fn submit_incident(&self, submission: ReportSubmission) -> Result<Incident, AppError>;

    fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError>;

    fn get_incident(&self, id: IncidentId) -> Result<Incident, AppError>;

    fn transition(&self, id: IncidentId, transition: &Transition) -> Result<Incident, AppError>;

    fn remove(&self, id: IncidentId) -> Result<(), AppError>;

    fn subscribe(&self) -> Subscription;
}

pub struct IncidentService<S: IncidentStore> {
    store: S,
    fanout: Fanout,
    // Held across commit + publish so broadcast order matches commit order.
    commit_order: Mutex<()>,
}

impl IncidentService<SqliteIncidentStore> {
    pub fn from_config(config: &ServiceConfig) -> Result<Self, AppError> {
        let store = config.open_store()?;
        Ok(Self::new(store, config.fanout_capacity))
    }
}

impl<S: IncidentStore> IncidentService<S> {
    pub fn new(store: S, fanout_capacity: usize) -> Self {
        Self {
            store,
            fanout: Fanout::new(fanout_capacity),
            commit_order: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    /// Wire-shaped transition: target status plus optional payload fields.
    pub fn transition_request(
        &self,
        id: IncidentId,
        request: TransitionRequest,
    ) -> Result<Incident, AppError> {
        let transition = Transition::try_from(request)?;
        self.transition(id, &transition)
    }

    fn validate_submission(submission: &ReportSubmission) -> Result<(), AppError> {
        submission.location.validate()?;
        if let Some(bad) = submission
            .evidence
            .iter()
            .find(|e| e.address.trim().is_empty())
        {
            return Err(AppError::validation(
                "VALIDATION_EVIDENCE_INVALID",
                "Evidence reference address is empty",
            )
            .with_details(format!("kind={:?}", bad.kind)));
        }
        Ok(())
    }
}

impl<S: IncidentStore> IncidentApi for IncidentService<S> {
    fn submit_incident(&self, submission: ReportSubmission) -> Result<Incident, AppError> {
        Self::validate_submission(&submission)?;

        let description = submission
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        let severity = triage::classify(submission.category, description.as_deref());

        let draft = NewIncident {
            category: submission.category,
            severity,
            description,
            location: submission.location,
            evidence: submission.evidence,
            created_at: OffsetDateTime::now_utc(),
        };

        let _order = self.commit_order.lock();
        let record = self.store.create(draft)?;
        tracing::info!(
            incident_id = record.id,
            category = %record.category,
            severity = %record.severity,
            "incident submitted"
        );
        self.fanout.publish(IncidentEvent::Created {
            record: record.clone(),
        });
        Ok(record)
    }

    fn list_incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError> {
        self.store.list(filter)
    }

    fn get_incident(&self, id: IncidentId) -> Result<Incident, AppError> {
        self.store.get(id)
    }

    fn transition(&self, id: IncidentId, transition: &Transition) -> Result<Incident, AppError> {
        let _order = self.commit_order.lock();
        let result = self.store.update(id, |current| {
            lifecycle::apply(current, transition, OffsetDateTime::now_utc())
        });

        match result {
            Ok(record) => {
                tracing::info!(
                    incident_id = id,
                    status = %record.status,
                    revision = record.revision,
                    "transition committed"
                );
                self.fanout.publish(IncidentEvent::Updated {
                    record: record.clone(),
                });
                Ok(record)
            }
            Err(err) => {
                tracing::debug!(
                    incident_id = id,
                    target = %transition.target(),
                    code = %err.code,
                    "transition rejected"
                );
                Err(err)
            }
        }
    }

    fn remove(&self, id: IncidentId) -> Result<(), AppError> {
        let _order = self.commit_order.lock();
        match self.store.delete(id, lifecycle::check_removable) {
            Ok(()) => {
                tracing::info!(incident_id = id, "incident removed");
                self.fanout.publish(IncidentEvent::Deleted { id });
                Ok(())
            }
            Err(err) => {
                tracing::debug!(incident_id = id, code = %err.code, "removal rejected");
                Err(err)
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        self.fanout.subscribe()
    }
}
