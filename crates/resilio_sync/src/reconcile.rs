//! Reconciliation primitive for one locally tracked record.
//!
//! A [`Tracked`] holds the last authoritative value and at most one optimistic intent on top of it.
//! Authoritative values are ordered by `revision`, so the outcome does not depend on whether the
//! broadcast or the request's own response arrives first.

use time::OffsetDateTime;

use resilio_core::domain::Incident;
use resilio_core::error::AppError;
use resilio_core::lifecycle::{self, Transition};

/// Identifies one optimistic intent issued by an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone, PartialEq)]
struct PendingIntent {
    ticket: Ticket,
    projected: Incident,
}

/// How an intent's outcome was folded into the local view.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// The response is now the confirmed local value.
    Confirmed,
    /// A newer authoritative value was already applied; the response was discarded.
    Superseded,
    /// The intent failed and the value held before it was restored.
    RolledBack(AppError),
    /// The record no longer exists server-side and left the local view.
    Vanished(AppError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tracked {
    confirmed: Incident,
    pending: Option<PendingIntent>,
}

impl Tracked {
    pub fn new(confirmed: Incident) -> Self {
        Self {
            confirmed,
            pending: None,
        }
    }

    pub fn confirmed(&self) -> &Incident {
        &self.confirmed
    }

    /// Value to render: the optimistic projection while an intent is in flight.
    pub fn current(&self) -> &Incident {
        self.pending
            .as_ref()
            .map(|p| &p.projected)
            .unwrap_or(&self.confirmed)
    }

    pub fn pending_ticket(&self) -> Option<Ticket> {
        self.pending.as_ref().map(|p| p.ticket)
    }

    /// Project `transition` onto the confirmed value.
    ///
    /// The intent is checked against the lifecycle graph first; a locally impossible intent
    /// changes nothing and is never sent.
    pub fn begin(
        &mut self,
        ticket: Ticket,
        transition: &Transition,
        now: OffsetDateTime,
    ) -> Result<&Incident, AppError> {
        if let Some(in_flight) = &self.pending {
            return Err(AppError::validation(
                "SYNC_INTENT_IN_FLIGHT",
                "Another action on this case is still waiting for the server",
            )
            .with_details(format!(
                "id={}; ticket={}",
                self.confirmed.id, in_flight.ticket.0
            )));
        }
        let projected = lifecycle::apply(&self.confirmed, transition, now)?;
        let pending = self.pending.insert(PendingIntent { ticket, projected });
        Ok(&pending.projected)
    }

    /// Fold in an authoritative value. Returns `false` when it is not newer than what is held.
    ///
    /// A newer value always replaces the projection, whichever intent it came from.
    pub fn accept_authoritative(&mut self, record: Incident) -> bool {
        if record.revision <= self.confirmed.revision {
            return false;
        }
        self.confirmed = record;
        self.pending = None;
        true
    }

    /// Resolve the outcome of the intent identified by `ticket`.
    pub fn settle(&mut self, ticket: Ticket, outcome: Result<Incident, AppError>) -> Settlement {
        let ours = self.pending_ticket() == Some(ticket);
        if ours {
            self.pending = None;
        }
        match outcome {
            Ok(record) => {
                if self.accept_authoritative(record) {
                    Settlement::Confirmed
                } else {
                    Settlement::Superseded
                }
            }
            Err(err) if err.is_not_found() => Settlement::Vanished(err),
            Err(err) if ours => Settlement::RolledBack(err),
            Err(_) => Settlement::Superseded,
        }
    }
}
