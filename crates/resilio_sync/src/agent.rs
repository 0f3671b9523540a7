//! Per-session synchronization agent.
//!
//! The agent owns the session's local view: the tracked records, their arrival order, pending
//! optimistic intents, and queued notices. It is driven by two inputs that may interleave freely:
//! feed events (via [`SyncAgent::pump`]) and outcomes of its own requests
//! (via [`SyncAgent::complete`]). Both route through [`Tracked`], so the server's newest revision
//! is what the session ends up showing.

use std::collections::{HashMap, HashSet};

use time::OffsetDateTime;

use resilio_core::domain::{Incident, IncidentFilter, IncidentId};
use resilio_core::error::AppError;
use resilio_core::fanout::{FeedGap, IncidentEvent, Subscription};
use resilio_core::lifecycle::Transition;
use resilio_core::service::IncidentApi;

use crate::notice::Notice;
use crate::reconcile::{Settlement, Ticket, Tracked};

/// Role-specific part of a session: what it shows and what it does when records come and go.
pub trait RoleScope {
    fn role(&self) -> &'static str;

    /// Whether `incident` belongs in this session's view.
    fn admits(&self, incident: &Incident) -> bool;

    /// Listing used when (re)building the view from the store.
    fn list_filter(&self) -> IncidentFilter {
        IncidentFilter::all()
    }

    /// `live` is false only for records loaded while the session is being set up.
    fn on_inserted(&mut self, _incident: &Incident, _live: bool) {}

    fn on_dropped(&mut self, _id: IncidentId) {}
}

/// Optimistic intent that has been projected locally and must be completed with the server's
/// outcome, even if the user has moved on.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub id: IncidentId,
    pub ticket: Ticket,
    pub transition: Transition,
}

pub struct SyncAgent<R: RoleScope> {
    scope: R,
    feed: Option<Subscription>,
    tracked: HashMap<IncidentId, Tracked>,
    // Newest arrival first.
    arrival: Vec<IncidentId>,
    // Highest revision seen per id, including ids outside the scope. Pruned on resync.
    seen: HashMap<IncidentId, i64>,
    tombstones: HashSet<IncidentId>,
    // Requests begun and not yet completed, per id.
    outstanding: HashMap<IncidentId, usize>,
    // Ids dropped by a resync while a request on them was outstanding.
    evicted: HashSet<IncidentId>,
    notices: Vec<Notice>,
    next_ticket: u64,
}

impl<R: RoleScope> SyncAgent<R> {
    /// Subscribe, then build the initial view from the store.
    ///
    /// Subscribing first means nothing committed after the listing can be missed; events that
    /// predate it are discarded by revision.
    pub fn connect(api: &dyn IncidentApi, scope: R) -> Result<Self, AppError> {
        let mut agent = Self {
            scope,
            feed: Some(api.subscribe()),
            tracked: HashMap::new(),
            arrival: Vec::new(),
            seen: HashMap::new(),
            tombstones: HashSet::new(),
            outstanding: HashMap::new(),
            evicted: HashSet::new(),
            notices: Vec::new(),
            next_ticket: 1,
        };
        agent.rebuild(api, false)?;
        tracing::debug!(
            role = agent.scope.role(),
            records = agent.tracked.len(),
            "session connected"
        );
        Ok(agent)
    }

    /// Rebuild the view from a fresh listing. Pending intents on records that are still listed
    /// are kept unless the listing already carries a newer revision. Records first seen here
    /// arrived while the session was behind and are reported to the scope as live.
    pub fn resync(&mut self, api: &dyn IncidentApi) -> Result<(), AppError> {
        self.rebuild(api, true)
    }

    fn rebuild(&mut self, api: &dyn IncidentApi, live: bool) -> Result<(), AppError> {
        let listing = api.list_incidents(&self.scope.list_filter())?;
        let listed: HashSet<IncidentId> = listing.iter().map(|r| r.id).collect();

        let stale: Vec<IncidentId> = self
            .tracked
            .keys()
            .copied()
            .filter(|id| !listed.contains(id))
            .collect();
        for id in stale {
            // A late response for this id must not bring it back.
            if self.outstanding.contains_key(&id) {
                self.evicted.insert(id);
            }
            self.drop_record(id);
        }

        // Listing is newest first; insert oldest first so the arrival order matches it.
        for record in listing.into_iter().rev() {
            self.absorb(record, live);
        }

        // Events still queued are newer than anything already consumed, so bookkeeping for ids
        // that are neither shown nor awaiting a response can go.
        let outstanding = &self.outstanding;
        self.tombstones.retain(|id| outstanding.contains_key(id));
        let (tracked, tombstones) = (&self.tracked, &self.tombstones);
        self.seen.retain(|id, _| {
            tracked.contains_key(id) || tombstones.contains(id) || outstanding.contains_key(id)
        });
        tracing::debug!(
            role = self.scope.role(),
            records = self.tracked.len(),
            "view resynchronized"
        );
        Ok(())
    }

    /// Apply every queued feed event. Returns how many events were read.
    pub fn pump(&mut self, api: &dyn IncidentApi) -> Result<usize, AppError> {
        let mut read = 0;
        loop {
            let Some(feed) = self.feed.as_mut() else {
                return Ok(read);
            };
            match feed.try_next() {
                Ok(Some(event)) => {
                    read += 1;
                    self.apply_event(event);
                }
                Ok(None) => return Ok(read),
                Err(FeedGap::Lagged(missed)) => {
                    tracing::warn!(role = self.scope.role(), missed, "feed lagged");
                    self.notices.push(Notice::feed_lagged(missed));
                    self.resync(api)?;
                }
                Err(FeedGap::Closed) => {
                    tracing::warn!(role = self.scope.role(), "feed closed");
                    self.feed = None;
                    self.notices.push(Notice::disconnected());
                    return Ok(read);
                }
            }
        }
    }

    pub fn apply_event(&mut self, event: IncidentEvent) {
        match event {
            IncidentEvent::Created { record } | IncidentEvent::Updated { record } => {
                self.absorb(record, true);
            }
            IncidentEvent::Deleted { id } => {
                self.tombstones.insert(id);
                self.drop_record(id);
            }
        }
    }

    /// Project `transition` locally and hand back the request to send.
    pub fn begin(
        &mut self,
        id: IncidentId,
        transition: Transition,
    ) -> Result<PendingRequest, AppError> {
        let ticket = Ticket(self.next_ticket);
        let tracked = self.tracked.get_mut(&id).ok_or_else(|| {
            AppError::validation("SYNC_NOT_TRACKED", "Case is not in this view")
                .with_details(format!("id={id}"))
        })?;
        tracked.begin(ticket, &transition, OffsetDateTime::now_utc())?;
        self.next_ticket += 1;
        *self.outstanding.entry(id).or_insert(0) += 1;
        Ok(PendingRequest {
            id,
            ticket,
            transition,
        })
    }

    /// Fold the server's outcome for `request` into the view and queue any notice it warrants.
    ///
    /// `api` is only used when the record was evicted by a resync while the request was in
    /// flight: the response may then predate the listing, so the current value is fetched instead.
    pub fn complete(
        &mut self,
        api: &dyn IncidentApi,
        request: PendingRequest,
        outcome: Result<Incident, AppError>,
    ) -> Settlement {
        let id = request.id;
        let failure = outcome.as_ref().err().cloned();
        let evicted = self.finish_outstanding(id);
        let settlement = match self.tracked.get_mut(&id) {
            Some(tracked) => {
                let settlement = tracked.settle(request.ticket, outcome);
                if settlement == Settlement::Confirmed {
                    let confirmed = tracked.confirmed().clone();
                    self.note_revision(&confirmed);
                    if !self.scope.admits(&confirmed) {
                        self.drop_record(id);
                    }
                }
                settlement
            }
            // Left the view while the request was in flight.
            None => match outcome {
                Ok(_) if evicted => self.refetch(api, id),
                Ok(record) => {
                    if self.absorb(record, true) {
                        Settlement::Confirmed
                    } else {
                        Settlement::Superseded
                    }
                }
                Err(err) if err.is_not_found() => Settlement::Vanished(err),
                Err(_) => Settlement::Superseded,
            },
        };

        match &settlement {
            Settlement::Vanished(_) => {
                self.tombstones.insert(id);
                self.drop_record(id);
                self.notices.push(Notice::case_vanished(id));
            }
            Settlement::RolledBack(err) => {
                self.notices.push(Notice::action_failed(id, err));
            }
            // Nothing to restore, but the failure is still reported.
            Settlement::Superseded => {
                if let Some(err) = &failure {
                    self.notices.push(Notice::action_failed(id, err));
                }
            }
            Settlement::Confirmed => {}
        }
        tracing::debug!(
            role = self.scope.role(),
            incident_id = id,
            ticket = request.ticket.0,
            ?settlement,
            "intent settled"
        );
        settlement
    }

    /// Optimistic transition followed by the request and its reconciliation.
    pub fn transition(
        &mut self,
        api: &dyn IncidentApi,
        id: IncidentId,
        transition: Transition,
    ) -> Result<Settlement, AppError> {
        let request = self.begin(id, transition)?;
        let outcome = api.transition(id, &request.transition);
        Ok(self.complete(api, request, outcome))
    }

    /// Administrative removal. The record leaves the view only once the server has deleted it.
    pub fn remove(&mut self, api: &dyn IncidentApi, id: IncidentId) -> Settlement {
        match api.remove(id) {
            Ok(()) => {
                self.tombstones.insert(id);
                self.drop_record(id);
                Settlement::Confirmed
            }
            Err(err) if err.is_not_found() => {
                self.tombstones.insert(id);
                self.drop_record(id);
                self.notices.push(Notice::case_vanished(id));
                Settlement::Vanished(err)
            }
            Err(err) => {
                self.notices.push(Notice::action_failed(id, &err));
                Settlement::RolledBack(err)
            }
        }
    }

    pub fn get(&self, id: IncidentId) -> Option<&Incident> {
        self.tracked.get(&id).map(Tracked::current)
    }

    pub fn is_pending(&self, id: IncidentId) -> bool {
        self.tracked
            .get(&id)
            .is_some_and(|t| t.pending_ticket().is_some())
    }

    /// Current values in arrival order, newest first.
    pub fn records(&self) -> impl Iterator<Item = &Incident> + '_ {
        self.arrival
            .iter()
            .filter_map(|id| self.tracked.get(id))
            .map(Tracked::current)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.feed.is_some()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn scope(&self) -> &R {
        &self.scope
    }

    pub(crate) fn scope_mut(&mut self) -> &mut R {
        &mut self.scope
    }

    /// End the session. Everything it held is discarded; only the role configuration survives.
    pub fn disconnect(self) -> R {
        tracing::debug!(role = self.scope.role(), "session disconnected");
        self.scope
    }

    /// Count `id`'s request as finished. Returns whether the id was evicted while it was out.
    fn finish_outstanding(&mut self, id: IncidentId) -> bool {
        let remaining = match self.outstanding.get_mut(&id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return self.evicted.contains(&id);
        }
        self.outstanding.remove(&id);
        self.evicted.remove(&id)
    }

    /// Replace a possibly stale response with the record's current value.
    fn refetch(&mut self, api: &dyn IncidentApi, id: IncidentId) -> Settlement {
        match api.get_incident(id) {
            Ok(current) => {
                if self.absorb(current, true) {
                    Settlement::Confirmed
                } else {
                    Settlement::Superseded
                }
            }
            Err(err) if err.is_not_found() => Settlement::Vanished(err),
            Err(err) => {
                tracing::warn!(incident_id = id, code = %err.code, "refetch failed");
                self.notices.push(Notice::action_failed(id, &err));
                Settlement::Superseded
            }
        }
    }

    fn note_revision(&mut self, record: &Incident) -> bool {
        let seen = self.seen.entry(record.id).or_insert(0);
        if record.revision <= *seen {
            return false;
        }
        *seen = record.revision;
        true
    }

    /// Route an authoritative value into the view. Returns `true` if the view changed.
    fn absorb(&mut self, record: Incident, live: bool) -> bool {
        if self.tombstones.contains(&record.id) || !self.note_revision(&record) {
            return false;
        }
        let id = record.id;
        let admitted = self.scope.admits(&record);
        if let Some(tracked) = self.tracked.get_mut(&id) {
            if admitted {
                return tracked.accept_authoritative(record);
            }
            self.drop_record(id);
            return true;
        }
        if !admitted {
            return false;
        }
        self.scope.on_inserted(&record, live);
        self.tracked.insert(id, Tracked::new(record));
        self.arrival.insert(0, id);
        true
    }

    fn drop_record(&mut self, id: IncidentId) {
        if self.tracked.remove(&id).is_some() {
            self.arrival.retain(|a| *a != id);
            self.scope.on_dropped(id);
        }
    }
}
