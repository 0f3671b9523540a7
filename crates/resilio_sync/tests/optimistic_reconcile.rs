use pretty_assertions::assert_eq;

use resilio_core::domain::{
    Category, Department, GeoPoint, IncidentStatus, ReportSubmission, Severity,
};
use resilio_core::error::ErrorKind;
use resilio_core::lifecycle::Transition;
use resilio_core::service::{IncidentApi, IncidentService};
use resilio_core::store::SqliteIncidentStore;
use resilio_sync::notice::CASE_VANISHED_MESSAGE;
use resilio_sync::{DashboardAgent, FieldUnitAgent, NoticeKind, Settlement};

type Service = IncidentService<SqliteIncidentStore>;

fn service(capacity: usize) -> Service {
    IncidentService::new(SqliteIncidentStore::open_in_memory().expect("store"), capacity)
}

fn medical_report(description: &str) -> ReportSubmission {
    ReportSubmission::new(
        Category::Medical,
        Some(description),
        GeoPoint::new(20.3010, 85.8100),
    )
}

/// Submits a case and dispatches it to Medical directly through the service.
fn assigned_case(svc: &Service) -> i64 {
    let rec = svc
        .submit_incident(medical_report("person unconscious at bus stop"))
        .expect("submit");
    svc.transition(
        rec.id,
        &Transition::Dispatch {
            department: Department::Medical,
            severity: None,
        },
    )
    .expect("dispatch");
    rec.id
}

#[test]
fn optimistic_en_route_rejected_with_not_found_drops_the_case() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut dashboard = DashboardAgent::open(&svc).expect("dashboard");
    let mut unit = FieldUnitAgent::open(&svc, "Medic-7", Department::Medical).expect("unit");
    assert_eq!(unit.get(id).unwrap().status, IncidentStatus::Assigned);

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    assert_eq!(unit.get(id).unwrap().status, IncidentStatus::EnRoute);

    // The authority deletes the case before the unit's request reaches the server.
    assert_eq!(dashboard.remove(&svc, id), Settlement::Confirmed);
    let outcome = svc.transition(id, &request.transition);
    assert_eq!(outcome.as_ref().unwrap_err().kind, ErrorKind::NotFound);

    let settlement = unit.complete(&svc, request, outcome);
    assert!(matches!(settlement, Settlement::Vanished(_)));
    assert!(unit.get(id).is_none());

    let notices = unit.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::CaseVanished);
    assert_eq!(notices[0].incident_id, Some(id));
    assert_eq!(notices[0].message, CASE_VANISHED_MESSAGE);

    // The queued tombstone changes nothing further.
    unit.pump(&svc).expect("pump");
    assert!(unit.get(id).is_none());
    assert!(unit.is_empty());
}

#[test]
fn tombstone_seen_first_still_reports_the_vanished_case() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-7", Department::Medical).expect("unit");

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    svc.remove(id).expect("remove");
    unit.pump(&svc).expect("pump");
    assert!(unit.get(id).is_none());

    let outcome = svc.transition(id, &request.transition);
    assert!(matches!(
        unit.complete(&svc, request, outcome),
        Settlement::Vanished(_)
    ));
    let kinds: Vec<_> = unit.drain_notices().into_iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NoticeKind::CaseVanished]);
}

#[test]
fn broadcast_wins_over_a_late_failed_response() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut slow = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("slow");
    let mut fast = FieldUnitAgent::open(&svc, "Medic-2", Department::Medical).expect("fast");

    let request = slow.begin(id, Transition::BeginTravel).expect("begin");
    assert_eq!(slow.get(id).unwrap().status, IncidentStatus::EnRoute);

    // A second unit gets there first and the broadcasts reach the slow unit.
    fast.begin_travel(&svc, id).expect("travel");
    fast.arrive(&svc, id).expect("arrive");
    slow.pump(&svc).expect("pump");
    assert_eq!(slow.get(id).unwrap().status, IncidentStatus::OnScene);
    assert!(!slow.is_pending(id));

    let outcome = svc.transition(id, &request.transition);
    assert_eq!(
        outcome.as_ref().unwrap_err().kind,
        ErrorKind::InvalidTransition
    );
    assert_eq!(slow.complete(&svc, request, outcome), Settlement::Superseded);
    assert_eq!(slow.get(id).unwrap().status, IncidentStatus::OnScene);

    let notices = slow.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::ActionFailed);
}

#[test]
fn broadcast_wins_over_a_late_successful_response() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("unit");

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    let outcome = svc.transition(id, &request.transition);
    let en_route = outcome.clone().expect("travel committed");
    // Someone else advances the case before the response is processed.
    let on_scene = svc.transition(id, &Transition::Arrive).expect("arrive");

    unit.pump(&svc).expect("pump");
    assert_eq!(unit.get(id), Some(&on_scene));

    assert_eq!(unit.complete(&svc, request, outcome), Settlement::Superseded);
    assert_eq!(unit.get(id), Some(&on_scene));
    assert!(en_route.revision < on_scene.revision);
    assert!(unit.drain_notices().is_empty());
}

#[test]
fn rejected_intent_rolls_back_to_the_pre_intent_value() {
    let svc = service(64);
    let rec = svc
        .submit_incident(medical_report("routine checkup request"))
        .expect("submit");
    let mut first = DashboardAgent::open(&svc).expect("first");
    let mut second = DashboardAgent::open(&svc).expect("second");

    let request = first
        .begin(
            rec.id,
            Transition::Retriage {
                severity: Some(Severity::Fake),
                category: None,
            },
        )
        .expect("begin");
    assert_eq!(
        first.get(rec.id).unwrap().severity,
        Severity::Fake
    );

    second
        .dispatch(&svc, rec.id, Department::Medical, None)
        .expect("dispatch");

    let outcome = svc.transition(rec.id, &request.transition);
    let settlement = first.complete(&svc, request, outcome);
    match settlement {
        Settlement::RolledBack(err) => assert_eq!(err.kind, ErrorKind::InvalidTransition),
        other => panic!("expected rollback, got {other:?}"),
    }
    assert_eq!(first.get(rec.id), Some(&rec));

    let notices = first.drain_notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::ActionFailed);
    assert!(notices[0].retryable);
    assert_eq!(
        notices[0].code.as_deref(),
        Some("LIFECYCLE_INVALID_TRANSITION")
    );

    // The authoritative dispatch then arrives through the feed.
    first.pump(&svc).expect("pump");
    assert_eq!(first.get(rec.id).unwrap().status, IncidentStatus::Assigned);
}

#[test]
fn second_intent_on_the_same_case_waits_for_the_first() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("unit");

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    let err = unit.begin(id, Transition::Arrive).unwrap_err();
    assert_eq!(err.code, "SYNC_INTENT_IN_FLIGHT");

    let outcome = svc.transition(id, &request.transition);
    assert_eq!(unit.complete(&svc, request, outcome), Settlement::Confirmed);
    assert_eq!(unit.arrive(&svc, id).expect("arrive"), Settlement::Confirmed);
    assert_eq!(unit.get(id).unwrap().status, IncidentStatus::OnScene);
}

#[test]
fn abandoned_view_still_reconciles_the_response() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("unit");
    assert!(unit.open_mission(id));

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    unit.close_mission();
    let outcome = svc.transition(id, &request.transition);
    assert_eq!(unit.complete(&svc, request, outcome), Settlement::Confirmed);
    assert_eq!(unit.get(id).unwrap().status, IncidentStatus::EnRoute);
    assert!(unit.active_mission().is_none());
}

#[test]
fn late_response_cannot_restore_a_case_deleted_before_resync() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("unit");

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    let outcome = svc.transition(id, &request.transition);
    assert!(outcome.is_ok());
    svc.remove(id).expect("remove");
    unit.resync(&svc).expect("resync");
    assert!(unit.get(id).is_none());

    assert!(matches!(
        unit.complete(&svc, request, outcome),
        Settlement::Vanished(_)
    ));
    assert!(unit.get(id).is_none());
    let kinds: Vec<_> = unit.drain_notices().into_iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NoticeKind::CaseVanished]);

    unit.pump(&svc).expect("pump");
    assert!(unit.get(id).is_none());
}

#[test]
fn late_response_cannot_reopen_a_case_resolved_before_resync() {
    let svc = service(64);
    let id = assigned_case(&svc);
    let mut unit = FieldUnitAgent::open(&svc, "Medic-1", Department::Medical).expect("unit");

    let request = unit.begin(id, Transition::BeginTravel).expect("begin");
    let outcome = svc.transition(id, &request.transition);
    svc.transition(id, &Transition::Arrive).expect("arrive");
    svc.transition(
        id,
        &Transition::Resolve {
            report: "Patient transported".to_string(),
            resolved_by: "Medic-2".to_string(),
        },
    )
    .expect("resolve");
    unit.resync(&svc).expect("resync");

    assert_eq!(
        unit.complete(&svc, request, outcome),
        Settlement::Superseded
    );
    assert!(unit.get(id).is_none(), "resolved case is out of the task list");
    assert_eq!(
        svc.get_incident(id).unwrap().status,
        IncidentStatus::Resolved
    );
    assert!(unit.drain_notices().is_empty());

    unit.pump(&svc).expect("pump");
    assert!(unit.get(id).is_none());
}

#[test]
fn lagging_session_rebuilds_its_view() {
    let svc = service(2);
    let mut dashboard = DashboardAgent::open(&svc).expect("dashboard");
    for n in 0..5 {
        svc.submit_incident(medical_report(&format!("report {n}")))
            .expect("submit");
    }

    dashboard.pump(&svc).expect("pump");
    assert_eq!(dashboard.len(), 5);
    // Cases that arrived while the session was behind are still new to it.
    assert_eq!(dashboard.unread(), 5);
    let kinds: Vec<_> = dashboard
        .drain_notices()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(kinds, vec![NoticeKind::FeedLagged]);
}

#[test]
fn closed_feed_is_reported_as_disconnect() {
    let svc = service(8);
    let mut dashboard = DashboardAgent::open(&svc).expect("dashboard");
    drop(svc);

    let standby = service(8);
    assert_eq!(dashboard.pump(&standby).expect("pump"), 0);
    assert!(!dashboard.is_connected());
    let kinds: Vec<_> = dashboard
        .drain_notices()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert_eq!(kinds, vec![NoticeKind::Disconnected]);
}
