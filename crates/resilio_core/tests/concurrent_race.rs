use std::sync::{Arc, Barrier};
use std::thread;

use resilio_core::domain::{Category, Department, GeoPoint, IncidentStatus, ReportSubmission};
use resilio_core::error::ErrorKind;
use resilio_core::fanout::IncidentEvent;
use resilio_core::lifecycle::Transition;
use resilio_core::service::{IncidentApi, IncidentService};
use resilio_core::store::SqliteIncidentStore;

type Service = IncidentService<SqliteIncidentStore>;

fn on_scene(svc: &Service) -> i64 {
    let rec = svc
        .submit_incident(ReportSubmission::new(
            Category::Fire,
            Some("blast at fuel depot"),
            GeoPoint::new(20.29, 85.82),
        ))
        .expect("submit");
    for t in [
        Transition::Dispatch {
            department: Department::Fire,
            severity: None,
        },
        Transition::BeginTravel,
        Transition::Arrive,
    ] {
        svc.transition(rec.id, &t).expect("transition");
    }
    rec.id
}

#[test]
fn resolve_and_remove_race_has_exactly_one_winner() {
    for _ in 0..25 {
        let svc = Arc::new(IncidentService::new(
            SqliteIncidentStore::open_in_memory().expect("store"),
            64,
        ));
        let id = on_scene(&svc);
        let mut sub = svc.subscribe();
        let barrier = Arc::new(Barrier::new(2));

        let resolver = {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.transition(
                    id,
                    &Transition::Resolve {
                        report: "Fire out, area cleared".to_string(),
                        resolved_by: "Unit Alpha-1".to_string(),
                    },
                )
                .map(|_| ())
            })
        };
        let remover = {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.remove(id)
            })
        };

        let resolved = resolver.join().expect("resolver thread");
        let removed = remover.join().expect("remover thread");
        assert!(
            resolved.is_ok() != removed.is_ok(),
            "exactly one intent must win: resolve={resolved:?} remove={removed:?}"
        );

        let mut events = Vec::new();
        while let Some(event) = sub.try_next().expect("feed") {
            events.push(event);
        }
        assert_eq!(events.len(), 1, "one broadcast for the winner: {events:?}");

        match (&resolved, &removed, &events[0]) {
            (Ok(()), Err(err), IncidentEvent::Updated { record }) => {
                // Remove lost: the record was already Resolved when it was evaluated.
                assert_eq!(err.kind, ErrorKind::InvalidTransition);
                assert_eq!(record.status, IncidentStatus::Resolved);
                assert_eq!(svc.get_incident(id).unwrap().status, IncidentStatus::Resolved);
            }
            (Err(err), Ok(()), IncidentEvent::Deleted { id: gone }) => {
                assert_eq!(err.kind, ErrorKind::NotFound);
                assert_eq!(*gone, id);
                assert_eq!(svc.get_incident(id).unwrap_err().kind, ErrorKind::NotFound);
            }
            other => panic!("inconsistent outcome: {other:?}"),
        }
    }
}

#[test]
fn parallel_dispatches_of_one_record_commit_once() {
    let svc = Arc::new(IncidentService::new(
        SqliteIncidentStore::open_in_memory().expect("store"),
        64,
    ));
    let rec = svc
        .submit_incident(ReportSubmission::new(
            Category::Medical,
            None,
            GeoPoint::new(20.30, 85.80),
        ))
        .expect("submit");
    let mut sub = svc.subscribe();

    let departments = [
        Department::Medical,
        Department::Fire,
        Department::Police,
        Department::DisasterManagement,
    ];
    let barrier = Arc::new(Barrier::new(departments.len()));
    let handles: Vec<_> = departments
        .into_iter()
        .map(|department| {
            let svc = Arc::clone(&svc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                svc.transition(
                    rec.id,
                    &Transition::Dispatch {
                        department,
                        severity: None,
                    },
                )
            })
        })
        .collect();

    let outcomes: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();
    let winners: Vec<_> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|o| o.as_ref().err())
        .all(|e| e.kind == ErrorKind::InvalidTransition));

    let stored = svc.get_incident(rec.id).unwrap();
    assert_eq!(&stored, winners[0]);
    assert_eq!(stored.revision, 2);

    let mut events = 0;
    while sub.try_next().expect("feed").is_some() {
        events += 1;
    }
    assert_eq!(events, 1);
}
