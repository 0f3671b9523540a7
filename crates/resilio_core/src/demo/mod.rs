use crate::domain::{Category, EvidenceKind, GeoPoint, Incident, ReportSubmission};
use crate::error::AppError;
use crate::service::IncidentApi;

fn demo_reports() -> Vec<ReportSubmission> {
    // Deterministic set around Bhubaneswar covering every severity rule.
    vec![
        ReportSubmission::new(
            Category::Fire,
            Some("Major fire reported at commercial complex. High smoke density."),
            GeoPoint::new(20.2961, 85.8245),
        )
        .with_evidence(EvidenceKind::Image, "/uploads/demo-complex-fire.jpg"),
        ReportSubmission::new(
            Category::Medical,
            Some("Road accident reported near the station."),
            GeoPoint::new(20.3010, 85.8100),
        ),
        ReportSubmission::new(
            Category::Medical,
            Some("Elderly resident feeling dizzy, requests a checkup."),
            GeoPoint::new(20.2700, 85.8400),
        )
        .with_evidence(EvidenceKind::Audio, "/uploads/demo-voice-note.webm"),
        ReportSubmission::new(
            Category::Disaster,
            Some("Waterlogging on the ring road after heavy rain."),
            GeoPoint::new(20.3155, 85.8190),
        ),
        ReportSubmission::new(
            Category::Security,
            Some("Suspicious vehicle parked outside the school gate."),
            GeoPoint::new(20.2883, 85.8452),
        ),
        ReportSubmission::new(Category::Other, None, GeoPoint::new(20.2990, 85.8300)),
    ]
}

/// Submit the demo reports through the normal intake path so triage and fan-out both run.
pub fn seed_demo_incidents(api: &dyn IncidentApi) -> Result<Vec<Incident>, AppError> {
    demo_reports()
        .into_iter()
        .map(|report| api.submit_incident(report))
        .collect()
}
