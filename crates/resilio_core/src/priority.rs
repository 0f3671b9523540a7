use serde::{Deserialize, Serialize};

use crate::domain::{Incident, Severity};

/// Dashboard severity filter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "filter", content = "severity", rename_all = "snake_case")]
pub enum SeverityFilter {
    #[default]
    All,
    Only(Severity),
}

impl SeverityFilter {
    pub fn admits(&self, incident: &Incident) -> bool {
        match self {
            SeverityFilter::All => true,
            SeverityFilter::Only(severity) => incident.severity == *severity,
        }
    }
}

/// Display order for the dashboard feed.
///
/// Severity rank descending, then newest first. The sort is stable, so records with equal rank
/// and timestamp keep their input order and repeated calls on the same input agree.
pub fn order<'a, I>(records: I, filter: SeverityFilter) -> Vec<&'a Incident>
where
    I: IntoIterator<Item = &'a Incident>,
{
    let mut out: Vec<&Incident> = records.into_iter().filter(|r| filter.admits(r)).collect();
    out.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then(b.created_at.cmp(&a.created_at))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, GeoPoint, IncidentStatus};
    use time::{Duration, OffsetDateTime};

    fn at(id: i64, severity: Severity, minutes: i64) -> Incident {
        Incident {
            id,
            revision: 1,
            category: Category::Other,
            severity,
            description: None,
            location: GeoPoint::new(0.0, 0.0),
            evidence: Vec::new(),
            department: None,
            status: IncidentStatus::Pending,
            created_at: OffsetDateTime::UNIX_EPOCH + Duration::minutes(minutes),
            resolution: None,
        }
    }

    fn ids(records: &[&Incident]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn severity_first_then_newest() {
        let records = vec![
            at(1, Severity::Minor, 50),
            at(2, Severity::Critical, 10),
            at(3, Severity::Fake, 90),
            at(4, Severity::Critical, 30),
            at(5, Severity::Serious, 5),
        ];
        assert_eq!(ids(&order(&records, SeverityFilter::All)), vec![4, 2, 5, 1, 3]);
    }

    #[test]
    fn filter_keeps_only_matching_tier() {
        let records = vec![
            at(1, Severity::Critical, 1),
            at(2, Severity::Minor, 2),
            at(3, Severity::Critical, 3),
        ];
        let critical = order(&records, SeverityFilter::Only(Severity::Critical));
        assert_eq!(ids(&critical), vec![3, 1]);
        assert!(critical.iter().all(|r| r.severity == Severity::Critical));
        assert!(order(&records, SeverityFilter::Only(Severity::Fake)).is_empty());
    }

    #[test]
    fn equal_keys_are_stable_across_calls() {
        let records = vec![
            at(10, Severity::Serious, 0),
            at(11, Severity::Serious, 0),
            at(12, Severity::Serious, 0),
        ];
        let first = ids(&order(&records, SeverityFilter::All));
        let second = ids(&order(&records, SeverityFilter::All));
        assert_eq!(first, vec![10, 11, 12]);
        assert_eq!(first, second);
    }
}
