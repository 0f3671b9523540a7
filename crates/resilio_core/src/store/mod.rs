use crate::domain::{Incident, IncidentFilter, IncidentId, NewIncident};
use crate::error::AppError;

pub mod sqlite;

pub use sqlite::SqliteIncidentStore;

/// Durable, key-addressed incident records.
///
/// `update` and `delete` are atomic read-modify-write operations at single-record granularity:
/// the closure sees the value current at write time, and concurrent writers to the same id are
/// serialized. Implementations assign ids that are never reused and bump `revision` on every
/// committed update.
pub trait IncidentStore: Send + Sync {
    fn create(&self, draft: NewIncident) -> Result<Incident, AppError>;

    fn get(&self, id: IncidentId) -> Result<Incident, AppError>;

    /// Records matching `filter`, newest first.
    fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError>;

    fn update<F>(&self, id: IncidentId, mutate: F) -> Result<Incident, AppError>
    where
        F: FnOnce(&Incident) -> Result<Incident, AppError>;

    /// Deletes the record if `guard` accepts its current value.
    fn delete<F>(&self, id: IncidentId, guard: F) -> Result<(), AppError>
    where
        F: FnOnce(&Incident) -> Result<(), AppError>;
}
