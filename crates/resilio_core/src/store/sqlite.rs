use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::db;
use crate::domain::{
    Category, Department, EvidenceRef, GeoPoint, Incident, IncidentFilter, IncidentId,
    IncidentStatus, NewIncident, Resolution, Severity,
};
use crate::error::AppError;
use crate::store::IncidentStore;

const SELECT_COLUMNS: &str = r#"
  SELECT
    id, revision, category, severity, description, lat, lng, evidence_json,
    department, status, created_at, resolution_report, resolved_by, resolved_at
  FROM incidents
"#;

/// SQLite-backed store. One connection behind a mutex; each mutation runs in an
/// `IMMEDIATE` transaction and is guarded by `(id, revision)` so external writers to the same
/// file cannot interleave a lost update.
pub struct SqliteIncidentStore {
    conn: Mutex<Connection>,
}

impl SqliteIncidentStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut conn = db::open(path)?;
        db::migrate(&mut conn)?;
        Ok(Self::from_migrated(conn))
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let mut conn = db::open_in_memory()?;
        db::migrate(&mut conn)?;
        Ok(Self::from_migrated(conn))
    }

    fn from_migrated(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

/// Column values as stored, before label parsing.
struct IncidentRow {
    id: i64,
    revision: i64,
    category: String,
    severity: String,
    description: Option<String>,
    lat: f64,
    lng: f64,
    evidence_json: String,
    department: Option<String>,
    status: String,
    created_at: String,
    resolution_report: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<String>,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRow> {
    Ok(IncidentRow {
        id: row.get(0)?,
        revision: row.get(1)?,
        category: row.get(2)?,
        severity: row.get(3)?,
        description: row.get(4)?,
        lat: row.get(5)?,
        lng: row.get(6)?,
        evidence_json: row.get(7)?,
        department: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        resolution_report: row.get(11)?,
        resolved_by: row.get(12)?,
        resolved_at: row.get(13)?,
    })
}

fn decode_err(id: i64, e: impl std::fmt::Display) -> AppError {
    AppError::store("DB_DECODE_FAILED", "Failed to decode incident row")
        .with_details(format!("id={id}; err={e}"))
        .with_retryable(false)
}

fn parse_ts(id: i64, value: &str) -> Result<OffsetDateTime, AppError> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|e| decode_err(id, e))
}

fn format_ts(ts: OffsetDateTime) -> Result<String, AppError> {
    ts.to_offset(UtcOffset::UTC).format(&Rfc3339).map_err(|e| {
        AppError::store("DB_ENCODE_FAILED", "Failed to format timestamp")
            .with_details(e.to_string())
            .with_retryable(false)
    })
}

impl IncidentRow {
    fn decode(self) -> Result<Incident, AppError> {
        let id = self.id;
        let evidence: Vec<EvidenceRef> =
            serde_json::from_str(&self.evidence_json).map_err(|e| decode_err(id, e))?;

        let resolution = match (self.resolution_report, self.resolved_by, self.resolved_at) {
            (Some(report), Some(resolved_by), Some(resolved_at)) => Some(Resolution {
                report,
                resolved_by,
                resolved_at: parse_ts(id, &resolved_at)?,
            }),
            (None, None, None) => None,
            _ => return Err(decode_err(id, "partial resolution columns")),
        };

        Ok(Incident {
            id,
            revision: self.revision,
            category: self.category.parse::<Category>().map_err(|e| decode_err(id, e))?,
            severity: self.severity.parse::<Severity>().map_err(|e| decode_err(id, e))?,
            description: self.description,
            location: GeoPoint::new(self.lat, self.lng),
            evidence,
            department: self
                .department
                .map(|d| d.parse::<Department>())
                .transpose()
                .map_err(|e| decode_err(id, e))?,
            status: self.status.parse::<IncidentStatus>().map_err(|e| decode_err(id, e))?,
            created_at: parse_ts(id, &self.created_at)?,
            resolution,
        })
    }
}

fn fetch(conn: &Connection, id: IncidentId) -> Result<Option<Incident>, AppError> {
    let row = conn
        .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), [id], read_row)
        .optional()
        .map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to query incident")
                .with_details(e.to_string())
        })?;
    row.map(IncidentRow::decode).transpose()
}

fn not_found(id: IncidentId) -> AppError {
    AppError::not_found("Incident not found").with_details(format!("id={id}"))
}

impl IncidentStore for SqliteIncidentStore {
    fn create(&self, draft: NewIncident) -> Result<Incident, AppError> {
        let evidence_json = serde_json::to_string(&draft.evidence).map_err(|e| {
            AppError::store("DB_ENCODE_FAILED", "Failed to encode evidence references")
                .with_details(e.to_string())
                .with_retryable(false)
        })?;
        let created_at = format_ts(draft.created_at)?;

        let conn = self.conn.lock();
        conn.execute(
            r#"
      INSERT INTO incidents(
        revision, category, severity, description, lat, lng, evidence_json, status, created_at
      ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
            rusqlite::params![
                draft.category.as_str(),
                draft.severity.as_str(),
                draft.description,
                draft.location.lat,
                draft.location.lng,
                evidence_json,
                IncidentStatus::Pending.as_str(),
                created_at,
            ],
        )
        .map_err(|e| {
            AppError::store("DB_WRITE_FAILED", "Failed to create incident")
                .with_details(e.to_string())
        })?;

        let id = conn.last_insert_rowid();
        fetch(&conn, id)?.ok_or_else(|| not_found(id))
    }

    fn get(&self, id: IncidentId) -> Result<Incident, AppError> {
        let conn = self.conn.lock();
        fetch(&conn, id)?.ok_or_else(|| not_found(id))
    }

    fn list(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, AppError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(SELECT_COLUMNS).map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to prepare incidents query")
                .with_details(e.to_string())
        })?;

        let rows = stmt.query_map([], read_row).map_err(|e| {
            AppError::store("DB_QUERY_FAILED", "Failed to query incidents")
                .with_details(e.to_string())
        })?;

        let mut out = Vec::new();
        for r in rows {
            let row = r.map_err(|e| {
                AppError::store("DB_QUERY_FAILED", "Failed to read incident row")
                    .with_details(e.to_string())
            })?;
            let incident = row.decode()?;
            if filter.matches(&incident) {
                out.push(incident);
            }
        }

        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    fn update<F>(&self, id: IncidentId, mutate: F) -> Result<Incident, AppError>
    where
        F: FnOnce(&Incident) -> Result<Incident, AppError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                AppError::store("DB_TX_FAILED", "Failed to start incident update")
                    .with_details(e.to_string())
            })?;

        let current = fetch(&tx, id)?.ok_or_else(|| not_found(id))?;
        let next = mutate(&current)?;
        next.check_invariants()?;

        // Only mutable columns are written; description, location, evidence and created_at
        // keep their stored values whatever the closure returned.
        let (report, resolved_by, resolved_at) = match &next.resolution {
            Some(r) => (
                Some(r.report.as_str()),
                Some(r.resolved_by.as_str()),
                Some(format_ts(r.resolved_at)?),
            ),
            None => (None, None, None),
        };
        let changed = tx
            .execute(
                r#"
      UPDATE incidents
      SET revision = revision + 1, category = ?1, severity = ?2, department = ?3, status = ?4,
          resolution_report = ?5, resolved_by = ?6, resolved_at = ?7
      WHERE id = ?8 AND revision = ?9
      "#,
                rusqlite::params![
                    next.category.as_str(),
                    next.severity.as_str(),
                    next.department.map(|d| d.as_str()),
                    next.status.as_str(),
                    report,
                    resolved_by,
                    resolved_at,
                    id,
                    current.revision,
                ],
            )
            .map_err(|e| {
                AppError::store("DB_WRITE_FAILED", "Failed to update incident")
                    .with_details(e.to_string())
            })?;
        if changed == 0 {
            return Err(AppError::store(
                "DB_WRITE_CONFLICT",
                "Incident changed during update",
            )
            .with_details(format!("id={id}; revision={}", current.revision)));
        }

        let committed = fetch(&tx, id)?.ok_or_else(|| not_found(id))?;
        tx.commit().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to commit incident update")
                .with_details(e.to_string())
        })?;
        Ok(committed)
    }

    fn delete<F>(&self, id: IncidentId, guard: F) -> Result<(), AppError>
    where
        F: FnOnce(&Incident) -> Result<(), AppError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| {
                AppError::store("DB_TX_FAILED", "Failed to start incident delete")
                    .with_details(e.to_string())
            })?;

        let current = fetch(&tx, id)?.ok_or_else(|| not_found(id))?;
        guard(&current)?;

        let changed = tx
            .execute(
                "DELETE FROM incidents WHERE id = ?1 AND revision = ?2",
                rusqlite::params![id, current.revision],
            )
            .map_err(|e| {
                AppError::store("DB_WRITE_FAILED", "Failed to delete incident")
                    .with_details(e.to_string())
            })?;
        if changed == 0 {
            return Err(not_found(id));
        }

        tx.commit().map_err(|e| {
            AppError::store("DB_TX_FAILED", "Failed to commit incident delete")
                .with_details(e.to_string())
        })
    }
}
