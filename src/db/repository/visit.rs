use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

use super::stale_write_error;

pub(crate) const VISIT_COLUMNS: &str = "id, patient_id, doctor_id, prescription_id, date, illness,
    prescription, version, created_at, updated_at";

pub fn insert_visit(conn: &Connection, visit: &Visit) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visits (id, patient_id, doctor_id, prescription_id, date, illness,
         prescription, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            visit.id,
            visit.patient_id,
            visit.doctor_id,
            visit.prescription_id,
            visit.date,
            visit.illness,
            visit.prescription,
            visit.version,
            visit.created_at,
            visit.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_visit(conn: &Connection, id: &str) -> Result<Option<Visit>, DatabaseError> {
    let visit = conn
        .query_row(
            &format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?1"),
            params![id],
            visit_from_row,
        )
        .optional()?;
    Ok(visit)
}

pub fn update_visit(
    conn: &Connection,
    visit: &Visit,
    now: DateTime<Utc>,
) -> Result<Visit, DatabaseError> {
    let changed = conn.execute(
        "UPDATE visits SET patient_id = ?2, doctor_id = ?3, prescription_id = ?4, date = ?5,
         illness = ?6, prescription = ?7, version = version + 1, updated_at = ?8
         WHERE id = ?1 AND version = ?9",
        params![
            visit.id,
            visit.patient_id,
            visit.doctor_id,
            visit.prescription_id,
            visit.date,
            visit.illness,
            visit.prescription,
            now,
            visit.version,
        ],
    )?;
    if changed == 0 {
        return Err(stale_write_error(conn, RecordKind::Visit, &visit.id, visit.version));
    }

    let mut updated = visit.clone();
    updated.version += 1;
    updated.updated_at = now;
    Ok(updated)
}

pub(crate) fn visit_from_row(row: &Row<'_>) -> Result<Visit, rusqlite::Error> {
    Ok(Visit {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        prescription_id: row.get(3)?,
        date: row.get(4)?,
        illness: row.get(5)?,
        prescription: row.get(6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
