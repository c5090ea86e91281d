use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

use super::stale_write_error;

pub(crate) const PATIENT_COLUMNS: &str = "id, name, age, email, version, created_at, updated_at";

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, age, email, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            patient.id,
            patient.name,
            patient.age,
            patient.email,
            patient.version,
            patient.created_at,
            patient.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &str) -> Result<Option<Patient>, DatabaseError> {
    let patient = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
            params![id],
            patient_from_row,
        )
        .optional()?;
    Ok(patient)
}

pub fn update_patient(
    conn: &Connection,
    patient: &Patient,
    now: DateTime<Utc>,
) -> Result<Patient, DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET name = ?2, age = ?3, email = ?4, version = version + 1, updated_at = ?5
         WHERE id = ?1 AND version = ?6",
        params![
            patient.id,
            patient.name,
            patient.age,
            patient.email,
            now,
            patient.version,
        ],
    )?;
    if changed == 0 {
        return Err(stale_write_error(conn, RecordKind::Patient, &patient.id, patient.version));
    }

    let mut updated = patient.clone();
    updated.version += 1;
    updated.updated_at = now;
    Ok(updated)
}

pub(crate) fn patient_from_row(row: &Row<'_>) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        email: row.get(3)?,
        version: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
