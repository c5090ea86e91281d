use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

use super::stale_write_error;

pub(crate) const PRESCRIPTION_COLUMNS: &str = "id, patient_id, doctor_id, date, path, illness,
    medicine, version, created_at, updated_at";

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, doctor_id, date, path, illness, medicine,
         version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            rx.id,
            rx.patient_id,
            rx.doctor_id,
            rx.date,
            rx.path,
            rx.illness,
            rx.medicine,
            rx.version,
            rx.created_at,
            rx.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &str) -> Result<Option<Prescription>, DatabaseError> {
    let rx = conn
        .query_row(
            &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1"),
            params![id],
            prescription_from_row,
        )
        .optional()?;
    Ok(rx)
}

pub fn update_prescription(
    conn: &Connection,
    rx: &Prescription,
    now: DateTime<Utc>,
) -> Result<Prescription, DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET patient_id = ?2, doctor_id = ?3, date = ?4, path = ?5,
         illness = ?6, medicine = ?7, version = version + 1, updated_at = ?8
         WHERE id = ?1 AND version = ?9",
        params![
            rx.id,
            rx.patient_id,
            rx.doctor_id,
            rx.date,
            rx.path,
            rx.illness,
            rx.medicine,
            now,
            rx.version,
        ],
    )?;
    if changed == 0 {
        return Err(stale_write_error(conn, RecordKind::Prescription, &rx.id, rx.version));
    }

    let mut updated = rx.clone();
    updated.version += 1;
    updated.updated_at = now;
    Ok(updated)
}

pub(crate) fn prescription_from_row(row: &Row<'_>) -> Result<Prescription, rusqlite::Error> {
    Ok(Prescription {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        doctor_id: row.get(2)?,
        date: row.get(3)?,
        path: row.get(4)?,
        illness: row.get(5)?,
        medicine: row.get(6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
