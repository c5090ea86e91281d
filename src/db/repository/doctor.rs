use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

use super::stale_write_error;

pub(crate) const DOCTOR_COLUMNS: &str = "id, name, email, specialization, clinic_name,
    profile_pic, signature_pic, version, created_at, updated_at";

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, name, email, specialization, clinic_name, profile_pic,
         signature_pic, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            doctor.id,
            doctor.name,
            doctor.email,
            doctor.specialization,
            doctor.clinic_name,
            doctor.profile_pic,
            doctor.signature_pic,
            doctor.version,
            doctor.created_at,
            doctor.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &str) -> Result<Option<Doctor>, DatabaseError> {
    let doctor = conn
        .query_row(
            &format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = ?1"),
            params![id],
            doctor_from_row,
        )
        .optional()?;
    Ok(doctor)
}

/// Write every field of `doctor` and bump its version.
///
/// The row must still be at `doctor.version`; otherwise the write is
/// rejected with `VersionConflict` (or `NotFound` if the row is gone).
pub fn update_doctor(
    conn: &Connection,
    doctor: &Doctor,
    now: DateTime<Utc>,
) -> Result<Doctor, DatabaseError> {
    let changed = conn.execute(
        "UPDATE doctors SET name = ?2, email = ?3, specialization = ?4, clinic_name = ?5,
         profile_pic = ?6, signature_pic = ?7, version = version + 1, updated_at = ?8
         WHERE id = ?1 AND version = ?9",
        params![
            doctor.id,
            doctor.name,
            doctor.email,
            doctor.specialization,
            doctor.clinic_name,
            doctor.profile_pic,
            doctor.signature_pic,
            now,
            doctor.version,
        ],
    )?;
    if changed == 0 {
        return Err(stale_write_error(conn, RecordKind::Doctor, &doctor.id, doctor.version));
    }

    let mut updated = doctor.clone();
    updated.version += 1;
    updated.updated_at = now;
    Ok(updated)
}

pub(crate) fn doctor_from_row(row: &Row<'_>) -> Result<Doctor, rusqlite::Error> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        specialization: row.get(3)?,
        clinic_name: row.get(4)?,
        profile_pic: row.get(5)?,
        signature_pic: row.get(6)?,
        version: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
