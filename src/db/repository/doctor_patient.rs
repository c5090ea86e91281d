use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::*;

pub(crate) const DOCTOR_PATIENT_COLUMNS: &str =
    "id, doctor_id, patient_id, version, created_at, updated_at";

pub fn insert_doctor_patient(conn: &Connection, link: &DoctorPatient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctor_patients (id, doctor_id, patient_id, version, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            link.id,
            link.doctor_id,
            link.patient_id,
            link.version,
            link.created_at,
            link.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_doctor_patient(conn: &Connection, id: &str) -> Result<Option<DoctorPatient>, DatabaseError> {
    let link = conn
        .query_row(
            &format!("SELECT {DOCTOR_PATIENT_COLUMNS} FROM doctor_patients WHERE id = ?1"),
            params![id],
            doctor_patient_from_row,
        )
        .optional()?;
    Ok(link)
}

/// Oldest join record for a (doctor, patient) pair, if any.
pub fn find_doctor_patient(
    conn: &Connection,
    doctor_id: &str,
    patient_id: &str,
) -> Result<Option<DoctorPatient>, DatabaseError> {
    let link = conn
        .query_row(
            &format!(
                "SELECT {DOCTOR_PATIENT_COLUMNS} FROM doctor_patients
                 WHERE doctor_id = ?1 AND patient_id = ?2
                 ORDER BY created_at, id LIMIT 1"
            ),
            params![doctor_id, patient_id],
            doctor_patient_from_row,
        )
        .optional()?;
    Ok(link)
}

/// Ids of every join record for a (doctor, patient) pair.
pub fn doctor_patient_ids_for_pair(
    conn: &Connection,
    doctor_id: &str,
    patient_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM doctor_patients WHERE doctor_id = ?1 AND patient_id = ?2",
    )?;
    let ids = stmt
        .query_map(params![doctor_id, patient_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn doctor_patient_from_row(row: &Row<'_>) -> Result<DoctorPatient, rusqlite::Error> {
    Ok(DoctorPatient {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        version: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
