//! Repository layer: entity-scoped database operations.
//!
//! One sub-module per record kind, plus the relation index, tombstones,
//! API keys and the consistency checker. Kind-generic dispatch lives here.

mod api_key;
mod consistency;
mod doctor;
mod doctor_patient;
mod patient;
mod prescription;
mod relation;
mod tombstone;
mod visit;

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};

use super::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

// Re-export all public items from sub-modules
pub use api_key::*;
pub use consistency::*;
pub use doctor::*;
pub use doctor_patient::*;
pub use patient::*;
pub use prescription::*;
pub use relation::*;
pub use tombstone::*;
pub use visit::*;

pub fn get_record(conn: &Connection, kind: RecordKind, id: &str) -> Result<Option<Record>, DatabaseError> {
    let record = match kind {
        RecordKind::Doctor => get_doctor(conn, id)?.map(Record::Doctor),
        RecordKind::Patient => get_patient(conn, id)?.map(Record::Patient),
        RecordKind::DoctorPatient => get_doctor_patient(conn, id)?.map(Record::DoctorPatient),
        RecordKind::Prescription => get_prescription(conn, id)?.map(Record::Prescription),
        RecordKind::Visit => get_visit(conn, id)?.map(Record::Visit),
    };
    Ok(record)
}

pub fn record_exists(conn: &Connection, kind: RecordKind, id: &str) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", kind.table()),
            params![id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn insert_record(conn: &Connection, record: &Record) -> Result<(), DatabaseError> {
    match record {
        Record::Doctor(r) => insert_doctor(conn, r),
        Record::Patient(r) => insert_patient(conn, r),
        Record::DoctorPatient(r) => insert_doctor_patient(conn, r),
        Record::Prescription(r) => insert_prescription(conn, r),
        Record::Visit(r) => insert_visit(conn, r),
    }
}

/// Persist a modified record. The record's `version` is the one it was read at.
pub fn update_record(conn: &Connection, record: &Record, now: DateTime<Utc>) -> Result<Record, DatabaseError> {
    let updated = match record {
        Record::Doctor(r) => Record::Doctor(update_doctor(conn, r, now)?),
        Record::Patient(r) => Record::Patient(update_patient(conn, r, now)?),
        Record::Prescription(r) => Record::Prescription(update_prescription(conn, r, now)?),
        Record::Visit(r) => Record::Visit(update_visit(conn, r, now)?),
        Record::DoctorPatient(r) => {
            return Err(DatabaseError::ConstraintViolation(format!(
                "DoctorPatient {} has no editable fields",
                r.id
            )))
        }
    };
    Ok(updated)
}

/// Remove a single row. Relations and tombstones are the caller's concern.
pub fn delete_record_row(conn: &Connection, kind: RecordKind, id: &str) -> Result<(), DatabaseError> {
    let deleted = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", kind.table()),
        params![id],
    )?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: kind.label().into(),
            id: id.into(),
        });
    }
    Ok(())
}

/// Map a filter field name (camelCase or column name) to its column.
pub fn column_for(kind: RecordKind, field: &str) -> Option<&'static str> {
    let columns: &[(&str, &'static str)] = match kind {
        RecordKind::Doctor => &[
            ("id", "id"),
            ("name", "name"),
            ("email", "email"),
            ("specialization", "specialization"),
            ("clinicName", "clinic_name"),
            ("profilePic", "profile_pic"),
            ("signaturePic", "signature_pic"),
        ],
        RecordKind::Patient => &[
            ("id", "id"),
            ("name", "name"),
            ("age", "age"),
            ("email", "email"),
        ],
        RecordKind::DoctorPatient => &[
            ("id", "id"),
            ("doctorId", "doctor_id"),
            ("patientId", "patient_id"),
        ],
        RecordKind::Prescription => &[
            ("id", "id"),
            ("patientId", "patient_id"),
            ("doctorId", "doctor_id"),
            ("date", "date"),
            ("path", "path"),
            ("illness", "illness"),
            ("medicine", "medicine"),
        ],
        RecordKind::Visit => &[
            ("id", "id"),
            ("patientId", "patient_id"),
            ("doctorId", "doctor_id"),
            ("prescriptionId", "prescription_id"),
            ("date", "date"),
            ("illness", "illness"),
            ("prescription", "prescription"),
        ],
    };
    columns
        .iter()
        .find(|(name, column)| *name == field || *column == field)
        .map(|(_, column)| *column)
}

/// One page of records matching `filter`, ordered by id, strictly after `after`.
pub fn list_records_page(
    conn: &Connection,
    kind: RecordKind,
    filter: &ListFilter,
    after: Option<&str>,
    limit: usize,
) -> Result<Vec<Record>, DatabaseError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for (field, value) in &filter.equals {
        let column = column_for(kind, field).ok_or_else(|| DatabaseError::UnknownField {
            entity_type: kind.label().into(),
            field: field.clone(),
        })?;
        match value {
            FieldValue::Null => clauses.push(format!("{column} IS NULL")),
            other => {
                clauses.push(format!("{column} = ?"));
                values.push(to_sql_value(other)?);
            }
        }
    }

    if let Some((parent_kind, parent_id)) = &filter.parent {
        clauses.push(
            "id IN (SELECT child_id FROM record_relations
                    WHERE parent_kind = ? AND parent_id = ? AND child_kind = ?)"
                .to_string(),
        );
        values.push(Value::Text(parent_kind.as_str().into()));
        values.push(Value::Text(parent_id.clone()));
        values.push(Value::Text(kind.as_str().into()));
    }

    if let Some(after) = after {
        clauses.push("id > ?".to_string());
        values.push(Value::Text(after.into()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    values.push(Value::Integer(limit as i64));

    let columns = match kind {
        RecordKind::Doctor => DOCTOR_COLUMNS,
        RecordKind::Patient => PATIENT_COLUMNS,
        RecordKind::DoctorPatient => DOCTOR_PATIENT_COLUMNS,
        RecordKind::Prescription => PRESCRIPTION_COLUMNS,
        RecordKind::Visit => VISIT_COLUMNS,
    };
    let sql = format!(
        "SELECT {columns} FROM {} {where_sql} ORDER BY id LIMIT ?",
        kind.table()
    );

    let records = match kind {
        RecordKind::Doctor => query_rows(conn, &sql, &values, doctor_from_row)?
            .into_iter()
            .map(Record::Doctor)
            .collect(),
        RecordKind::Patient => query_rows(conn, &sql, &values, patient_from_row)?
            .into_iter()
            .map(Record::Patient)
            .collect(),
        RecordKind::DoctorPatient => query_rows(conn, &sql, &values, doctor_patient_from_row)?
            .into_iter()
            .map(Record::DoctorPatient)
            .collect(),
        RecordKind::Prescription => query_rows(conn, &sql, &values, prescription_from_row)?
            .into_iter()
            .map(Record::Prescription)
            .collect(),
        RecordKind::Visit => query_rows(conn, &sql, &values, visit_from_row)?
            .into_iter()
            .map(Record::Visit)
            .collect(),
    };
    Ok(records)
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    values: &[Value],
    map: fn(&Row<'_>) -> Result<T, rusqlite::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), map)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Encode a filter value exactly as the column was written.
fn to_sql_value(value: &FieldValue) -> Result<Value, DatabaseError> {
    let output = match value {
        FieldValue::Text(s) => return Ok(Value::Text(s.clone())),
        FieldValue::Null => return Ok(Value::Null),
        FieldValue::Timestamp(ts) => ts.to_sql()?,
    };
    match output {
        ToSqlOutput::Owned(v) => Ok(v),
        ToSqlOutput::Borrowed(v) => Ok(v.into()),
        _ => Err(DatabaseError::ConstraintViolation(
            "unsupported filter value encoding".into(),
        )),
    }
}

/// Explain why a version-guarded write touched no row.
pub(crate) fn stale_write_error(conn: &Connection, kind: RecordKind, id: &str, expected: i64) -> DatabaseError {
    let current = conn
        .query_row(
            &format!("SELECT version FROM {} WHERE id = ?1", kind.table()),
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .optional();
    match current {
        Ok(Some(actual)) => DatabaseError::VersionConflict {
            entity_type: kind.label().into(),
            id: id.into(),
            expected,
            actual,
        },
        Ok(None) => DatabaseError::NotFound {
            entity_type: kind.label().into(),
            id: id.into(),
        },
        Err(e) => e.into(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::TimeZone;

    pub(crate) fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    pub(crate) fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 10, 0, 0).unwrap()
    }

    pub(crate) fn make_doctor(conn: &Connection, id: &str) -> Doctor {
        let doctor = Doctor::from_new(
            id.into(),
            NewDoctor {
                name: format!("Dr. {id}"),
                email: format!("{id}@clinic.test"),
                specialization: "Cardiology".into(),
                clinic_name: "Heart Clinic".into(),
                ..Default::default()
            },
            ts(1),
        );
        insert_doctor(conn, &doctor).unwrap();
        doctor
    }

    pub(crate) fn make_patient(conn: &Connection, id: &str) -> Patient {
        let patient = Patient::from_new(
            id.into(),
            NewPatient {
                name: format!("Patient {id}"),
                age: "45".into(),
                email: format!("{id}@mail.test"),
            },
            ts(1),
        );
        insert_patient(conn, &patient).unwrap();
        patient
    }

    pub(crate) fn make_prescription(conn: &Connection, id: &str, doctor_id: &str, patient_id: &str) -> Prescription {
        let rx = Prescription::from_new(
            id.into(),
            NewPrescription {
                patient_id: patient_id.into(),
                doctor_id: doctor_id.into(),
                date: ts(2),
                path: format!("/docs/{id}"),
                illness: "Hypertension".into(),
                medicine: "Lisinopril".into(),
            },
            ts(2),
        );
        insert_prescription(conn, &rx).unwrap();
        rx
    }

    #[test]
    fn doctor_insert_and_retrieve() {
        let conn = test_db();
        let doctor = make_doctor(&conn, "d1");
        let loaded = get_record(&conn, RecordKind::Doctor, "d1").unwrap().unwrap();
        assert_eq!(loaded, Record::Doctor(doctor));
    }

    #[test]
    fn missing_record_is_none() {
        let conn = test_db();
        assert!(get_record(&conn, RecordKind::Patient, "nope").unwrap().is_none());
        assert!(!record_exists(&conn, RecordKind::Patient, "nope").unwrap());
    }

    #[test]
    fn prescription_timestamp_round_trips() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        let rx = make_prescription(&conn, "rx1", "d1", "p1");
        let loaded = get_prescription(&conn, "rx1").unwrap().unwrap();
        assert_eq!(loaded.date, rx.date);
        assert_eq!(loaded, rx);
    }

    #[test]
    fn update_bumps_version() {
        let conn = test_db();
        let mut patient = make_patient(&conn, "p1");
        patient.age = "46".into();
        let updated = update_patient(&conn, &patient, ts(3)).unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(get_patient(&conn, "p1").unwrap().unwrap().age, "46");
    }

    #[test]
    fn stale_update_is_version_conflict() {
        let conn = test_db();
        let patient = make_patient(&conn, "p1");
        update_patient(&conn, &patient, ts(3)).unwrap();

        let err = update_patient(&conn, &patient, ts(4)).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::VersionConflict { expected: 1, actual: 2, .. }
        ));
    }

    #[test]
    fn update_of_missing_row_is_not_found() {
        let conn = test_db();
        let patient = Patient::from_new("ghost".into(), NewPatient::default(), ts(1));
        let err = update_patient(&conn, &patient, ts(2)).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn doctor_patient_is_not_updatable() {
        let conn = test_db();
        let link = DoctorPatient::from_new(
            "dp1".into(),
            NewDoctorPatient {
                doctor_id: "d1".into(),
                patient_id: "p1".into(),
            },
            ts(1),
        );
        let err = update_record(&conn, &Record::DoctorPatient(link), ts(2)).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
    }

    #[test]
    fn delete_missing_row_is_not_found() {
        let conn = test_db();
        let err = delete_record_row(&conn, RecordKind::Doctor, "nope").unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn column_lookup_accepts_camel_and_snake_case() {
        assert_eq!(column_for(RecordKind::Doctor, "clinicName"), Some("clinic_name"));
        assert_eq!(column_for(RecordKind::Doctor, "clinic_name"), Some("clinic_name"));
        assert_eq!(column_for(RecordKind::Patient, "clinicName"), None);
        assert_eq!(column_for(RecordKind::Patient, "version"), None);
    }

    #[test]
    fn list_filters_by_field_and_pages_by_id() {
        let conn = test_db();
        for id in ["d1", "d2", "d3"] {
            make_doctor(&conn, id);
        }
        let mut other = Doctor::from_new(
            "d4".into(),
            NewDoctor {
                name: "Dr. Osei".into(),
                email: "osei@clinic.test".into(),
                specialization: "Dermatology".into(),
                clinic_name: "Skin Clinic".into(),
                ..Default::default()
            },
            ts(1),
        );
        other.profile_pic = Some("/pics/osei.png".into());
        insert_doctor(&conn, &other).unwrap();

        let cardio = ListFilter::new().field_eq("specialization", "Cardiology");
        let first = list_records_page(&conn, RecordKind::Doctor, &cardio, None, 2).unwrap();
        assert_eq!(first.iter().map(|r| r.id()).collect::<Vec<_>>(), ["d1", "d2"]);
        let rest = list_records_page(&conn, RecordKind::Doctor, &cardio, Some("d2"), 2).unwrap();
        assert_eq!(rest.iter().map(|r| r.id()).collect::<Vec<_>>(), ["d3"]);

        let no_pic = ListFilter::new().field_eq("profilePic", FieldValue::Null);
        let found = list_records_page(&conn, RecordKind::Doctor, &no_pic, None, 10).unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn list_filters_by_timestamp() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        make_prescription(&conn, "rx1", "d1", "p1");

        let on_day = ListFilter::new().field_eq("date", ts(2));
        let found = list_records_page(&conn, RecordKind::Prescription, &on_day, None, 10).unwrap();
        assert_eq!(found.len(), 1);

        let other_day = ListFilter::new().field_eq("date", ts(9));
        let found = list_records_page(&conn, RecordKind::Prescription, &other_day, None, 10).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn list_rejects_unknown_field() {
        let conn = test_db();
        let filter = ListFilter::new().field_eq("salary", "1");
        let err = list_records_page(&conn, RecordKind::Doctor, &filter, None, 10).unwrap_err();
        assert!(matches!(err, DatabaseError::UnknownField { .. }));
    }
}
