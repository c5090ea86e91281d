//! Integrity enforcement for every mutating operation.
//!
//! Required fields must be non-empty, foreign keys must resolve, and a
//! record with dependents may only be deleted as part of a cascade.

use std::collections::HashSet;

use rusqlite::Connection;
use thiserror::Error;

use crate::db::repository::{dependents_of, find_doctor_patient, get_record, record_exists};
use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("{field} references missing {} {id}", .kind.label())]
    Reference {
        field: &'static str,
        kind: RecordKind,
        id: String,
    },

    #[error("{} {id} not found", .kind.label())]
    NotFound { kind: RecordKind, id: String },

    #[error("{} {id} has {count} dependents", .kind.label())]
    HasDependents {
        kind: RecordKind,
        id: String,
        count: usize,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Field-level checks that need no storage access.
pub trait Validate {
    fn validate(&self) -> Result<(), IntegrityError>;
}

fn required(field: &'static str, value: &str) -> Result<(), IntegrityError> {
    if value.trim().is_empty() {
        return Err(IntegrityError::Validation {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

fn required_if_set(field: &'static str, value: &Option<String>) -> Result<(), IntegrityError> {
    match value {
        Some(v) => required(field, v),
        None => Ok(()),
    }
}

fn email(field: &'static str, value: &str) -> Result<(), IntegrityError> {
    required(field, value)?;
    let well_formed = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'));
    if !well_formed {
        return Err(IntegrityError::Validation {
            field,
            reason: format!("'{value}' is not an email address"),
        });
    }
    Ok(())
}

impl Validate for NewDoctor {
    fn validate(&self) -> Result<(), IntegrityError> {
        required("name", &self.name)?;
        email("email", &self.email)?;
        required("specialization", &self.specialization)?;
        required("clinicName", &self.clinic_name)
    }
}

impl Validate for NewPatient {
    fn validate(&self) -> Result<(), IntegrityError> {
        required("name", &self.name)?;
        required("age", &self.age)?;
        email("email", &self.email)
    }
}

impl Validate for NewDoctorPatient {
    fn validate(&self) -> Result<(), IntegrityError> {
        required("doctorId", &self.doctor_id)?;
        required("patientId", &self.patient_id)
    }
}

impl Validate for NewPrescription {
    fn validate(&self) -> Result<(), IntegrityError> {
        required("patientId", &self.patient_id)?;
        required("doctorId", &self.doctor_id)?;
        required("path", &self.path)?;
        required("illness", &self.illness)?;
        required("medicine", &self.medicine)
    }
}

impl Validate for NewVisit {
    fn validate(&self) -> Result<(), IntegrityError> {
        required("patientId", &self.patient_id)?;
        required("doctorId", &self.doctor_id)?;
        required_if_set("prescriptionId", &self.prescription_id)?;
        required("illness", &self.illness)?;
        required("prescription", &self.prescription)
    }
}

impl Validate for NewRecord {
    fn validate(&self) -> Result<(), IntegrityError> {
        match self {
            NewRecord::Doctor(n) => n.validate(),
            NewRecord::Patient(n) => n.validate(),
            NewRecord::DoctorPatient(n) => n.validate(),
            NewRecord::Prescription(n) => n.validate(),
            NewRecord::Visit(n) => n.validate(),
        }
    }
}

impl Validate for DoctorUpdate {
    fn validate(&self) -> Result<(), IntegrityError> {
        required_if_set("name", &self.name)?;
        if let Some(value) = &self.email {
            email("email", value)?;
        }
        required_if_set("specialization", &self.specialization)?;
        required_if_set("clinicName", &self.clinic_name)
    }
}

impl Validate for PatientUpdate {
    fn validate(&self) -> Result<(), IntegrityError> {
        required_if_set("name", &self.name)?;
        required_if_set("age", &self.age)?;
        if let Some(value) = &self.email {
            email("email", value)?;
        }
        Ok(())
    }
}

impl Validate for PrescriptionUpdate {
    fn validate(&self) -> Result<(), IntegrityError> {
        required_if_set("patientId", &self.patient_id)?;
        required_if_set("doctorId", &self.doctor_id)?;
        required_if_set("path", &self.path)?;
        required_if_set("illness", &self.illness)?;
        required_if_set("medicine", &self.medicine)
    }
}

impl Validate for VisitUpdate {
    fn validate(&self) -> Result<(), IntegrityError> {
        required_if_set("patientId", &self.patient_id)?;
        required_if_set("doctorId", &self.doctor_id)?;
        if let Some(prescription_id) = &self.prescription_id {
            required_if_set("prescriptionId", prescription_id)?;
        }
        required_if_set("illness", &self.illness)?;
        required_if_set("prescription", &self.prescription)
    }
}

impl Validate for RecordUpdate {
    fn validate(&self) -> Result<(), IntegrityError> {
        match self {
            RecordUpdate::Doctor(u) => u.validate(),
            RecordUpdate::Patient(u) => u.validate(),
            RecordUpdate::Prescription(u) => u.validate(),
            RecordUpdate::Visit(u) => u.validate(),
        }
    }
}

/// Foreign keys carried by a create input, as (field, kind, id).
fn new_references(new: &NewRecord) -> Vec<(&'static str, RecordKind, &str)> {
    match new {
        NewRecord::Doctor(_) | NewRecord::Patient(_) => Vec::new(),
        NewRecord::DoctorPatient(n) => vec![
            ("doctorId", RecordKind::Doctor, n.doctor_id.as_str()),
            ("patientId", RecordKind::Patient, n.patient_id.as_str()),
        ],
        NewRecord::Prescription(n) => vec![
            ("doctorId", RecordKind::Doctor, n.doctor_id.as_str()),
            ("patientId", RecordKind::Patient, n.patient_id.as_str()),
        ],
        NewRecord::Visit(n) => {
            let mut refs = vec![
                ("doctorId", RecordKind::Doctor, n.doctor_id.as_str()),
                ("patientId", RecordKind::Patient, n.patient_id.as_str()),
            ];
            if let Some(id) = &n.prescription_id {
                refs.push(("prescriptionId", RecordKind::Prescription, id.as_str()));
            }
            refs
        }
    }
}

/// Foreign keys a patch changes. Unchanged keys were checked when written.
fn changed_references(patch: &RecordUpdate) -> Vec<(&'static str, RecordKind, &str)> {
    let mut refs = Vec::new();
    match patch {
        RecordUpdate::Doctor(_) | RecordUpdate::Patient(_) => {}
        RecordUpdate::Prescription(u) => {
            if let Some(id) = &u.doctor_id {
                refs.push(("doctorId", RecordKind::Doctor, id.as_str()));
            }
            if let Some(id) = &u.patient_id {
                refs.push(("patientId", RecordKind::Patient, id.as_str()));
            }
        }
        RecordUpdate::Visit(u) => {
            if let Some(id) = &u.doctor_id {
                refs.push(("doctorId", RecordKind::Doctor, id.as_str()));
            }
            if let Some(id) = &u.patient_id {
                refs.push(("patientId", RecordKind::Patient, id.as_str()));
            }
            if let Some(Some(id)) = &u.prescription_id {
                refs.push(("prescriptionId", RecordKind::Prescription, id.as_str()));
            }
        }
    }
    refs
}

/// Apply a patch of the matching kind to a loaded record.
fn apply_patch(record: &mut Record, patch: &RecordUpdate) -> bool {
    match (record, patch) {
        (Record::Doctor(r), RecordUpdate::Doctor(u)) => u.apply(r),
        (Record::Patient(r), RecordUpdate::Patient(u)) => u.apply(r),
        (Record::Prescription(r), RecordUpdate::Prescription(u)) => u.apply(r),
        (Record::Visit(r), RecordUpdate::Visit(u)) => u.apply(r),
        _ => return false,
    }
    true
}

pub fn check_reference(
    conn: &Connection,
    field: &'static str,
    kind: RecordKind,
    id: &str,
) -> Result<(), IntegrityError> {
    if !record_exists(conn, kind, id)? {
        return Err(IntegrityError::Reference {
            field,
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Gatekeeper between the authorization gate and the record store.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityEnforcer {
    cascade_deletes: bool,
}

impl IntegrityEnforcer {
    pub fn new(cascade_deletes: bool) -> Self {
        Self { cascade_deletes }
    }

    pub fn cascade_deletes(&self) -> bool {
        self.cascade_deletes
    }

    /// Validate a create input and resolve its foreign keys.
    pub fn check_create(&self, conn: &Connection, new: &NewRecord) -> Result<(), IntegrityError> {
        new.validate()?;
        for (field, kind, id) in new_references(new) {
            check_reference(conn, field, kind, id)?;
        }
        Ok(())
    }

    /// Validate a patch against the current row and return the patched record.
    ///
    /// The returned record keeps the version it was read at, so the version
    /// guard in the store rejects it if another writer got there first.
    pub fn check_update(&self, conn: &Connection, patch: &RecordUpdate) -> Result<Record, IntegrityError> {
        patch.validate()?;

        let kind = patch.kind();
        let mut record = get_record(conn, kind, patch.id())?.ok_or_else(|| IntegrityError::NotFound {
            kind,
            id: patch.id().to_string(),
        })?;

        for (field, ref_kind, id) in changed_references(patch) {
            check_reference(conn, field, ref_kind, id)?;
        }

        if !apply_patch(&mut record, patch) {
            return Err(IntegrityError::Validation {
                field: "kind",
                reason: format!("patch does not match {}", kind.label()),
            });
        }
        Ok(record)
    }

    /// Records to remove for deleting `(kind, id)`, children before parents,
    /// ending with the target itself.
    ///
    /// Without cascade, any dependent blocks the delete.
    pub fn plan_delete(
        &self,
        conn: &Connection,
        kind: RecordKind,
        id: &str,
        cascade: Option<bool>,
    ) -> Result<Vec<(RecordKind, String)>, IntegrityError> {
        if !record_exists(conn, kind, id)? {
            return Err(IntegrityError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        let dependents = dependents_of(conn, kind, id)?;
        let cascade = cascade.unwrap_or(self.cascade_deletes);
        if !dependents.is_empty() && !cascade {
            return Err(IntegrityError::HasDependents {
                kind,
                id: id.to_string(),
                count: dependents.len(),
            });
        }

        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        collect_post_order(conn, kind, id.to_string(), &mut visited, &mut plan)?;
        Ok(plan)
    }

    /// Existing join record for a (doctor, patient) pair, if any.
    pub fn find_link(
        &self,
        conn: &Connection,
        doctor_id: &str,
        patient_id: &str,
    ) -> Result<Option<DoctorPatient>, IntegrityError> {
        Ok(find_doctor_patient(conn, doctor_id, patient_id)?)
    }
}

fn collect_post_order(
    conn: &Connection,
    kind: RecordKind,
    id: String,
    visited: &mut HashSet<(RecordKind, String)>,
    plan: &mut Vec<(RecordKind, String)>,
) -> Result<(), IntegrityError> {
    if !visited.insert((kind, id.clone())) {
        return Ok(());
    }
    for (child_kind, child_id) in dependents_of(conn, kind, &id)? {
        collect_post_order(conn, child_kind, child_id, visited, plan)?;
    }
    plan.push((kind, id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::tests::{make_doctor, make_patient, make_prescription, test_db, ts};
    use crate::db::repository::{index_record, insert_visit};

    fn new_doctor() -> NewDoctor {
        NewDoctor {
            name: "A. Rao".into(),
            email: "a@x.com".into(),
            specialization: "Cardiology".into(),
            clinic_name: "Heart Clinic".into(),
            ..Default::default()
        }
    }

    fn indexed_prescription(conn: &Connection, id: &str) -> Prescription {
        let rx = make_prescription(conn, id, "d1", "p1");
        index_record(conn, &Record::Prescription(rx.clone())).unwrap();
        rx
    }

    fn indexed_visit(conn: &Connection, id: &str, prescription_id: Option<&str>) {
        let visit = Visit::from_new(
            id.into(),
            NewVisit {
                patient_id: "p1".into(),
                doctor_id: "d1".into(),
                prescription_id: prescription_id.map(String::from),
                date: ts(3),
                illness: "Hypertension".into(),
                prescription: "Continue Lisinopril".into(),
            },
            ts(3),
        );
        insert_visit(conn, &visit).unwrap();
        index_record(conn, &Record::Visit(visit)).unwrap();
    }

    #[test]
    fn complete_doctor_passes_validation() {
        assert!(new_doctor().validate().is_ok());
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let doctor = NewDoctor {
            clinic_name: "   ".into(),
            ..new_doctor()
        };
        let err = doctor.validate().unwrap_err();
        assert!(matches!(err, IntegrityError::Validation { field: "clinicName", .. }));
    }

    #[test]
    fn malformed_email_is_rejected() {
        for bad in ["jlee", "@x.com", "j@", "j@x@y"] {
            let patient = NewPatient {
                name: "J. Lee".into(),
                age: "45".into(),
                email: bad.into(),
            };
            assert!(
                matches!(patient.validate(), Err(IntegrityError::Validation { field: "email", .. })),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn patch_with_empty_field_is_rejected() {
        let patch = PatientUpdate {
            name: Some(String::new()),
            ..PatientUpdate::new("p1")
        };
        assert!(patch.validate().is_err());
        assert!(PatientUpdate::new("p1").validate().is_ok());
    }

    #[test]
    fn create_with_dangling_doctor_is_reference_error() {
        let conn = test_db();
        make_patient(&conn, "p1");
        let new = NewRecord::Prescription(NewPrescription {
            patient_id: "p1".into(),
            doctor_id: "d-missing".into(),
            date: ts(2),
            path: "/docs/1".into(),
            illness: "Hypertension".into(),
            medicine: "Lisinopril".into(),
        });
        let err = IntegrityEnforcer::default().check_create(&conn, &new).unwrap_err();
        assert!(matches!(
            err,
            IntegrityError::Reference { field: "doctorId", kind: RecordKind::Doctor, .. }
        ));
    }

    #[test]
    fn visit_without_prescription_is_accepted() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        let new = NewRecord::Visit(NewVisit {
            patient_id: "p1".into(),
            doctor_id: "d1".into(),
            prescription_id: None,
            date: ts(3),
            illness: "Cold".into(),
            prescription: "Rest".into(),
        });
        assert!(IntegrityEnforcer::default().check_create(&conn, &new).is_ok());
    }

    #[test]
    fn update_of_missing_record_is_not_found() {
        let conn = test_db();
        let patch = RecordUpdate::Patient(PatientUpdate {
            age: Some("46".into()),
            ..PatientUpdate::new("ghost")
        });
        let err = IntegrityEnforcer::default().check_update(&conn, &patch).unwrap_err();
        assert!(matches!(err, IntegrityError::NotFound { kind: RecordKind::Patient, .. }));
    }

    #[test]
    fn update_checks_only_changed_references() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        indexed_prescription(&conn, "rx1");

        let enforcer = IntegrityEnforcer::default();
        let ok = RecordUpdate::Prescription(PrescriptionUpdate {
            medicine: Some("Amlodipine".into()),
            ..PrescriptionUpdate::new("rx1")
        });
        match enforcer.check_update(&conn, &ok).unwrap() {
            Record::Prescription(rx) => {
                assert_eq!(rx.medicine, "Amlodipine");
                assert_eq!(rx.version, 1);
            }
            other => panic!("unexpected record {other:?}"),
        }

        let dangling = RecordUpdate::Prescription(PrescriptionUpdate {
            doctor_id: Some("d-missing".into()),
            ..PrescriptionUpdate::new("rx1")
        });
        assert!(matches!(
            enforcer.check_update(&conn, &dangling),
            Err(IntegrityError::Reference { .. })
        ));
    }

    #[test]
    fn delete_with_dependents_is_blocked_without_cascade() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        indexed_prescription(&conn, "rx1");

        let err = IntegrityEnforcer::new(false)
            .plan_delete(&conn, RecordKind::Doctor, "d1", None)
            .unwrap_err();
        assert!(matches!(err, IntegrityError::HasDependents { count: 1, .. }));
    }

    #[test]
    fn cascade_plan_orders_children_first() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        indexed_prescription(&conn, "rx1");
        indexed_visit(&conn, "v1", Some("rx1"));

        let plan = IntegrityEnforcer::new(true)
            .plan_delete(&conn, RecordKind::Patient, "p1", None)
            .unwrap();
        let position = |kind: RecordKind, id: &str| {
            plan.iter()
                .position(|(k, i)| *k == kind && i == id)
                .unwrap()
        };
        assert_eq!(plan.len(), 3);
        assert!(position(RecordKind::Visit, "v1") < position(RecordKind::Prescription, "rx1"));
        assert_eq!(plan.last(), Some(&(RecordKind::Patient, "p1".to_string())));
    }

    #[test]
    fn explicit_cascade_overrides_config() {
        let conn = test_db();
        make_doctor(&conn, "d1");
        make_patient(&conn, "p1");
        indexed_prescription(&conn, "rx1");

        let enforcer = IntegrityEnforcer::new(true);
        assert!(enforcer
            .plan_delete(&conn, RecordKind::Doctor, "d1", Some(false))
            .is_err());
        let plan = IntegrityEnforcer::new(false)
            .plan_delete(&conn, RecordKind::Doctor, "d1", Some(true))
            .unwrap();
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn delete_of_missing_record_is_not_found() {
        let conn = test_db();
        let err = IntegrityEnforcer::default()
            .plan_delete(&conn, RecordKind::Visit, "v-missing", None)
            .unwrap_err();
        assert!(matches!(err, IntegrityError::NotFound { .. }));
    }
}
