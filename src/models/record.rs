use serde::{Deserialize, Serialize};

use super::enums::RecordKind;
use super::*;

/// A stored record of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Doctor(Doctor),
    Patient(Patient),
    DoctorPatient(DoctorPatient),
    Prescription(Prescription),
    Visit(Visit),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Doctor(_) => RecordKind::Doctor,
            Record::Patient(_) => RecordKind::Patient,
            Record::DoctorPatient(_) => RecordKind::DoctorPatient,
            Record::Prescription(_) => RecordKind::Prescription,
            Record::Visit(_) => RecordKind::Visit,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Doctor(r) => &r.id,
            Record::Patient(r) => &r.id,
            Record::DoctorPatient(r) => &r.id,
            Record::Prescription(r) => &r.id,
            Record::Visit(r) => &r.id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            Record::Doctor(r) => r.version,
            Record::Patient(r) => r.version,
            Record::DoctorPatient(r) => r.version,
            Record::Prescription(r) => r.version,
            Record::Visit(r) => r.version,
        }
    }

    /// Parent records this record points at, as (kind, id) pairs.
    pub fn references(&self) -> Vec<(RecordKind, &str)> {
        match self {
            Record::Doctor(_) | Record::Patient(_) => Vec::new(),
            Record::DoctorPatient(r) => vec![
                (RecordKind::Doctor, r.doctor_id.as_str()),
                (RecordKind::Patient, r.patient_id.as_str()),
            ],
            Record::Prescription(r) => vec![
                (RecordKind::Doctor, r.doctor_id.as_str()),
                (RecordKind::Patient, r.patient_id.as_str()),
            ],
            Record::Visit(r) => {
                let mut refs = vec![
                    (RecordKind::Doctor, r.doctor_id.as_str()),
                    (RecordKind::Patient, r.patient_id.as_str()),
                ];
                if let Some(prescription_id) = &r.prescription_id {
                    refs.push((RecordKind::Prescription, prescription_id.as_str()));
                }
                refs
            }
        }
    }
}

macro_rules! record_variant {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Record {
                fn from(r: $variant) -> Self {
                    Record::$variant(r)
                }
            }

            impl TryFrom<Record> for $variant {
                type Error = Record;

                fn try_from(record: Record) -> Result<Self, Record> {
                    match record {
                        Record::$variant(r) => Ok(r),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

record_variant!(Doctor, Patient, DoctorPatient, Prescription, Visit);

/// Create input for any kind. Creating a `DoctorPatient` is a link and is
/// idempotent on the (doctor, patient) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NewRecord {
    Doctor(NewDoctor),
    Patient(NewPatient),
    DoctorPatient(NewDoctorPatient),
    Prescription(NewPrescription),
    Visit(NewVisit),
}

impl NewRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            NewRecord::Doctor(_) => RecordKind::Doctor,
            NewRecord::Patient(_) => RecordKind::Patient,
            NewRecord::DoctorPatient(_) => RecordKind::DoctorPatient,
            NewRecord::Prescription(_) => RecordKind::Prescription,
            NewRecord::Visit(_) => RecordKind::Visit,
        }
    }
}

/// Patch for any kind with editable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordUpdate {
    Doctor(DoctorUpdate),
    Patient(PatientUpdate),
    Prescription(PrescriptionUpdate),
    Visit(VisitUpdate),
}

impl RecordUpdate {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordUpdate::Doctor(_) => RecordKind::Doctor,
            RecordUpdate::Patient(_) => RecordKind::Patient,
            RecordUpdate::Prescription(_) => RecordKind::Prescription,
            RecordUpdate::Visit(_) => RecordKind::Visit,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RecordUpdate::Doctor(u) => &u.id,
            RecordUpdate::Patient(u) => &u.id,
            RecordUpdate::Prescription(u) => &u.id,
            RecordUpdate::Visit(u) => &u.id,
        }
    }

    pub fn expected_version(&self) -> Option<i64> {
        match self {
            RecordUpdate::Doctor(u) => u.expected_version,
            RecordUpdate::Patient(u) => u.expected_version,
            RecordUpdate::Prescription(u) => u.expected_version,
            RecordUpdate::Visit(u) => u.expected_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn visit_references_include_prescription_only_when_set() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut visit = Visit::from_new(
            "v1".into(),
            NewVisit {
                patient_id: "p1".into(),
                doctor_id: "d1".into(),
                prescription_id: None,
                date: now,
                illness: "Flu".into(),
                prescription: "Rest".into(),
            },
            now,
        );
        assert_eq!(Record::from(visit.clone()).references().len(), 2);

        visit.prescription_id = Some("rx1".into());
        let record = Record::from(visit);
        assert_eq!(
            record.references(),
            vec![
                (RecordKind::Doctor, "d1"),
                (RecordKind::Patient, "p1"),
                (RecordKind::Prescription, "rx1"),
            ]
        );
    }

    #[test]
    fn record_serializes_with_kind_tag_and_camel_case_fields() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let doctor = Doctor::from_new(
            "d1".into(),
            NewDoctor {
                name: "A. Rao".into(),
                email: "a@x.com".into(),
                specialization: "Cardiology".into(),
                clinic_name: "Heart Clinic".into(),
                ..Default::default()
            },
            now,
        );
        let json = serde_json::to_value(Record::from(doctor)).unwrap();
        assert_eq!(json["kind"], "doctor");
        assert_eq!(json["clinicName"], "Heart Clinic");
        assert!(json["profilePic"].is_null());
    }

    #[test]
    fn explicit_null_in_update_json_clears_the_field() {
        let clear: VisitUpdate = serde_json::from_str(r#"{"id":"v1","prescriptionId":null}"#).unwrap();
        assert_eq!(clear.prescription_id, Some(None));

        let untouched: VisitUpdate = serde_json::from_str(r#"{"id":"v1"}"#).unwrap();
        assert_eq!(untouched.prescription_id, None);

        let set: VisitUpdate = serde_json::from_str(r#"{"id":"v1","prescriptionId":"rx1"}"#).unwrap();
        assert_eq!(set.prescription_id, Some(Some("rx1".to_string())));
    }

    #[test]
    fn update_json_keeps_clear_distinct_from_unset() {
        let patch = RecordUpdate::Visit(VisitUpdate {
            prescription_id: Some(None),
            ..VisitUpdate::new("v1")
        });
        let json = serde_json::to_value(&patch).unwrap();
        assert!(json["prescriptionId"].is_null());
        assert_eq!(serde_json::from_value::<RecordUpdate>(json).unwrap(), patch);

        let unset = DoctorUpdate::new("d1");
        let json = serde_json::to_value(&unset).unwrap();
        assert!(json.get("profilePic").is_none());
        assert_eq!(serde_json::from_value::<DoctorUpdate>(json).unwrap(), unset);

        let cleared: RecordUpdate =
            serde_json::from_str(r#"{"kind":"doctor","id":"d1","signaturePic":null}"#).unwrap();
        match cleared {
            RecordUpdate::Doctor(u) => {
                assert_eq!(u.signature_pic, Some(None));
                assert_eq!(u.profile_pic, None);
            }
            other => panic!("expected doctor patch, got {other:?}"),
        }
    }

    #[test]
    fn update_apply_leaves_unset_fields() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut doctor = Doctor::from_new(
            "d1".into(),
            NewDoctor {
                name: "A. Rao".into(),
                email: "a@x.com".into(),
                specialization: "Cardiology".into(),
                clinic_name: "Heart Clinic".into(),
                profile_pic: Some("/pics/rao.png".into()),
                signature_pic: None,
            },
            now,
        );
        let patch = DoctorUpdate {
            clinic_name: Some("North Heart Clinic".into()),
            profile_pic: Some(None),
            ..DoctorUpdate::new("d1")
        };
        patch.apply(&mut doctor);
        assert_eq!(doctor.name, "A. Rao");
        assert_eq!(doctor.clinic_name, "North Heart Clinic");
        assert_eq!(doctor.profile_pic, None);
    }
}
