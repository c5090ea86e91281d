use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Join record for the doctor ↔ patient many-to-many association.
///
/// Join records have no editable fields of their own: they are created by
/// linking and removed by unlinking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPatient {
    pub id: String,
    pub doctor_id: String,
    pub patient_id: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoctorPatient {
    pub doctor_id: String,
    pub patient_id: String,
}

impl DoctorPatient {
    pub fn from_new(id: String, new: NewDoctorPatient, now: DateTime<Utc>) -> Self {
        Self {
            id,
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}
