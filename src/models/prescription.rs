use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub date: DateTime<Utc>,
    /// Reference to the stored prescription document.
    pub path: String,
    pub illness: String,
    pub medicine: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrescription {
    pub patient_id: String,
    pub doctor_id: String,
    pub date: DateTime<Utc>,
    pub path: String,
    pub illness: String,
    pub medicine: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionUpdate {
    pub id: String,
    pub expected_version: Option<i64>,
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub illness: Option<String>,
    pub medicine: Option<String>,
}

impl Prescription {
    pub fn from_new(id: String, new: NewPrescription, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            date: new.date,
            path: new.path,
            illness: new.illness,
            medicine: new.medicine,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl PrescriptionUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn apply(&self, prescription: &mut Prescription) {
        if let Some(patient_id) = &self.patient_id {
            prescription.patient_id = patient_id.clone();
        }
        if let Some(doctor_id) = &self.doctor_id {
            prescription.doctor_id = doctor_id.clone();
        }
        if let Some(date) = self.date {
            prescription.date = date;
        }
        if let Some(path) = &self.path {
            prescription.path = path.clone();
        }
        if let Some(illness) = &self.illness {
            prescription.illness = illness.clone();
        }
        if let Some(medicine) = &self.medicine {
            prescription.medicine = medicine.clone();
        }
    }
}
