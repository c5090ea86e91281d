use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A consultation. `prescription_id` is a soft reference: a visit may exist
/// without an attached prescription, but when set it must resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub prescription_id: Option<String>,
    pub date: DateTime<Utc>,
    pub illness: String,
    /// Free-text notes on what was prescribed during the visit.
    pub prescription: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisit {
    pub patient_id: String,
    pub doctor_id: String,
    pub prescription_id: Option<String>,
    pub date: DateTime<Utc>,
    pub illness: String,
    pub prescription: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitUpdate {
    pub id: String,
    pub expected_version: Option<i64>,
    pub patient_id: Option<String>,
    pub doctor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub prescription_id: Option<Option<String>>,
    pub date: Option<DateTime<Utc>>,
    pub illness: Option<String>,
    pub prescription: Option<String>,
}

impl Visit {
    pub fn from_new(id: String, new: NewVisit, now: DateTime<Utc>) -> Self {
        Self {
            id,
            patient_id: new.patient_id,
            doctor_id: new.doctor_id,
            prescription_id: new.prescription_id,
            date: new.date,
            illness: new.illness,
            prescription: new.prescription,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl VisitUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn apply(&self, visit: &mut Visit) {
        if let Some(patient_id) = &self.patient_id {
            visit.patient_id = patient_id.clone();
        }
        if let Some(doctor_id) = &self.doctor_id {
            visit.doctor_id = doctor_id.clone();
        }
        if let Some(prescription_id) = &self.prescription_id {
            visit.prescription_id = prescription_id.clone();
        }
        if let Some(date) = self.date {
            visit.date = date;
        }
        if let Some(illness) = &self.illness {
            visit.illness = illness.clone();
        }
        if let Some(prescription) = &self.prescription {
            visit.prescription = prescription.clone();
        }
    }
}
