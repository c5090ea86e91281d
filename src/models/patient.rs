use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A patient. `age` is kept as free text, as it is captured by the intake forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub age: String,
    pub email: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub name: String,
    pub age: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    pub id: String,
    pub expected_version: Option<i64>,
    pub name: Option<String>,
    pub age: Option<String>,
    pub email: Option<String>,
}

impl Patient {
    pub fn from_new(id: String, new: NewPatient, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            age: new.age,
            email: new.email,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl PatientUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn apply(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.clone();
        }
        if let Some(age) = &self.age {
            patient.age = age.clone();
        }
        if let Some(email) = &self.email {
            patient.email = email.clone();
        }
    }
}
