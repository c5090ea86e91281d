use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub email: String,
    pub specialization: String,
    pub clinic_name: String,
    pub profile_pic: Option<String>,
    pub signature_pic: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDoctor {
    pub name: String,
    pub email: String,
    pub specialization: String,
    pub clinic_name: String,
    pub profile_pic: Option<String>,
    pub signature_pic: Option<String>,
}

/// Field patch for a doctor. `None` leaves a field as is; the picture
/// fields take `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorUpdate {
    pub id: String,
    pub expected_version: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<String>,
    pub clinic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub profile_pic: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "::serde_with::rust::double_option")]
    pub signature_pic: Option<Option<String>>,
}

impl Doctor {
    pub fn from_new(id: String, new: NewDoctor, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            email: new.email,
            specialization: new.specialization,
            clinic_name: new.clinic_name,
            profile_pic: new.profile_pic,
            signature_pic: new.signature_pic,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl DoctorUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn apply(&self, doctor: &mut Doctor) {
        if let Some(name) = &self.name {
            doctor.name = name.clone();
        }
        if let Some(email) = &self.email {
            doctor.email = email.clone();
        }
        if let Some(specialization) = &self.specialization {
            doctor.specialization = specialization.clone();
        }
        if let Some(clinic_name) = &self.clinic_name {
            doctor.clinic_name = clinic_name.clone();
        }
        if let Some(pic) = &self.profile_pic {
            doctor.profile_pic = pic.clone();
        }
        if let Some(pic) = &self.signature_pic {
            doctor.signature_pic = pic.clone();
        }
    }
}
