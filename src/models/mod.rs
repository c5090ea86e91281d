mod api_key;
mod doctor;
mod doctor_patient;
pub mod enums;
mod filters;
mod patient;
mod prescription;
mod record;
mod visit;

pub use api_key::*;
pub use doctor::*;
pub use doctor_patient::*;
pub use filters::*;
pub use patient::*;
pub use prescription::*;
pub use record::*;
pub use visit::*;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at millisecond precision, the resolution timestamps are stored at.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
