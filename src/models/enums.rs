use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(RecordKind {
    Doctor => "doctor",
    Patient => "patient",
    DoctorPatient => "doctor_patient",
    Prescription => "prescription",
    Visit => "visit",
});

str_enum!(Operation {
    Create => "create",
    Read => "read",
    Update => "update",
    Delete => "delete",
    List => "list",
});

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Doctor,
        RecordKind::Patient,
        RecordKind::DoctorPatient,
        RecordKind::Prescription,
        RecordKind::Visit,
    ];

    /// Backing table name.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Doctor => "doctors",
            Self::Patient => "patients",
            Self::DoctorPatient => "doctor_patients",
            Self::Prescription => "prescriptions",
            Self::Visit => "visits",
        }
    }

    /// Schema-facing type name, used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Doctor => "Doctor",
            Self::Patient => "Patient",
            Self::DoctorPatient => "DoctorPatient",
            Self::Prescription => "Prescription",
            Self::Visit => "Visit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn record_kind_round_trip() {
        for (variant, s) in [
            (RecordKind::Doctor, "doctor"),
            (RecordKind::Patient, "patient"),
            (RecordKind::DoctorPatient, "doctor_patient"),
            (RecordKind::Prescription, "prescription"),
            (RecordKind::Visit, "visit"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(RecordKind::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn every_kind_has_its_own_table() {
        let mut tables: Vec<_> = RecordKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), RecordKind::ALL.len());
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(RecordKind::from_str("nurse").is_err());
        assert!(Operation::from_str("upsert").is_err());
        assert!(Operation::from_str("").is_err());
    }
}
