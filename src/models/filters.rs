use chrono::{DateTime, Utc};

use super::enums::RecordKind;

/// A value a listed field must be equal to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Matches records where an optional field is absent.
    Null,
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// Equality filter for `list`. Field names use the record's serialized
/// (camelCase) names, e.g. `clinicName` or `doctorId`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub equals: Vec<(String, FieldValue)>,
    /// Restrict to children of this parent, resolved through the relation index.
    pub parent: Option<(RecordKind, String)>,
}

impl ListFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn child_of(mut self, parent_kind: RecordKind, parent_id: impl Into<String>) -> Self {
        self.parent = Some((parent_kind, parent_id.into()));
        self
    }
}
