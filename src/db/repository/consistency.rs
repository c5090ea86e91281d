use rusqlite::Connection;

use crate::db::DatabaseError;
use super::relation::{add_relation, expected_relations, indexed_relations};

/// A single consistency issue detected by the checker.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ConsistencyIssue {
    pub category: String,
    pub severity: String,
    pub description: String,
    pub record_id: Option<String>,
}

/// Result of comparing the relation index against the stored records.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConsistencyReport {
    pub issues: Vec<ConsistencyIssue>,
    pub relations_checked: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Foreign-key columns, as (child table, child kind, column, parent table).
const REFERENCES: &[(&str, &str, &str, &str)] = &[
    ("doctor_patients", "DoctorPatient", "doctor_id", "doctors"),
    ("doctor_patients", "DoctorPatient", "patient_id", "patients"),
    ("prescriptions", "Prescription", "doctor_id", "doctors"),
    ("prescriptions", "Prescription", "patient_id", "patients"),
    ("visits", "Visit", "doctor_id", "doctors"),
    ("visits", "Visit", "patient_id", "patients"),
    ("visits", "Visit", "prescription_id", "prescriptions"),
];

/// Run a full consistency check across the database.
///
/// Detects:
/// - Relations implied by a foreign key but absent from the index
/// - Index rows with no matching foreign key
/// - Foreign keys pointing at records that no longer exist
pub fn check_consistency(conn: &Connection) -> Result<ConsistencyReport, DatabaseError> {
    let mut issues = Vec::new();
    let expected = expected_relations(conn)?;
    let indexed = indexed_relations(conn)?;

    for missing in expected.difference(&indexed) {
        issues.push(ConsistencyIssue {
            category: "missing_relation".into(),
            severity: "high".into(),
            description: format!(
                "{} {} is not indexed under {} {}",
                missing.child_kind.label(),
                missing.child_id,
                missing.parent_kind.label(),
                missing.parent_id
            ),
            record_id: Some(missing.child_id.clone()),
        });
    }

    for orphan in indexed.difference(&expected) {
        issues.push(ConsistencyIssue {
            category: "orphaned_relation".into(),
            severity: "medium".into(),
            description: format!(
                "Index lists {} {} under {} {} without a matching reference",
                orphan.child_kind.label(),
                orphan.child_id,
                orphan.parent_kind.label(),
                orphan.parent_id
            ),
            record_id: Some(orphan.child_id.clone()),
        });
    }

    for (table, label, column, parent_table) in REFERENCES {
        let mut stmt = conn.prepare(&format!(
            "SELECT c.id, c.{column} FROM {table} c
             WHERE c.{column} IS NOT NULL
             AND NOT EXISTS (SELECT 1 FROM {parent_table} p WHERE p.id = c.{column})"
        ))?;
        let dangling = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        for (id, target) in dangling {
            issues.push(ConsistencyIssue {
                category: "dangling_reference".into(),
                severity: "high".into(),
                description: format!("{label} {id} references missing {column} {target}"),
                record_id: Some(id),
            });
        }
    }

    Ok(ConsistencyReport {
        issues,
        relations_checked: expected.len().max(indexed.len()),
    })
}

/// Rebuild the relation index from the foreign-key columns.
///
/// Returns the number of index rows added or removed.
pub fn rebuild_relations(conn: &Connection) -> Result<usize, DatabaseError> {
    let expected = expected_relations(conn)?;
    let indexed = indexed_relations(conn)?;
    let stale = indexed.difference(&expected).count();
    let missing: Vec<_> = expected.difference(&indexed).cloned().collect();

    if stale == 0 && missing.is_empty() {
        return Ok(0);
    }

    conn.execute("DELETE FROM record_relations", [])?;
    for relation in &expected {
        add_relation(conn, relation)?;
    }

    tracing::info!(added = missing.len(), removed = stale, "Rebuilt relation index");
    Ok(stale + missing.len())
}
