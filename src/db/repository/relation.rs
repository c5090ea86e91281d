//! Relation index: parent record -> dependent child records.
//!
//! Rows are derived from the foreign-key columns of join, prescription and
//! visit records and written in the same transaction as the record itself.

use std::collections::BTreeSet;
use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;
use crate::models::*;

/// One edge of the relation index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct Relation {
    pub parent_kind: RecordKind,
    pub parent_id: String,
    pub child_kind: RecordKind,
    pub child_id: String,
}

pub fn add_relation(conn: &Connection, relation: &Relation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO record_relations (parent_kind, parent_id, child_kind, child_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            relation.parent_kind.as_str(),
            relation.parent_id,
            relation.child_kind.as_str(),
            relation.child_id,
        ],
    )?;
    Ok(())
}

/// Relations a record should have, one per foreign key it holds.
pub fn relations_for(record: &Record) -> Vec<Relation> {
    record
        .references()
        .into_iter()
        .map(|(parent_kind, parent_id)| Relation {
            parent_kind,
            parent_id: parent_id.to_string(),
            child_kind: record.kind(),
            child_id: record.id().to_string(),
        })
        .collect()
}

pub fn index_record(conn: &Connection, record: &Record) -> Result<(), DatabaseError> {
    for relation in relations_for(record) {
        add_relation(conn, &relation)?;
    }
    Ok(())
}

/// Drop every relation where the record is the child.
pub fn unindex_record(conn: &Connection, kind: RecordKind, id: &str) -> Result<usize, DatabaseError> {
    let removed = conn.execute(
        "DELETE FROM record_relations WHERE child_kind = ?1 AND child_id = ?2",
        params![kind.as_str(), id],
    )?;
    Ok(removed)
}

/// Replace a record's relations after its foreign keys changed.
pub fn reindex_record(conn: &Connection, record: &Record) -> Result<(), DatabaseError> {
    unindex_record(conn, record.kind(), record.id())?;
    index_record(conn, record)
}

pub fn children_of(
    conn: &Connection,
    parent_kind: RecordKind,
    parent_id: &str,
    child_kind: RecordKind,
) -> Result<BTreeSet<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT child_id FROM record_relations
         WHERE parent_kind = ?1 AND parent_id = ?2 AND child_kind = ?3",
    )?;
    let ids = stmt
        .query_map(
            params![parent_kind.as_str(), parent_id, child_kind.as_str()],
            |row| row.get::<_, String>(0),
        )?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}

/// Every direct dependent of a parent record, of any kind.
pub fn dependents_of(
    conn: &Connection,
    parent_kind: RecordKind,
    parent_id: &str,
) -> Result<Vec<(RecordKind, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT child_kind, child_id FROM record_relations
         WHERE parent_kind = ?1 AND parent_id = ?2
         ORDER BY child_kind, child_id",
    )?;
    let rows = stmt
        .query_map(params![parent_kind.as_str(), parent_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(kind, id)| Ok((RecordKind::from_str(&kind)?, id)))
        .collect()
}

/// The full index as stored.
pub fn indexed_relations(conn: &Connection) -> Result<BTreeSet<Relation>, DatabaseError> {
    collect_relations(
        conn,
        "SELECT parent_kind, parent_id, child_kind, child_id FROM record_relations",
    )
}

/// The index as it should be, derived from the foreign-key columns.
pub fn expected_relations(conn: &Connection) -> Result<BTreeSet<Relation>, DatabaseError> {
    collect_relations(
        conn,
        "SELECT 'doctor', doctor_id, 'doctor_patient', id FROM doctor_patients
         UNION ALL SELECT 'patient', patient_id, 'doctor_patient', id FROM doctor_patients
         UNION ALL SELECT 'doctor', doctor_id, 'prescription', id FROM prescriptions
         UNION ALL SELECT 'patient', patient_id, 'prescription', id FROM prescriptions
         UNION ALL SELECT 'doctor', doctor_id, 'visit', id FROM visits
         UNION ALL SELECT 'patient', patient_id, 'visit', id FROM visits
         UNION ALL SELECT 'prescription', prescription_id, 'visit', id FROM visits
                   WHERE prescription_id IS NOT NULL",
    )
}

fn collect_relations(conn: &Connection, sql: &str) -> Result<BTreeSet<Relation>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(parent_kind, parent_id, child_kind, child_id)| {
            Ok(Relation {
                parent_kind: RecordKind::from_str(&parent_kind)?,
                parent_id,
                child_kind: RecordKind::from_str(&child_kind)?,
                child_id,
            })
        })
        .collect()
}
