//! Clinical records store: the CRUDL surface.
//!
//! Every call runs Authorization Gate -> Integrity Enforcer -> record store
//! and relation index. Each call opens its own connection; mutations run
//! inside one `BEGIN IMMEDIATE` transaction so the record, its index rows
//! and any tombstones commit or roll back together.

mod caller;
mod error;
mod scan;

pub use caller::{CancelToken, Caller};
pub use error::{ConflictReason, ErrorBody, ErrorKind, StoreError};
pub use scan::{RecordScan, LIST_PAGE_SIZE};

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::authorization::{issue_key, AccessPolicy, AuthorizationGate, IssuedApiKey, ValidatedCredential};
use crate::config::{self, StoreConfig};
use crate::db::repository::{self, column_for};
use crate::db::sqlite::{open_connection, open_database};
use crate::integrity::IntegrityEnforcer;
use crate::models::enums::{Operation, RecordKind};
use crate::models::*;

/// Options for `ClinicStore::delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Overrides `StoreConfig::cascade_deletes` for this call.
    pub cascade: Option<bool>,
    /// Refuse the delete unless the record is still at this version.
    pub expected_version: Option<i64>,
}

impl DeleteOptions {
    pub fn cascade() -> Self {
        Self {
            cascade: Some(true),
            ..Self::default()
        }
    }

    pub fn expecting(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// A record removed by a delete, in removal order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeletedRecord {
    pub kind: RecordKind,
    pub id: String,
}

pub struct ClinicStore {
    db_path: PathBuf,
    config: StoreConfig,
    gate: AuthorizationGate,
    enforcer: IntegrityEnforcer,
}

impl ClinicStore {
    /// Open (creating and migrating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Internal(format!("Cannot create {}: {e}", parent.display())))?;
        }
        open_database(&db_path, config.busy_timeout())?;
        tracing::info!(path = %db_path.display(), "Opened clinic store v{}", config::APP_VERSION);

        Ok(Self {
            db_path,
            enforcer: IntegrityEnforcer::new(config.cascade_deletes),
            config,
            gate: AuthorizationGate::default(),
        })
    }

    /// Open the store file inside `dir`.
    pub fn open_in(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        Self::open(dir.as_ref().join(config::DB_FILE_NAME), config)
    }

    /// Open the store at the platform data directory.
    pub fn open_default(config: StoreConfig) -> Result<Self, StoreError> {
        let path = config::default_db_path()
            .ok_or_else(|| StoreError::Internal("Cannot determine data directory".into()))?;
        Self::open(path, config)
    }

    /// Replace the access policy. The default allows any valid key.
    pub fn with_policy(mut self, policy: impl AccessPolicy + 'static) -> Self {
        self.gate = AuthorizationGate::new(policy);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // ═══════════════════════════════════════════════════════════
    // Call plumbing
    // ═══════════════════════════════════════════════════════════

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(open_connection(&self.db_path, self.config.busy_timeout())?)
    }

    fn read<T>(
        &self,
        caller: &Caller,
        operation: Operation,
        kind: RecordKind,
        run: impl FnOnce(&Connection, &ValidatedCredential) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        caller.check_cancelled()?;
        let conn = self.connect()?;
        let credential = self.gate.authorize(&conn, caller.credential(), operation, kind, now())?;
        tracing::debug!(%operation, %kind, key_id = %credential.key_id, "Read");

        // Deferred: every statement of the call reads the same snapshot.
        let tx = conn.unchecked_transaction()?;
        let value = run(&*tx, &credential)?;
        tx.commit()?;
        Ok(value)
    }

    fn write<T>(
        &self,
        caller: &Caller,
        operation: Operation,
        kind: RecordKind,
        apply: impl FnOnce(&Transaction<'_>, &ValidatedCredential, DateTime<Utc>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let result = self.run_write(caller, operation, kind, apply);
        if let Err(e) = &result {
            if !matches!(e, StoreError::Auth(_)) {
                tracing::warn!(%operation, %kind, error = %e, "Write rejected");
            }
        }
        result
    }

    fn run_write<T>(
        &self,
        caller: &Caller,
        operation: Operation,
        kind: RecordKind,
        apply: impl FnOnce(&Transaction<'_>, &ValidatedCredential, DateTime<Utc>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        caller.check_cancelled()?;
        let mut conn = self.connect()?;
        let now = now();
        let credential = self.gate.authorize(&conn, caller.credential(), operation, kind, now)?;

        // Last point a cancel is honoured.
        caller.check_cancelled()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = apply(&tx, &credential, now)?;
        tx.commit()?;
        Ok(value)
    }

    // ═══════════════════════════════════════════════════════════
    // Create
    // ═══════════════════════════════════════════════════════════

    /// Create a record of any kind. A `DoctorPatient` input is a link and
    /// returns the existing join record for the pair if there is one.
    pub fn create(&self, caller: &Caller, new: NewRecord) -> Result<Record, StoreError> {
        if let NewRecord::DoctorPatient(link) = new {
            return self
                .link_doctor_patient(caller, &link.doctor_id, &link.patient_id)
                .map(Record::DoctorPatient);
        }

        let kind = new.kind();
        let record = self.write(caller, Operation::Create, kind, |tx, _, now| {
            self.enforcer.check_create(tx, &new)?;
            let id = assign_id(tx, kind)?;
            let record = build_record(id, new, now);
            repository::insert_record(tx, &record)?;
            repository::index_record(tx, &record)?;
            Ok(record)
        })?;

        tracing::info!(kind = %kind, id = %record.id(), "Created record");
        Ok(record)
    }

    pub fn create_doctor(&self, caller: &Caller, new: NewDoctor) -> Result<Doctor, StoreError> {
        narrow(self.create(caller, NewRecord::Doctor(new))?)
    }

    pub fn create_patient(&self, caller: &Caller, new: NewPatient) -> Result<Patient, StoreError> {
        narrow(self.create(caller, NewRecord::Patient(new))?)
    }

    pub fn create_prescription(&self, caller: &Caller, new: NewPrescription) -> Result<Prescription, StoreError> {
        narrow(self.create(caller, NewRecord::Prescription(new))?)
    }

    pub fn create_visit(&self, caller: &Caller, new: NewVisit) -> Result<Visit, StoreError> {
        narrow(self.create(caller, NewRecord::Visit(new))?)
    }

    /// Link a doctor and a patient. Linking an already linked pair returns
    /// the existing join record.
    pub fn link_doctor_patient(
        &self,
        caller: &Caller,
        doctor_id: &str,
        patient_id: &str,
    ) -> Result<DoctorPatient, StoreError> {
        let new = NewDoctorPatient {
            doctor_id: doctor_id.to_string(),
            patient_id: patient_id.to_string(),
        };
        let (link, created) = self.write(caller, Operation::Create, RecordKind::DoctorPatient, |tx, _, now| {
            let new = NewRecord::DoctorPatient(new);
            self.enforcer.check_create(tx, &new)?;
            if let Some(existing) = self.enforcer.find_link(tx, doctor_id, patient_id)? {
                return Ok((existing, false));
            }

            let id = assign_id(tx, RecordKind::DoctorPatient)?;
            let record = build_record(id, new, now);
            repository::insert_record(tx, &record)?;
            repository::index_record(tx, &record)?;
            Ok((narrow(record)?, true))
        })?;

        if created {
            tracing::info!(id = %link.id, doctor_id, patient_id, "Linked doctor and patient");
        } else {
            tracing::debug!(id = %link.id, doctor_id, patient_id, "Doctor and patient already linked");
        }
        Ok(link)
    }

    /// Remove every join record for the pair. Returns how many were removed.
    pub fn unlink_doctor_patient(&self, caller: &Caller, doctor_id: &str, patient_id: &str) -> Result<usize, StoreError> {
        let removed = self.write(caller, Operation::Delete, RecordKind::DoctorPatient, |tx, _, now| {
            let ids = repository::doctor_patient_ids_for_pair(tx, doctor_id, patient_id)?;
            if ids.is_empty() {
                return Err(StoreError::NotFound {
                    entity: RecordKind::DoctorPatient.label().into(),
                    id: format!("{doctor_id}/{patient_id}"),
                });
            }
            for id in &ids {
                remove_record(tx, RecordKind::DoctorPatient, id, now)?;
            }
            Ok(ids.len())
        })?;

        tracing::info!(doctor_id, patient_id, removed, "Unlinked doctor and patient");
        Ok(removed)
    }

    // ═══════════════════════════════════════════════════════════
    // Read / update / delete / list
    // ═══════════════════════════════════════════════════════════

    pub fn get(&self, caller: &Caller, kind: RecordKind, id: &str) -> Result<Record, StoreError> {
        self.read(caller, Operation::Read, kind, |conn, _| {
            repository::get_record(conn, kind, id)?.ok_or_else(|| not_found(kind, id))
        })
    }

    /// Apply a field patch. With `expected_version` set, a record that has
    /// moved on is a retryable conflict; without it the patch lands on the
    /// latest version.
    pub fn update(&self, caller: &Caller, patch: RecordUpdate) -> Result<Record, StoreError> {
        let kind = patch.kind();
        let updated = self.write(caller, Operation::Update, kind, |tx, _, now| {
            let record = self.enforcer.check_update(tx, &patch)?;
            if let Some(expected) = patch.expected_version() {
                if expected != record.version() {
                    return Err(StoreError::Conflict {
                        entity: kind.label().into(),
                        id: record.id().to_string(),
                        reason: ConflictReason::VersionMismatch {
                            expected,
                            actual: record.version(),
                        },
                    });
                }
            }

            let updated = repository::update_record(tx, &record, now)?;
            repository::reindex_record(tx, &updated)?;
            Ok(updated)
        })?;

        tracing::info!(kind = %kind, id = %updated.id(), version = updated.version(), "Updated record");
        Ok(updated)
    }

    /// Delete a record. Dependents block the delete unless cascading, in
    /// which case they are removed first, children before parents.
    pub fn delete(
        &self,
        caller: &Caller,
        kind: RecordKind,
        id: &str,
        options: DeleteOptions,
    ) -> Result<Vec<DeletedRecord>, StoreError> {
        let removed = self.write(caller, Operation::Delete, kind, |tx, credential, now| {
            if let Some(expected) = options.expected_version {
                let current = repository::get_record(tx, kind, id)?.ok_or_else(|| not_found(kind, id))?;
                if current.version() != expected {
                    return Err(StoreError::Conflict {
                        entity: kind.label().into(),
                        id: id.to_string(),
                        reason: ConflictReason::VersionMismatch {
                            expected,
                            actual: current.version(),
                        },
                    });
                }
            }

            let plan = self.enforcer.plan_delete(tx, kind, id, options.cascade)?;
            let cascaded: HashSet<RecordKind> = plan.iter().map(|(k, _)| *k).filter(|k| *k != kind).collect();
            for cascaded_kind in cascaded {
                self.gate.permit(credential, Operation::Delete, cascaded_kind)?;
            }

            let mut removed = Vec::with_capacity(plan.len());
            for (plan_kind, plan_id) in plan {
                remove_record(tx, plan_kind, &plan_id, now)?;
                removed.push(DeletedRecord {
                    kind: plan_kind,
                    id: plan_id,
                });
            }
            Ok(removed)
        })?;

        tracing::info!(kind = %kind, id, removed = removed.len(), "Deleted record");
        Ok(removed)
    }

    /// Lazily list records of `kind` matching `filter`, in id order.
    pub fn list(&self, caller: &Caller, kind: RecordKind, filter: ListFilter) -> Result<RecordScan, StoreError> {
        caller.check_cancelled()?;
        let conn = self.connect()?;
        self.gate.authorize(&conn, caller.credential(), Operation::List, kind, now())?;

        for (field, _) in &filter.equals {
            if column_for(kind, field).is_none() {
                return Err(StoreError::Validation {
                    field: field.clone(),
                    reason: format!("{} has no field {field}", kind.label()),
                });
            }
        }
        if let Some((parent_kind, _)) = &filter.parent {
            tracing::debug!(%kind, parent = %parent_kind, "Listing children");
        }
        Ok(RecordScan::new(conn, kind, filter, LIST_PAGE_SIZE))
    }

    pub fn list_all(&self, caller: &Caller, kind: RecordKind) -> Result<RecordScan, StoreError> {
        self.list(caller, kind, ListFilter::new())
    }

    // ═══════════════════════════════════════════════════════════
    // Relationship navigation
    // ═══════════════════════════════════════════════════════════

    /// Ids of `child_kind` records that reference the parent.
    pub fn children_of(
        &self,
        caller: &Caller,
        parent_kind: RecordKind,
        parent_id: &str,
        child_kind: RecordKind,
    ) -> Result<BTreeSet<String>, StoreError> {
        self.read(caller, Operation::List, child_kind, |conn, _| {
            Ok(repository::children_of(conn, parent_kind, parent_id, child_kind)?)
        })
    }

    pub fn patients_of_doctor(&self, caller: &Caller, doctor_id: &str) -> Result<Vec<Patient>, StoreError> {
        self.read(caller, Operation::List, RecordKind::Patient, |conn, credential| {
            self.gate.permit(credential, Operation::List, RecordKind::DoctorPatient)?;
            require(conn, RecordKind::Doctor, doctor_id)?;
            let patient_ids: BTreeSet<String> = linked(conn, RecordKind::Doctor, doctor_id)?
                .into_iter()
                .map(|link| link.patient_id)
                .collect();
            fetch_all(conn, RecordKind::Patient, patient_ids)
        })
    }

    pub fn doctors_of_patient(&self, caller: &Caller, patient_id: &str) -> Result<Vec<Doctor>, StoreError> {
        self.read(caller, Operation::List, RecordKind::Doctor, |conn, credential| {
            self.gate.permit(credential, Operation::List, RecordKind::DoctorPatient)?;
            require(conn, RecordKind::Patient, patient_id)?;
            let doctor_ids: BTreeSet<String> = linked(conn, RecordKind::Patient, patient_id)?
                .into_iter()
                .map(|link| link.doctor_id)
                .collect();
            fetch_all(conn, RecordKind::Doctor, doctor_ids)
        })
    }

    pub fn prescriptions_of_doctor(&self, caller: &Caller, doctor_id: &str) -> Result<Vec<Prescription>, StoreError> {
        self.prescriptions_of(caller, RecordKind::Doctor, doctor_id)
    }

    pub fn prescriptions_of_patient(&self, caller: &Caller, patient_id: &str) -> Result<Vec<Prescription>, StoreError> {
        self.prescriptions_of(caller, RecordKind::Patient, patient_id)
    }

    fn prescriptions_of(
        &self,
        caller: &Caller,
        parent_kind: RecordKind,
        parent_id: &str,
    ) -> Result<Vec<Prescription>, StoreError> {
        self.read(caller, Operation::List, RecordKind::Prescription, |conn, _| {
            require(conn, parent_kind, parent_id)?;
            let ids = repository::children_of(conn, parent_kind, parent_id, RecordKind::Prescription)?;
            fetch_all(conn, RecordKind::Prescription, ids)
        })
    }

    // ═══════════════════════════════════════════════════════════
    // Administration (host-side, not gated)
    // ═══════════════════════════════════════════════════════════

    /// Issue a key valid for `credential_ttl_days`.
    pub fn issue_api_key(&self, description: Option<&str>) -> Result<IssuedApiKey, StoreError> {
        let conn = self.connect()?;
        let now = now();
        Ok(issue_key(&conn, description, now, now + self.config.credential_ttl())?)
    }

    /// Issue a key with an explicit expiry, which must lie in the future and
    /// no further out than `MAX_CREDENTIAL_TTL_DAYS`.
    pub fn issue_api_key_expiring(
        &self,
        description: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedApiKey, StoreError> {
        let now = now();
        if expires_at <= now {
            return Err(StoreError::Validation {
                field: "expiresAt".into(),
                reason: format!("{expires_at} is not in the future"),
            });
        }
        if expires_at > now + chrono::Duration::days(config::MAX_CREDENTIAL_TTL_DAYS) {
            return Err(StoreError::Validation {
                field: "expiresAt".into(),
                reason: format!("keys live at most {} days", config::MAX_CREDENTIAL_TTL_DAYS),
            });
        }
        let conn = self.connect()?;
        Ok(issue_key(&conn, description, now, expires_at)?)
    }

    pub fn revoke_api_key(&self, key_id: &str) -> Result<(), StoreError> {
        let conn = self.connect()?;
        if !repository::revoke_api_key(&conn, key_id)? {
            return Err(StoreError::NotFound {
                entity: "ApiKey".into(),
                id: key_id.to_string(),
            });
        }
        tracing::info!(key_id, "Revoked API key");
        Ok(())
    }

    pub fn list_api_keys(&self) -> Result<Vec<ApiKeyInfo>, StoreError> {
        let conn = self.connect()?;
        Ok(repository::list_api_keys(&conn)?)
    }

    /// Compare the relation index with the foreign keys it is derived from.
    pub fn check_consistency(&self) -> Result<repository::ConsistencyReport, StoreError> {
        let conn = self.connect()?;
        let report = repository::check_consistency(&conn)?;
        if !report.is_consistent() {
            tracing::warn!(issues = report.issues.len(), "Relation index is inconsistent");
        }
        Ok(report)
    }

    /// Rebuild the relation index. Returns the number of rows fixed.
    pub fn rebuild_relations(&self) -> Result<usize, StoreError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let fixed = repository::rebuild_relations(&tx)?;
        tx.commit()?;
        Ok(fixed)
    }
}

impl std::fmt::Debug for ClinicStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

/// Fresh id for `kind`, never one that was used before.
fn assign_id(conn: &Connection, kind: RecordKind) -> Result<String, StoreError> {
    loop {
        let id = Uuid::new_v4().to_string();
        if !repository::is_tombstoned(conn, kind, &id)? && !repository::record_exists(conn, kind, &id)? {
            return Ok(id);
        }
    }
}

fn build_record(id: String, new: NewRecord, now: DateTime<Utc>) -> Record {
    match new {
        NewRecord::Doctor(n) => Doctor::from_new(id, n, now).into(),
        NewRecord::Patient(n) => Patient::from_new(id, n, now).into(),
        NewRecord::DoctorPatient(n) => DoctorPatient::from_new(id, n, now).into(),
        NewRecord::Prescription(n) => Prescription::from_new(id, n, now).into(),
        NewRecord::Visit(n) => Visit::from_new(id, n, now).into(),
    }
}

/// Delete one row with its index entries and leave a tombstone.
fn remove_record(conn: &Connection, kind: RecordKind, id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
    repository::unindex_record(conn, kind, id)?;
    repository::delete_record_row(conn, kind, id)?;
    repository::insert_tombstone(conn, kind, id, now)?;
    Ok(())
}

fn narrow<T: TryFrom<Record, Error = Record>>(record: Record) -> Result<T, StoreError> {
    T::try_from(record).map_err(|other| {
        StoreError::Internal(format!("Unexpected {} record", other.kind().label()))
    })
}

fn not_found(kind: RecordKind, id: &str) -> StoreError {
    StoreError::NotFound {
        entity: kind.label().into(),
        id: id.to_string(),
    }
}

fn require(conn: &Connection, kind: RecordKind, id: &str) -> Result<(), StoreError> {
    if !repository::record_exists(conn, kind, id)? {
        return Err(not_found(kind, id));
    }
    Ok(())
}

fn linked(conn: &Connection, parent_kind: RecordKind, parent_id: &str) -> Result<Vec<DoctorPatient>, StoreError> {
    let ids = repository::children_of(conn, parent_kind, parent_id, RecordKind::DoctorPatient)?;
    let mut links = Vec::with_capacity(ids.len());
    for id in ids {
        let link = repository::get_doctor_patient(conn, &id)?
            .ok_or_else(|| stale_index(RecordKind::DoctorPatient, &id))?;
        links.push(link);
    }
    Ok(links)
}

fn fetch_all<T: TryFrom<Record, Error = Record>>(
    conn: &Connection,
    kind: RecordKind,
    ids: impl IntoIterator<Item = String>,
) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    for id in ids {
        let record = repository::get_record(conn, kind, &id)?.ok_or_else(|| stale_index(kind, &id))?;
        records.push(narrow(record)?);
    }
    Ok(records)
}

/// The relation index names a row that is not there.
fn stale_index(kind: RecordKind, id: &str) -> StoreError {
    tracing::warn!(%kind, id, "Relation index refers to a missing record");
    StoreError::Internal(format!(
        "Relation index refers to missing {} {id}; rebuild_relations repairs it",
        kind.label()
    ))
}
