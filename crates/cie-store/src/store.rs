// store.rs — ChangeStore: file-backed persistence plus the per-change
// locking contract spec §5.1 asks for.
//
// Shaped after the teacher's `GoalRunStore` (one JSON file per record
// under a store directory), generalized with an in-memory
// `RwLock<HashMap<ChangeId, Arc<Mutex<ChangeRecord>>>>` index so that two
// changes never contend on each other's lock: the outer `RwLock` is held
// only long enough to look up or insert an `Arc`, and every
// read-modify-write against one change's fields (including its embedded
// approvals) happens inside that change's own `Mutex`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use cie_core::{
    ApprovalId, ApprovalRole, ApprovalStatus, ChangeId, ChangeStatus, CieError, IdSequence,
};
use tracing::{info, warn};

use crate::approval::Approval;
use crate::error::StoreError;
use crate::record::ChangeRecord;

pub struct ChangeStore {
    store_dir: PathBuf,
    records: RwLock<HashMap<ChangeId, Arc<Mutex<ChangeRecord>>>>,
    approval_ids: IdSequence,
}

impl ChangeStore {
    /// Open a store backed by `store_dir`, loading any previously
    /// persisted records (so the highest approval id already issued is
    /// recoverable after a restart).
    pub fn new(store_dir: impl AsRef<Path>) -> Result<Self, CieError> {
        let store_dir = store_dir.as_ref().to_path_buf();
        fs::create_dir_all(&store_dir).map_err(|source| StoreError::Io {
            path: store_dir.display().to_string(),
            source,
        })?;

        let mut records = HashMap::new();
        let mut last_approval_id = 0u64;
        for entry in fs::read_dir(&store_dir).map_err(|source| StoreError::Io {
            path: store_dir.display().to_string(),
            source,
        })? {
            let entry = entry.map_err(|source| StoreError::Io {
                path: store_dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let raw = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                match serde_json::from_str::<ChangeRecord>(&raw) {
                    Ok(record) => {
                        last_approval_id = last_approval_id.max(
                            record.approvals.iter().map(|a| a.id.0).max().unwrap_or(0),
                        );
                        records.insert(record.id.clone(), Arc::new(Mutex::new(record)));
                    }
                    Err(err) => warn!(path = %path.display(), %err, "skipping unreadable change record"),
                }
            }
        }

        Ok(Self {
            store_dir,
            records: RwLock::new(records),
            approval_ids: IdSequence::resume_after(last_approval_id),
        })
    }

    fn record_path(&self, id: &ChangeId) -> PathBuf {
        self.store_dir.join(format!("{}.json", id.as_str()))
    }

    fn persist(&self, record: &ChangeRecord) -> Result<(), CieError> {
        let path = self.record_path(&record.id);
        let json = serde_json::to_string_pretty(record).map_err(StoreError::Serialization)?;
        fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// Insert a freshly created change record and persist it.
    pub fn insert(&self, record: ChangeRecord) -> Result<(), CieError> {
        self.persist(&record)?;
        let id = record.id.clone();
        self.records
            .write()
            .expect("change store lock poisoned")
            .insert(id, Arc::new(Mutex::new(record)));
        Ok(())
    }

    fn handle(&self, id: &ChangeId) -> Result<Arc<Mutex<ChangeRecord>>, CieError> {
        self.records
            .read()
            .expect("change store lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()).into())
    }

    /// Clone of the current record state, for callers that only need to
    /// read (e.g. risk/policy evaluation against a point-in-time view).
    pub fn get(&self, id: &ChangeId) -> Result<ChangeRecord, CieError> {
        let handle = self.handle(id)?;
        let guard = handle.lock().expect("change record lock poisoned");
        Ok(guard.clone())
    }

    pub fn list(&self) -> Vec<ChangeRecord> {
        self.records
            .read()
            .expect("change store lock poisoned")
            .values()
            .map(|handle| handle.lock().expect("change record lock poisoned").clone())
            .collect()
    }

    pub fn list_by_status(&self, status: ChangeStatus) -> Vec<ChangeRecord> {
        self.list().into_iter().filter(|r| r.status == status).collect()
    }

    /// Apply `mutate` to the change under its own lock, then persist the
    /// result. The whole read-modify-write happens inside one critical
    /// section, which is what lets `decide_approval` detect a lost race
    /// without a compare-and-swap dance (spec §5.1).
    pub fn mutate<T>(
        &self,
        id: &ChangeId,
        mutate: impl FnOnce(&mut ChangeRecord) -> Result<T, CieError>,
    ) -> Result<T, CieError> {
        let handle = self.handle(id)?;
        let mut guard = handle.lock().expect("change record lock poisoned");
        let result = mutate(&mut guard)?;
        self.persist(&guard)?;
        Ok(result)
    }

    /// Issue a new approval slot for `id`, expiring at `now + timeout`.
    pub fn add_approval(
        &self,
        id: &ChangeId,
        role_required: ApprovalRole,
        timeout_hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Approval, CieError> {
        self.mutate(id, |record| {
            let approval_id = ApprovalId(self.approval_ids.next());
            let expires_at = now + chrono::Duration::hours(timeout_hours);
            let approval = Approval::new(approval_id, id.clone(), role_required, expires_at);
            record.approvals.push(approval.clone());
            info!(%id, ?role_required, approval_id = approval_id.0, "approval slot created");
            Ok(approval)
        })
    }

    /// Decide an approval slot. Returns `ApprovalAlreadyDecided` if a
    /// concurrent decision already resolved it (spec §8 scenario E).
    pub fn decide_approval(
        &self,
        change_id: &ChangeId,
        approval_id: ApprovalId,
        status: ApprovalStatus,
        decided_by: impl Into<String>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CieError> {
        let decided_by = decided_by.into();
        self.mutate(change_id, |record| {
            let approval = record
                .approvals
                .iter_mut()
                .find(|a| a.id == approval_id)
                .ok_or(CieError::NotFound {
                    kind: "approval",
                    id: approval_id.to_string(),
                })?;
            if !approval.decide(status, decided_by, comment, now) {
                return Err(CieError::ApprovalAlreadyDecided(approval_id));
            }
            Ok(())
        })
    }

    pub fn delete(&self, id: &ChangeId) -> Result<bool, CieError> {
        let removed = self
            .records
            .write()
            .expect("change store lock poisoned")
            .remove(id)
            .is_some();
        if removed {
            let path = self.record_path(id);
            if path.exists() {
                fs::remove_file(&path).map_err(|source| StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            }
        }
        Ok(removed)
    }
}
