use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::cache::{AnalyticsSlot, CacheState, CachedAnalytics, MemorySlot};
use crate::edits::EditPlan;
use crate::error::{EngineError, Result};
use crate::models::{
    serial_order, EditLogEntry, EditLogFilter, EditLogPage, Page, StudentRecord, StudentRow,
    UploadVersion,
};
use crate::reconcile::ReconcilePlan;
use crate::versioning::NewVersion;

/// Persistence for the roster, its version history, the edit log and the
/// analytics slot.
///
/// `reconcile_batch` and `apply_edits` are the only roster writers that carry
/// domain decisions. Implementations capture the before-image, call the
/// planner, persist its records and log entries, and invalidate the analytics
/// slot as one atomic unit, serialized against every other roster write.
#[allow(async_fn_in_trait)]
pub trait RosterStore: AnalyticsSlot {
    async fn load_roster(&self) -> Result<Vec<StudentRecord>>;

    async fn find_student(&self, reg_no: &str) -> Result<Option<StudentRecord>>;

    async fn reconcile_batch<F>(&self, keys: &[String], planner: F) -> Result<ReconcilePlan>
    where
        F: FnOnce(&HashMap<String, StudentRecord>) -> ReconcilePlan + Send;

    /// Fails with `NotFound` when no student has `reg_no`.
    async fn apply_edits<F>(&self, reg_no: &str, planner: F) -> Result<EditPlan>
    where
        F: FnOnce(&StudentRecord) -> EditPlan + Send;

    async fn record_version(&self, version: &NewVersion, rows: &[StudentRow]) -> Result<UploadVersion>;

    /// Newest first.
    async fn list_versions(&self) -> Result<Vec<UploadVersion>>;

    async fn find_version(&self, version_id: i64) -> Result<Option<UploadVersion>>;

    async fn version_rows(&self, version_id: i64) -> Result<Vec<StudentRow>>;

    /// Removes the version and its snapshot rows. Returns whether it existed.
    async fn delete_version(&self, version_id: i64) -> Result<bool>;

    /// Newest first.
    async fn list_edit_log(&self, filter: &EditLogFilter, page: Page) -> Result<EditLogPage>;

    async fn delete_student(&self, reg_no: &str) -> Result<bool>;

    async fn delete_all(&self) -> Result<u64>;
}

#[derive(Debug, Default)]
struct MemoryState {
    students: BTreeMap<String, StudentRecord>,
    versions: BTreeMap<i64, (UploadVersion, Vec<StudentRow>)>,
    last_version_id: i64,
    edit_log: Vec<EditLogEntry>,
    slot: MemorySlot,
}

impl MemoryState {
    fn append_log(&mut self, entries: &[crate::models::NewEditLogEntry]) {
        for entry in entries {
            let id = self.edit_log.len() as i64 + 1;
            self.edit_log.push(EditLogEntry {
                id,
                reg_no: entry.reg_no.clone(),
                student_name: entry.student_name.clone(),
                field: entry.field.key().to_string(),
                old_value: entry.old_value.clone(),
                new_value: entry.new_value.clone(),
                changed_at: entry.changed_at,
            });
        }
    }
}

/// Process-local store. One mutex guards every table, so each operation is
/// atomic with respect to the others.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Storage("memory store lock poisoned".to_string()))
    }
}

impl AnalyticsSlot for MemoryStore {
    async fn read_slot(&self) -> Result<CacheState> {
        Ok(self.lock()?.slot.state())
    }

    async fn fill_slot(&self, generation: i64, value: &CachedAnalytics) -> Result<bool> {
        Ok(self.lock()?.slot.fill(generation, value))
    }

    async fn invalidate_slot(&self) -> Result<()> {
        self.lock()?.slot.invalidate();
        Ok(())
    }
}

impl RosterStore for MemoryStore {
    async fn load_roster(&self) -> Result<Vec<StudentRecord>> {
        let mut records: Vec<StudentRecord> = self.lock()?.students.values().cloned().collect();
        records.sort_by(|a, b| serial_order(&a.row, &b.row));
        Ok(records)
    }

    async fn find_student(&self, reg_no: &str) -> Result<Option<StudentRecord>> {
        Ok(self.lock()?.students.get(reg_no).cloned())
    }

    async fn reconcile_batch<F>(&self, keys: &[String], planner: F) -> Result<ReconcilePlan>
    where
        F: FnOnce(&HashMap<String, StudentRecord>) -> ReconcilePlan + Send,
    {
        let mut state = self.lock()?;
        let before: HashMap<String, StudentRecord> = keys
            .iter()
            .filter_map(|key| state.students.get(key).map(|record| (key.clone(), record.clone())))
            .collect();

        let plan = planner(&before);
        for record in plan.records() {
            state.students.insert(record.row.reg_no.clone(), record.clone());
        }
        state.append_log(&plan.log);
        if plan.mutates() {
            state.slot.invalidate();
        }
        Ok(plan)
    }

    async fn apply_edits<F>(&self, reg_no: &str, planner: F) -> Result<EditPlan>
    where
        F: FnOnce(&StudentRecord) -> EditPlan + Send,
    {
        let mut state = self.lock()?;
        let before = state
            .students
            .get(reg_no)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("student {reg_no}")))?;

        let plan = planner(&before);
        if plan.mutates() {
            state.students.insert(reg_no.to_string(), plan.record.clone());
            state.append_log(&plan.log);
            state.slot.invalidate();
        }
        Ok(plan)
    }

    async fn record_version(&self, version: &NewVersion, rows: &[StudentRow]) -> Result<UploadVersion> {
        let mut state = self.lock()?;
        state.last_version_id += 1;
        let stored = UploadVersion {
            version_id: state.last_version_id,
            filename: version.filename.clone(),
            uploaded_at: version.uploaded_at,
            total_records: version.total_records,
            inserted: version.inserted,
            updated: version.updated,
            fingerprint: version.fingerprint.clone(),
        };
        state
            .versions
            .insert(stored.version_id, (stored.clone(), rows.to_vec()));
        Ok(stored)
    }

    async fn list_versions(&self) -> Result<Vec<UploadVersion>> {
        Ok(self
            .lock()?
            .versions
            .values()
            .rev()
            .map(|(version, _)| version.clone())
            .collect())
    }

    async fn find_version(&self, version_id: i64) -> Result<Option<UploadVersion>> {
        Ok(self
            .lock()?
            .versions
            .get(&version_id)
            .map(|(version, _)| version.clone()))
    }

    async fn version_rows(&self, version_id: i64) -> Result<Vec<StudentRow>> {
        let mut rows = self
            .lock()?
            .versions
            .get(&version_id)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        rows.sort_by(serial_order);
        Ok(rows)
    }

    async fn delete_version(&self, version_id: i64) -> Result<bool> {
        Ok(self.lock()?.versions.remove(&version_id).is_some())
    }

    async fn list_edit_log(&self, filter: &EditLogFilter, page: Page) -> Result<EditLogPage> {
        let state = self.lock()?;
        let mut matching: Vec<&EditLogEntry> =
            state.edit_log.iter().filter(|entry| filter.matches(entry)).collect();
        matching.sort_by(|a, b| b.changed_at.cmp(&a.changed_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let entries = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.size as usize)
            .cloned()
            .collect();

        Ok(EditLogPage {
            entries,
            page: page.number,
            page_size: page.size,
            total,
        })
    }

    async fn delete_student(&self, reg_no: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let removed = state.students.remove(reg_no).is_some();
        if removed {
            state.slot.invalidate();
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut state = self.lock()?;
        let count = state.students.len() as u64;
        state.students.clear();
        state.slot.invalidate();
        Ok(count)
    }
}
