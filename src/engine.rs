use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics;
use crate::cache::{CacheState, CachedAnalytics};
use crate::config::RosterSchema;
use crate::edits::{self, FieldEdit};
use crate::error::{EngineError, Result};
use crate::models::{EditLogFilter, EditLogPage, Page, StudentRecord, StudentRow, UploadVersion};
use crate::normalize;
use crate::reconcile;
use crate::store::RosterStore;
use crate::versioning;

/// Result of one ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub records_total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub version_id: Option<i64>,
    /// Set when the roster was reconciled but the version could not be saved.
    pub version_error: Option<String>,
}

impl IngestReport {
    pub fn has_changes(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionSnapshot {
    pub version: UploadVersion,
    pub rows: Vec<StudentRow>,
}

/// Ingestion, editing, history and analytics over one roster store.
pub struct Engine<S> {
    store: S,
    schema: RosterSchema,
    clock: fn() -> DateTime<Utc>,
}

impl<S: RosterStore> Engine<S> {
    pub fn new(store: S, schema: RosterSchema) -> Self {
        Self {
            store,
            schema,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schema(&self) -> &RosterSchema {
        &self.schema
    }

    /// Normalize, coerce and reconcile one spreadsheet, then record a version
    /// when anything changed.
    ///
    /// Structural problems with the file abort before any write. The roster
    /// write is atomic; the version write that follows is best effort and a
    /// failure there is reported in `version_error` rather than as an error.
    #[tracing::instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    pub async fn ingest(&self, bytes: &[u8], source_name: &str) -> Result<IngestReport> {
        let normalized = normalize::normalize(bytes, &self.schema)?;
        let batch = reconcile::prepare_batch(normalized.iter().map(|row| row.coerce()).collect());
        if batch.skipped > 0 {
            tracing::warn!(skipped = batch.skipped, "rows without a registration number were skipped");
        }
        if batch.duplicates > 0 {
            tracing::warn!(
                duplicates = batch.duplicates,
                "repeated registration numbers collapsed to their last row"
            );
        }

        let at = (self.clock)();
        let schema = &self.schema;
        let rows = &batch.rows;
        let plan = self
            .store
            .reconcile_batch(&batch.keys(), |before| {
                reconcile::plan_batch(before, rows, at, schema)
            })
            .await?;

        let mut report = IngestReport {
            records_total: batch.rows.len(),
            inserted: plan.inserted(),
            updated: plan.updated(),
            unchanged: plan.unchanged(),
            skipped: batch.skipped,
            duplicates: batch.duplicates,
            version_id: None,
            version_error: None,
        };

        if let Some(version) =
            versioning::new_version(source_name, at, &batch.rows, report.inserted, report.updated)
        {
            match self.store.record_version(&version, &batch.rows).await {
                Ok(stored) => report.version_id = Some(stored.version_id),
                Err(error) => {
                    tracing::warn!(%error, "roster updated but the upload version was not saved");
                    if let Err(error) = self.store.invalidate_slot().await {
                        tracing::warn!(%error, "analytics cache invalidation failed");
                    }
                    report.version_error = Some(error.to_string());
                }
            }
        }

        tracing::info!(
            total = report.records_total,
            inserted = report.inserted,
            updated = report.updated,
            unchanged = report.unchanged,
            version_id = ?report.version_id,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn apply_edits(&self, reg_no: &str, requested: Vec<FieldEdit>) -> Result<Vec<String>> {
        let at = (self.clock)();
        let schema = &self.schema;
        let plan = self
            .store
            .apply_edits(reg_no, |before| edits::plan_edits(before, &requested, at, schema))
            .await?;

        if plan.derived_changed {
            tracing::debug!(reg_no, placed_date = ?plan.record.placed_date, "placement date updated");
        }
        Ok(plan
            .changes
            .iter()
            .map(|change| change.field.key().to_string())
            .collect())
    }

    /// Sets one field. Returns whether the stored value changed.
    pub async fn apply_field_edit(&self, reg_no: &str, field: &str, value: &str) -> Result<bool> {
        let edit = edits::parse_edit(field, value)?;
        let changed = self.apply_edits(reg_no, vec![edit]).await?;
        Ok(!changed.is_empty())
    }

    /// Sets several fields at once. Every value is validated before anything
    /// is written; returns the keys of the fields that actually changed.
    pub async fn apply_bulk_field_edit(
        &self,
        reg_no: &str,
        values: &[(String, String)],
    ) -> Result<Vec<String>> {
        let requested = values
            .iter()
            .map(|(field, value)| edits::parse_edit(field, value))
            .collect::<Result<Vec<_>>>()?;
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        self.apply_edits(reg_no, requested).await
    }

    /// Serves the cached bundle, recomputing it when the slot is stale.
    pub async fn get_analytics(&self) -> Result<CachedAnalytics> {
        let generation = match self.store.read_slot().await? {
            CacheState::Fresh(cached) => {
                tracing::debug!("analytics cache hit");
                return Ok(cached);
            }
            CacheState::Stale { generation } => generation,
        };

        tracing::debug!(generation, "analytics cache stale, recomputing");
        let roster = self.store.load_roster().await?;
        let cached = CachedAnalytics {
            bundle: analytics::compute(&roster, &self.schema),
            updated_at: (self.clock)(),
        };
        if !self.store.fill_slot(generation, &cached).await? {
            tracing::debug!("roster changed during recompute; leaving cache stale");
        }
        Ok(cached)
    }

    pub async fn list_students(&self) -> Result<Vec<StudentRecord>> {
        self.store.load_roster().await
    }

    pub async fn get_student(&self, reg_no: &str) -> Result<StudentRecord> {
        self.store
            .find_student(reg_no)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {reg_no}")))
    }

    pub async fn list_versions(&self) -> Result<Vec<UploadVersion>> {
        self.store.list_versions().await
    }

    pub async fn get_version(&self, version_id: i64) -> Result<UploadVersion> {
        self.store
            .find_version(version_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("version {version_id}")))
    }

    pub async fn get_version_snapshot(&self, version_id: i64) -> Result<VersionSnapshot> {
        let version = self.get_version(version_id).await?;
        let rows = self.store.version_rows(version_id).await?;
        Ok(VersionSnapshot { version, rows })
    }

    pub async fn delete_version(&self, version_id: i64) -> Result<()> {
        if !self.store.delete_version(version_id).await? {
            return Err(EngineError::NotFound(format!("version {version_id}")));
        }
        tracing::info!(version_id, "version deleted");
        Ok(())
    }

    pub async fn list_edit_log(
        &self,
        filter: &EditLogFilter,
        page: u32,
        page_size: u32,
    ) -> Result<EditLogPage> {
        self.store
            .list_edit_log(filter, Page::new(page, page_size))
            .await
    }

    pub async fn delete_student(&self, reg_no: &str) -> Result<()> {
        if !self.store.delete_student(reg_no).await? {
            return Err(EngineError::NotFound(format!("student {reg_no}")));
        }
        tracing::info!(reg_no, "student deleted");
        Ok(())
    }

    pub async fn drop_all(&self) -> Result<u64> {
        let removed = self.store.delete_all().await?;
        tracing::info!(removed, "roster cleared");
        Ok(removed)
    }
}
