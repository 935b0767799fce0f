//! Classification of an incoming batch against the stored roster.
//!
//! Planning is pure; storage backends call [`plan_batch`] on the before-image
//! they captured inside their write transaction and then persist the result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RosterSchema;
use crate::fields::Field;
use crate::models::{FieldChange, NewEditLogEntry, StudentRecord, StudentRow};
use crate::placement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowClass {
    Insert,
    Update,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct PlannedRow {
    pub record: StudentRecord,
    pub class: RowClass,
    pub changes: Vec<FieldChange>,
    /// The derived placement date differs from what is stored.
    pub derived_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub rows: Vec<PlannedRow>,
    pub log: Vec<NewEditLogEntry>,
}

impl ReconcilePlan {
    fn count(&self, class: RowClass) -> usize {
        self.rows.iter().filter(|row| row.class == class).count()
    }

    pub fn inserted(&self) -> usize {
        self.count(RowClass::Insert)
    }

    pub fn updated(&self) -> usize {
        self.count(RowClass::Update)
    }

    pub fn unchanged(&self) -> usize {
        self.rows.len() - self.inserted() - self.updated()
    }

    /// Whether applying the plan changes anything a reader can observe.
    pub fn mutates(&self) -> bool {
        self.rows
            .iter()
            .any(|row| row.class != RowClass::Unchanged || row.derived_changed)
    }

    pub fn records(&self) -> impl Iterator<Item = &StudentRecord> {
        self.rows.iter().map(|row| &row.record)
    }
}

/// Batch rows after keyless rows are dropped and repeated keys collapsed.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub rows: Vec<StudentRow>,
    pub skipped: usize,
    pub duplicates: usize,
}

impl PreparedBatch {
    pub fn keys(&self) -> Vec<String> {
        self.rows.iter().map(|row| row.reg_no.clone()).collect()
    }
}

/// A repeated registration number keeps its first position and its last content.
pub fn prepare_batch(rows: Vec<StudentRow>) -> PreparedBatch {
    let mut prepared = PreparedBatch::default();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        if row.reg_no.is_empty() {
            prepared.skipped += 1;
            continue;
        }
        match positions.get(&row.reg_no) {
            Some(&index) => {
                prepared.duplicates += 1;
                prepared.rows[index] = row;
            }
            None => {
                positions.insert(row.reg_no.clone(), prepared.rows.len());
                prepared.rows.push(row);
            }
        }
    }

    prepared
}

/// Fields whose string forms differ, key excluded.
pub fn diff_rows(before: &StudentRow, after: &StudentRow) -> Vec<FieldChange> {
    Field::SPREADSHEET
        .into_iter()
        .filter(|field| *field != Field::RegNo)
        .filter_map(|field| {
            let old_value = before.value(field).render();
            let new_value = after.value(field).render();
            let same = old_value.as_deref().unwrap_or_default() == new_value.as_deref().unwrap_or_default();
            (!same).then_some(FieldChange {
                field,
                old_value,
                new_value,
            })
        })
        .collect()
}

pub fn plan_batch(
    before: &HashMap<String, StudentRecord>,
    batch: &[StudentRow],
    at: DateTime<Utc>,
    schema: &RosterSchema,
) -> ReconcilePlan {
    let effective = at.date_naive();
    let mut plan = ReconcilePlan::default();

    for row in batch {
        let previous = before.get(&row.reg_no);
        let mut record = StudentRecord {
            row: row.clone(),
            placed_date: None,
        };
        placement::maintain(&mut record, previous, effective, schema);

        let (class, changes, derived_changed) = match previous {
            None => (RowClass::Insert, Vec::new(), false),
            Some(stored) => {
                let changes = diff_rows(&stored.row, &record.row);
                let class = if changes.is_empty() {
                    RowClass::Unchanged
                } else {
                    RowClass::Update
                };
                (class, changes, stored.placed_date != record.placed_date)
            }
        };

        plan.log.extend(changes.iter().map(|change| NewEditLogEntry {
            reg_no: record.row.reg_no.clone(),
            student_name: record.row.student_name.clone(),
            field: change.field,
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            changed_at: at,
        }));
        plan.rows.push(PlannedRow {
            record,
            class,
            changes,
            derived_changed,
        });
    }

    plan
}
