use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};

use crate::analytics::AnalyticsBundle;
use crate::cache::{AnalyticsSlot, CacheState, CachedAnalytics};
use crate::config::Settings;
use crate::edits::EditPlan;
use crate::error::{EngineError, Result};
use crate::fields::{Field, ValueKind};
use crate::models::{
    EditLogEntry, EditLogFilter, EditLogPage, FieldValue, NewEditLogEntry, Page, StudentRecord,
    StudentRow, UploadVersion,
};
use crate::reconcile::ReconcilePlan;
use crate::store::RosterStore;
use crate::versioning::NewVersion;

/// Advisory lock key serializing every roster write.
const ROSTER_LOCK: i64 = 0x524f_5354_4552;
/// Keeps each multi-row statement under the Postgres bind parameter limit.
const WRITE_CHUNK: usize = 1000;
const ORDER_BY_SERIAL: &str = " ORDER BY sr_no ASC NULLS LAST, reg_no COLLATE \"C\" ASC";

pub async fn connect(settings: &Settings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn row_columns() -> String {
    Field::SPREADSHEET
        .iter()
        .map(|field| field.key())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_value(row: &PgRow, field: Field) -> Result<FieldValue, sqlx::Error> {
    let key = field.key();
    let value = match field.kind() {
        ValueKind::Serial | ValueKind::Count => {
            row.try_get::<Option<i32>, _>(key)?.map(FieldValue::Int)
        }
        ValueKind::Number | ValueKind::Percentage | ValueKind::Score => {
            row.try_get::<Option<f64>, _>(key)?.map(FieldValue::Number)
        }
        ValueKind::Date => row.try_get::<Option<NaiveDate>, _>(key)?.map(FieldValue::Date),
        ValueKind::Text => row.try_get::<Option<String>, _>(key)?.map(FieldValue::Text),
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

fn student_row_from(row: &PgRow) -> Result<StudentRow, sqlx::Error> {
    let mut student = StudentRow::default();
    for field in Field::SPREADSHEET {
        student.set(field, read_value(row, field)?);
    }
    Ok(student)
}

fn student_from(row: &PgRow) -> Result<StudentRecord, sqlx::Error> {
    Ok(StudentRecord {
        row: student_row_from(row)?,
        placed_date: row.try_get("placed_date")?,
    })
}

fn bind_row<'args>(builder: &mut Separated<'_, 'args, Postgres, &'static str>, row: &StudentRow) {
    for field in Field::SPREADSHEET {
        match (field.kind(), row.value(field)) {
            (ValueKind::Serial | ValueKind::Count, FieldValue::Int(value)) => {
                builder.push_bind(Some(value))
            }
            (ValueKind::Serial | ValueKind::Count, _) => builder.push_bind(None::<i32>),
            (
                ValueKind::Number | ValueKind::Percentage | ValueKind::Score,
                FieldValue::Number(value),
            ) => builder.push_bind(Some(value)),
            (ValueKind::Number | ValueKind::Percentage | ValueKind::Score, _) => {
                builder.push_bind(None::<f64>)
            }
            (ValueKind::Date, FieldValue::Date(value)) => builder.push_bind(Some(value)),
            (ValueKind::Date, _) => builder.push_bind(None::<NaiveDate>),
            (ValueKind::Text, FieldValue::Text(value)) => builder.push_bind(Some(value)),
            (ValueKind::Text, _) => builder.push_bind(None::<String>),
        };
    }
}

async fn lock_roster(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ROSTER_LOCK)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn invalidate_in(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE analytics_cache
        SET payload = NULL, updated_at = NULL, generation = generation + 1
        WHERE id = 1
        "#,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_students<'a>(
    tx: &mut Transaction<'_, Postgres>,
    records: impl Iterator<Item = &'a StudentRecord>,
) -> Result<()> {
    let records: Vec<&StudentRecord> = records.collect();
    let columns = row_columns();
    let updates = Field::SPREADSHEET
        .iter()
        .filter(|field| **field != Field::RegNo)
        .map(|field| format!("{0} = EXCLUDED.{0}", field.key()))
        .chain(std::iter::once("placed_date = EXCLUDED.placed_date".to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    for chunk in records.chunks(WRITE_CHUNK) {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO students ({columns}, placed_date) "));
        builder.push_values(chunk, |mut values, record| {
            bind_row(&mut values, &record.row);
            values.push_bind(record.placed_date);
        });
        builder.push(" ON CONFLICT (reg_no) DO UPDATE SET ");
        builder.push(&updates);
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn append_log(tx: &mut Transaction<'_, Postgres>, entries: &[NewEditLogEntry]) -> Result<()> {
    for chunk in entries.chunks(WRITE_CHUNK) {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO edit_log (reg_no, student_name, field, old_value, new_value, changed_at) ",
        );
        builder.push_values(chunk, |mut values, entry| {
            values
                .push_bind(entry.reg_no.clone())
                .push_bind(entry.student_name.clone())
                .push_bind(entry.field.key())
                .push_bind(entry.old_value.clone())
                .push_bind(entry.new_value.clone())
                .push_bind(entry.changed_at);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

fn push_log_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &EditLogFilter) {
    builder.push(" WHERE TRUE");
    if let Some(reg_no) = &filter.reg_no {
        builder.push(" AND reg_no = ").push_bind(reg_no.clone());
    }
    if let Some(since) = filter.since {
        builder.push(" AND changed_at >= ").push_bind(since);
    }
    if let Some(until) = filter.until {
        builder.push(" AND changed_at < ").push_bind(until);
    }
}

fn version_from(row: &PgRow) -> Result<UploadVersion, sqlx::Error> {
    Ok(UploadVersion {
        version_id: row.try_get("version_id")?,
        filename: row.try_get("filename")?,
        uploaded_at: row.try_get("uploaded_at")?,
        total_records: row.try_get("total_records")?,
        inserted: row.try_get("inserted")?,
        updated: row.try_get("updated")?,
        fingerprint: row.try_get("fingerprint")?,
    })
}

/// Postgres-backed roster store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AnalyticsSlot for PgStore {
    async fn read_slot(&self) -> Result<CacheState> {
        let row = sqlx::query("SELECT payload, generation, updated_at FROM analytics_cache WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(CacheState::Stale { generation: 0 });
        };

        let generation: i64 = row.try_get("generation")?;
        let payload: Option<String> = row.try_get("payload")?;
        let updated_at: Option<DateTime<Utc>> = row.try_get("updated_at")?;
        let (Some(payload), Some(updated_at)) = (payload, updated_at) else {
            return Ok(CacheState::Stale { generation });
        };

        match serde_json::from_str::<AnalyticsBundle>(&payload) {
            Ok(bundle) => Ok(CacheState::Fresh(CachedAnalytics { bundle, updated_at })),
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable analytics payload");
                Ok(CacheState::Stale { generation })
            }
        }
    }

    async fn fill_slot(&self, generation: i64, value: &CachedAnalytics) -> Result<bool> {
        let payload = serde_json::to_string(&value.bundle)?;
        let result = sqlx::query(
            r#"
            UPDATE analytics_cache
            SET payload = $1, updated_at = $2
            WHERE id = 1 AND generation = $3
            "#,
        )
        .bind(payload)
        .bind(value.updated_at)
        .bind(generation)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn invalidate_slot(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        invalidate_in(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl RosterStore for PgStore {
    async fn load_roster(&self) -> Result<Vec<StudentRecord>> {
        let query = format!(
            "SELECT {}, placed_date FROM students{ORDER_BY_SERIAL}",
            row_columns()
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let records = rows.iter().map(student_from).collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn find_student(&self, reg_no: &str) -> Result<Option<StudentRecord>> {
        let query = format!("SELECT {}, placed_date FROM students WHERE reg_no = $1", row_columns());
        let row = sqlx::query(&query)
            .bind(reg_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(student_from).transpose()?)
    }

    async fn reconcile_batch<F>(&self, keys: &[String], planner: F) -> Result<ReconcilePlan>
    where
        F: FnOnce(&HashMap<String, StudentRecord>) -> ReconcilePlan + Send,
    {
        let mut tx = self.pool.begin().await?;
        lock_roster(&mut tx).await?;

        let query = format!(
            "SELECT {}, placed_date FROM students WHERE reg_no = ANY($1)",
            row_columns()
        );
        let rows = sqlx::query(&query).bind(keys).fetch_all(&mut *tx).await?;
        let mut before = HashMap::with_capacity(rows.len());
        for row in &rows {
            let record = student_from(row)?;
            before.insert(record.row.reg_no.clone(), record);
        }

        let plan = planner(&before);
        upsert_students(&mut tx, plan.records()).await?;
        append_log(&mut tx, &plan.log).await?;
        if plan.mutates() {
            invalidate_in(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(plan)
    }

    async fn apply_edits<F>(&self, reg_no: &str, planner: F) -> Result<EditPlan>
    where
        F: FnOnce(&StudentRecord) -> EditPlan + Send,
    {
        let mut tx = self.pool.begin().await?;
        lock_roster(&mut tx).await?;

        let query = format!("SELECT {}, placed_date FROM students WHERE reg_no = $1", row_columns());
        let row = sqlx::query(&query)
            .bind(reg_no)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("student {reg_no}")))?;
        let before = student_from(&row)?;

        let plan = planner(&before);
        if plan.mutates() {
            upsert_students(&mut tx, std::iter::once(&plan.record)).await?;
            append_log(&mut tx, &plan.log).await?;
            invalidate_in(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(plan)
    }

    async fn record_version(&self, version: &NewVersion, rows: &[StudentRow]) -> Result<UploadVersion> {
        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query(
            r#"
            INSERT INTO upload_versions
            (filename, uploaded_at, total_records, inserted, updated, fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING version_id, filename, uploaded_at, total_records, inserted, updated, fingerprint
            "#,
        )
        .bind(&version.filename)
        .bind(version.uploaded_at)
        .bind(version.total_records)
        .bind(version.inserted)
        .bind(version.updated)
        .bind(&version.fingerprint)
        .fetch_one(&mut *tx)
        .await?;
        let stored = version_from(&stored)?;

        let columns = row_columns();
        let indexed: Vec<(i32, &StudentRow)> = rows
            .iter()
            .enumerate()
            .map(|(position, row)| (i32::try_from(position).unwrap_or(i32::MAX), row))
            .collect();
        for chunk in indexed.chunks(WRITE_CHUNK) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
                "INSERT INTO version_snapshots (version_id, position, {columns}) "
            ));
            builder.push_values(chunk, |mut values, (position, row)| {
                values.push_bind(stored.version_id).push_bind(*position);
                bind_row(&mut values, row);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_versions(&self) -> Result<Vec<UploadVersion>> {
        let rows = sqlx::query(
            r#"
            SELECT version_id, filename, uploaded_at, total_records, inserted, updated, fingerprint
            FROM upload_versions
            ORDER BY version_id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(version_from).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_version(&self, version_id: i64) -> Result<Option<UploadVersion>> {
        let row = sqlx::query(
            r#"
            SELECT version_id, filename, uploaded_at, total_records, inserted, updated, fingerprint
            FROM upload_versions
            WHERE version_id = $1
            "#,
        )
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(version_from).transpose()?)
    }

    async fn version_rows(&self, version_id: i64) -> Result<Vec<StudentRow>> {
        let query = format!(
            "SELECT {} FROM version_snapshots WHERE version_id = $1{ORDER_BY_SERIAL}",
            row_columns()
        );
        let rows = sqlx::query(&query)
            .bind(version_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(student_row_from).collect::<Result<Vec<_>, _>>()?)
    }

    async fn delete_version(&self, version_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM upload_versions WHERE version_id = $1")
            .bind(version_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_edit_log(&self, filter: &EditLogFilter, page: Page) -> Result<EditLogPage> {
        let mut count: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM edit_log");
        push_log_filter(&mut count, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.try_get(0)?;

        let mut select: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT id, reg_no, student_name, field, old_value, new_value, changed_at FROM edit_log",
        );
        push_log_filter(&mut select, filter);
        select
            .push(" ORDER BY changed_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = select.build().fetch_all(&self.pool).await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(EditLogEntry {
                id: row.try_get("id")?,
                reg_no: row.try_get("reg_no")?,
                student_name: row.try_get("student_name")?,
                field: row.try_get("field")?,
                old_value: row.try_get("old_value")?,
                new_value: row.try_get("new_value")?,
                changed_at: row.try_get("changed_at")?,
            });
        }

        Ok(EditLogPage {
            entries,
            page: page.number,
            page_size: page.size,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn delete_student(&self, reg_no: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        lock_roster(&mut tx).await?;
        let result = sqlx::query("DELETE FROM students WHERE reg_no = $1")
            .bind(reg_no)
            .execute(&mut *tx)
            .await?;
        let removed = result.rows_affected() > 0;
        if removed {
            invalidate_in(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        lock_roster(&mut tx).await?;
        let result = sqlx::query("DELETE FROM students").execute(&mut *tx).await?;
        invalidate_in(&mut tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
