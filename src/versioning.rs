use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::fields::Field;
use crate::models::StudentRow;

const FIELD_SEPARATOR: u8 = 0x1f;
const ROW_SEPARATOR: u8 = b'\n';

/// Metadata for a version about to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub total_records: i32,
    pub inserted: i32,
    pub updated: i32,
    pub fingerprint: String,
}

/// SHA-256 over the batch sorted by registration number, every column in
/// template order. Upload order and sheet layout do not affect it.
pub fn fingerprint(rows: &[StudentRow]) -> String {
    let mut sorted: Vec<&StudentRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.reg_no.cmp(&b.reg_no));

    let mut hasher = Sha256::new();
    for row in sorted {
        for field in Field::SPREADSHEET {
            if let Some(value) = row.value(field).render() {
                hasher.update(value.as_bytes());
            }
            hasher.update([FIELD_SEPARATOR]);
        }
        hasher.update([ROW_SEPARATOR]);
    }
    format!("{:x}", hasher.finalize())
}

fn clamp_count(count: usize) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Version metadata for a reconciled batch, or `None` when the batch changed
/// nothing and no version should exist.
pub fn new_version(
    filename: &str,
    uploaded_at: DateTime<Utc>,
    rows: &[StudentRow],
    inserted: usize,
    updated: usize,
) -> Option<NewVersion> {
    if inserted + updated == 0 {
        return None;
    }
    Some(NewVersion {
        filename: filename.to_string(),
        uploaded_at,
        total_records: clamp_count(rows.len()),
        inserted: clamp_count(inserted),
        updated: clamp_count(updated),
        fingerprint: fingerprint(rows),
    })
}
