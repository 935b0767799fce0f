use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::Field;

/// One roster row in the internal field-key shape, as the spreadsheet carries it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRow {
    pub sr_no: Option<i32>,
    pub reg_no: String,
    pub student_name: Option<String>,
    pub gender: Option<String>,
    pub course: Option<String>,
    pub resume_status: Option<String>,
    pub seeking_placement: Option<String>,
    pub department: Option<String>,
    pub offer_letter_status: Option<String>,
    pub status: Option<String>,
    pub company_name: Option<String>,
    pub designation: Option<String>,
    pub ctc: Option<f64>,
    pub joining_date: Option<String>,
    pub joining_status: Option<String>,
    pub school_name: Option<String>,
    pub mobile_number: Option<String>,
    pub email: Option<String>,
    pub graduation_course: Option<String>,
    pub graduation_ogpa: Option<f64>,
    pub percent_10: Option<f64>,
    pub percent_12: Option<f64>,
    pub backlogs: Option<i32>,
    pub hometown: Option<String>,
    pub address: Option<String>,
    pub reason: Option<String>,
}

/// A persisted student: the spreadsheet row plus the derived placement date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(flatten)]
    pub row: StudentRow,
    pub placed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Int(i32),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue {
    /// String form used for change detection and the edit log.
    ///
    /// Numbers render through `f64`'s shortest representation so `600000`
    /// stored as fixed point and `600000.0` parsed from a sheet compare equal.
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Int(value) => Some(value.to_string()),
            FieldValue::Number(value) => Some(format_number(*value)),
            FieldValue::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
        }
    }
}

pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    value.to_string()
}

fn text(value: &Option<String>) -> FieldValue {
    value.clone().map_or(FieldValue::Null, FieldValue::Text)
}

fn number(value: Option<f64>) -> FieldValue {
    value.map_or(FieldValue::Null, FieldValue::Number)
}

fn int(value: Option<i32>) -> FieldValue {
    value.map_or(FieldValue::Null, FieldValue::Int)
}

impl StudentRow {
    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::SrNo => int(self.sr_no),
            Field::RegNo => FieldValue::Text(self.reg_no.clone()),
            Field::StudentName => text(&self.student_name),
            Field::Gender => text(&self.gender),
            Field::Course => text(&self.course),
            Field::ResumeStatus => text(&self.resume_status),
            Field::SeekingPlacement => text(&self.seeking_placement),
            Field::Department => text(&self.department),
            Field::OfferLetterStatus => text(&self.offer_letter_status),
            Field::Status => text(&self.status),
            Field::CompanyName => text(&self.company_name),
            Field::Designation => text(&self.designation),
            Field::Ctc => number(self.ctc),
            Field::JoiningDate => text(&self.joining_date),
            Field::JoiningStatus => text(&self.joining_status),
            Field::SchoolName => text(&self.school_name),
            Field::MobileNumber => text(&self.mobile_number),
            Field::Email => text(&self.email),
            Field::GraduationCourse => text(&self.graduation_course),
            Field::GraduationOgpa => number(self.graduation_ogpa),
            Field::Percent10 => number(self.percent_10),
            Field::Percent12 => number(self.percent_12),
            Field::Backlogs => int(self.backlogs),
            Field::Hometown => text(&self.hometown),
            Field::Address => text(&self.address),
            Field::Reason => text(&self.reason),
            Field::PlacedDate => FieldValue::Null,
        }
    }

    /// Assigns a coerced value. Values of the wrong shape for the column
    /// clear it; the placement date is not a row column and is ignored.
    pub fn set(&mut self, field: Field, value: FieldValue) {
        let as_text = |value: FieldValue| match value {
            FieldValue::Text(text) => Some(text),
            _ => None,
        };
        let as_number = |value: FieldValue| match value {
            FieldValue::Number(number) => Some(number),
            FieldValue::Int(number) => Some(f64::from(number)),
            _ => None,
        };
        let as_int = |value: FieldValue| match value {
            FieldValue::Int(number) => Some(number),
            _ => None,
        };

        match field {
            Field::SrNo => self.sr_no = as_int(value),
            Field::RegNo => self.reg_no = as_text(value).unwrap_or_default(),
            Field::StudentName => self.student_name = as_text(value),
            Field::Gender => self.gender = as_text(value),
            Field::Course => self.course = as_text(value),
            Field::ResumeStatus => self.resume_status = as_text(value),
            Field::SeekingPlacement => self.seeking_placement = as_text(value),
            Field::Department => self.department = as_text(value),
            Field::OfferLetterStatus => self.offer_letter_status = as_text(value),
            Field::Status => self.status = as_text(value),
            Field::CompanyName => self.company_name = as_text(value),
            Field::Designation => self.designation = as_text(value),
            Field::Ctc => self.ctc = as_number(value),
            Field::JoiningDate => self.joining_date = as_text(value),
            Field::JoiningStatus => self.joining_status = as_text(value),
            Field::SchoolName => self.school_name = as_text(value),
            Field::MobileNumber => self.mobile_number = as_text(value),
            Field::Email => self.email = as_text(value),
            Field::GraduationCourse => self.graduation_course = as_text(value),
            Field::GraduationOgpa => self.graduation_ogpa = as_number(value),
            Field::Percent10 => self.percent_10 = as_number(value),
            Field::Percent12 => self.percent_12 = as_number(value),
            Field::Backlogs => self.backlogs = as_int(value),
            Field::Hometown => self.hometown = as_text(value),
            Field::Address => self.address = as_text(value),
            Field::Reason => self.reason = as_text(value),
            Field::PlacedDate => {}
        }
    }
}

impl StudentRecord {
    pub fn value(&self, field: Field) -> FieldValue {
        match field {
            Field::PlacedDate => self.placed_date.map_or(FieldValue::Null, FieldValue::Date),
            other => self.row.value(other),
        }
    }
}

/// Roster listing order: serial number first, unnumbered rows last,
/// registration number as the tie break.
pub fn serial_order(a: &StudentRow, b: &StudentRow) -> std::cmp::Ordering {
    let serial = match (a.sr_no, b.sr_no) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    };
    serial.then_with(|| a.reg_no.cmp(&b.reg_no))
}

/// One field that differs between a stored record and its replacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: Field,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadVersion {
    pub version_id: i64,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub total_records: i32,
    pub inserted: i32,
    pub updated: i32,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEditLogEntry {
    pub reg_no: String,
    pub student_name: Option<String>,
    pub field: Field,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditLogEntry {
    pub id: i64,
    pub reg_no: String,
    pub student_name: Option<String>,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct EditLogFilter {
    pub reg_no: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl EditLogFilter {
    pub fn matches(&self, entry: &EditLogEntry) -> bool {
        self.reg_no.as_ref().map_or(true, |reg_no| *reg_no == entry.reg_no)
            && self.since.map_or(true, |since| entry.changed_at >= since)
            && self.until.map_or(true, |until| entry.changed_at < until)
    }
}

pub const MAX_PAGE_SIZE: u32 = 500;

/// One-based page request.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EditLogPage {
    pub entries: Vec<EditLogEntry>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(FieldValue::Number(600000.0).render().as_deref(), Some("600000"));
        assert_eq!(FieldValue::Number(92.5).render().as_deref(), Some("92.5"));
        assert_eq!(FieldValue::Number(-0.0).render().as_deref(), Some("0"));
        assert_eq!(FieldValue::Null.render(), None);
    }

    #[test]
    fn set_then_value_preserves_column() {
        let mut row = StudentRow::default();
        row.set(Field::Ctc, FieldValue::Number(650000.0));
        row.set(Field::Backlogs, FieldValue::Int(2));
        row.set(Field::Status, FieldValue::Text("Placed".to_string()));
        assert_eq!(row.value(Field::Ctc), FieldValue::Number(650000.0));
        assert_eq!(row.value(Field::Backlogs), FieldValue::Int(2));
        assert_eq!(row.status.as_deref(), Some("Placed"));
    }

    #[test]
    fn serial_sort_puts_unnumbered_rows_last() {
        let mut rows = vec![
            StudentRow { sr_no: None, reg_no: "A".into(), ..Default::default() },
            StudentRow { sr_no: Some(2), reg_no: "B".into(), ..Default::default() },
            StudentRow { sr_no: Some(1), reg_no: "C".into(), ..Default::default() },
        ];
        rows.sort_by(serial_order);
        let order: Vec<&str> = rows.iter().map(|r| r.reg_no.as_str()).collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn page_clamps_inputs() {
        let page = Page::new(0, 10_000);
        assert_eq!(page.number, 1);
        assert_eq!(page.size, MAX_PAGE_SIZE);
        assert_eq!(Page::new(3, 20).offset(), 40);
    }
}
