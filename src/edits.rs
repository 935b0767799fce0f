use chrono::{DateTime, Utc};

use crate::coerce;
use crate::config::RosterSchema;
use crate::error::{EngineError, Result};
use crate::fields::{Field, Mutability, ValueKind};
use crate::models::{FieldChange, FieldValue, NewEditLogEntry, StudentRecord};
use crate::placement;

const MIN_PHONE_DIGITS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldEdit {
    pub field: Field,
    pub value: FieldValue,
}

fn validate_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !address.chars().any(char::is_whitespace)
}

/// Resolves and validates one `field = value` request.
///
/// An empty value clears the field. Unlike spreadsheet coercion, a value that
/// does not fit the column is rejected instead of silently becoming null.
pub fn parse_edit(field_key: &str, raw: &str) -> Result<FieldEdit> {
    let field = Field::from_key(field_key)
        .ok_or_else(|| EngineError::validation(field_key, "unknown field"))?;
    match field.mutability() {
        Mutability::Key => {
            return Err(EngineError::validation(field.key(), "registration number cannot be edited"))
        }
        Mutability::Derived => {
            return Err(EngineError::validation(field.key(), "field is maintained automatically"))
        }
        Mutability::Editable => {}
    }

    if coerce::coerce_text(raw).is_none() {
        return Ok(FieldEdit {
            field,
            value: FieldValue::Null,
        });
    }

    let value = coerce::coerce_field(field, raw);
    if value == FieldValue::Null {
        let reason = match field.kind() {
            ValueKind::Serial | ValueKind::Count => "must be a whole number",
            _ => "must be numeric",
        };
        return Err(EngineError::validation(field.key(), reason));
    }

    if let (Field::Email, FieldValue::Text(address)) = (field, &value) {
        if !validate_email(address) {
            return Err(EngineError::validation(field.key(), "malformed email address"));
        }
    }
    if let (Field::MobileNumber, FieldValue::Text(number)) = (field, &value) {
        let digits = number.chars().filter(char::is_ascii_digit).count();
        if digits < MIN_PHONE_DIGITS {
            return Err(EngineError::validation(
                field.key(),
                format!("expected at least {MIN_PHONE_DIGITS} digits"),
            ));
        }
    }

    Ok(FieldEdit { field, value })
}

#[derive(Debug, Clone)]
pub struct EditPlan {
    pub record: StudentRecord,
    pub changes: Vec<FieldChange>,
    pub log: Vec<NewEditLogEntry>,
    pub derived_changed: bool,
}

impl EditPlan {
    pub fn mutates(&self) -> bool {
        !self.changes.is_empty() || self.derived_changed
    }
}

/// Applies validated edits to a stored record and derives the placement date
/// once, after all edits, against the record as it was before.
pub fn plan_edits(
    before: &StudentRecord,
    edits: &[FieldEdit],
    at: DateTime<Utc>,
    schema: &RosterSchema,
) -> EditPlan {
    let mut record = before.clone();
    let mut changes: Vec<FieldChange> = Vec::new();

    for edit in edits {
        let old_value = record.row.value(edit.field).render();
        let new_value = edit.value.render();
        if old_value.as_deref().unwrap_or_default() == new_value.as_deref().unwrap_or_default() {
            continue;
        }
        record.row.set(edit.field, edit.value.clone());
        match changes.iter_mut().find(|change| change.field == edit.field) {
            Some(existing) => existing.new_value = new_value,
            None => changes.push(FieldChange {
                field: edit.field,
                old_value,
                new_value,
            }),
        }
    }
    changes.retain(|change| {
        change.old_value.as_deref().unwrap_or_default() != change.new_value.as_deref().unwrap_or_default()
    });

    placement::maintain(&mut record, Some(before), at.date_naive(), schema);
    let derived_changed = record.placed_date != before.placed_date;

    let log = changes
        .iter()
        .map(|change| NewEditLogEntry {
            reg_no: record.row.reg_no.clone(),
            student_name: record.row.student_name.clone(),
            field: change.field,
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
            changed_at: at,
        })
        .collect();

    EditPlan {
        record,
        changes,
        log,
        derived_changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRow;
    use chrono::{NaiveDate, TimeZone};

    fn stored() -> StudentRecord {
        StudentRecord {
            row: StudentRow {
                reg_no: "X".to_string(),
                student_name: Some("Ravi".to_string()),
                status: Some("Placed".to_string()),
                ctc: Some(600000.0),
                ..Default::default()
            },
            placed_date: NaiveDate::from_ymd_opt(2024, 2, 1),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ctc_edit_logs_old_and_new_values() {
        let schema = RosterSchema::default();
        let edit = parse_edit("ctc", "650000").unwrap();
        let plan = plan_edits(&stored(), &[edit], at(), &schema);
        assert_eq!(plan.log.len(), 1);
        assert_eq!(plan.log[0].field, Field::Ctc);
        assert_eq!(plan.log[0].old_value.as_deref(), Some("600000"));
        assert_eq!(plan.log[0].new_value.as_deref(), Some("650000"));
        assert_eq!(plan.log[0].student_name.as_deref(), Some("Ravi"));
    }

    #[test]
    fn same_value_is_a_no_op() {
        let schema = RosterSchema::default();
        let edit = parse_edit("ctc", "600000.0").unwrap();
        let plan = plan_edits(&stored(), &[edit], at(), &schema);
        assert!(plan.changes.is_empty());
        assert!(!plan.mutates());
    }

    #[test]
    fn status_edits_maintain_placed_date() {
        let schema = RosterSchema::default();
        let again = plan_edits(&stored(), &[parse_edit("status", "Placed").unwrap()], at(), &schema);
        assert_eq!(again.record.placed_date, NaiveDate::from_ymd_opt(2024, 2, 1));

        let away = plan_edits(&stored(), &[parse_edit("status", "Unplaced").unwrap()], at(), &schema);
        assert_eq!(away.record.placed_date, None);
        assert!(away.derived_changed);
        assert_eq!(away.log.len(), 1);

        let back = plan_edits(&away.record, &[parse_edit("status", "Placed").unwrap()], at(), &schema);
        assert_eq!(back.record.placed_date, Some(at().date_naive()));
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(parse_edit("ctc", "lots"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("backlogs", "two"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("email", "ravi@"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("mobile_number", "98765"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("reg_no", "Y"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("placed_date", "2024-01-01"), Err(EngineError::Validation { .. })));
        assert!(matches!(parse_edit("salary", "1"), Err(EngineError::Validation { .. })));
    }

    #[test]
    fn accepts_valid_values_and_clears() {
        assert_eq!(
            parse_edit("email", "ravi@college.edu").unwrap().value,
            FieldValue::Text("ravi@college.edu".to_string())
        );
        assert!(parse_edit("mobile_number", "+91 98765 43210").is_ok());
        assert_eq!(parse_edit("ctc", "  ").unwrap().value, FieldValue::Null);
        assert_eq!(parse_edit("percent_10", "0.92").unwrap().value, FieldValue::Number(92.0));
    }

    #[test]
    fn repeated_field_collapses_to_one_change() {
        let schema = RosterSchema::default();
        let edits = vec![parse_edit("ctc", "700000").unwrap(), parse_edit("ctc", "650000").unwrap()];
        let plan = plan_edits(&stored(), &edits, at(), &schema);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].old_value.as_deref(), Some("600000"));
        assert_eq!(plan.changes[0].new_value.as_deref(), Some("650000"));
    }
}
