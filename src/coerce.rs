//! Per-column cleanup applied to normalized spreadsheet cells.
//!
//! Every function here is total: dirty cells become `None` rather than
//! failing the row.

use crate::fields::{Field, ValueKind};
use crate::models::{FieldValue, StudentRow};

const GRADE_PREFIXES: [&str; 4] = ["cgpa", "ogpa", "sgpa", "gpa"];

pub fn coerce_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn coerce_number(raw: &str) -> Option<f64> {
    let cleaned: String = coerce_text(raw)?
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Float-then-int parse, so `"3.0"` from a numeric cell reads as `3`.
pub fn coerce_int(raw: &str) -> Option<i32> {
    let value = coerce_number(raw)?.trunc();
    if value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
        return None;
    }
    Some(value as i32)
}

fn strip_grade_prefix(raw: &str) -> Option<String> {
    let trimmed = coerce_text(raw)?;
    let lowered = trimmed.to_ascii_lowercase();
    let rest = match GRADE_PREFIXES.iter().find(|prefix| lowered.starts_with(*prefix)) {
        Some(prefix) => trimmed[prefix.len()..]
            .trim_start_matches(|c: char| c.is_whitespace() || c == ':' || c == '-'),
        None => trimmed.as_str(),
    };
    let rest = rest.trim().trim_end_matches('%').trim();

    if rest.is_empty() || rest.chars().all(|c| c == '_') {
        return None;
    }
    Some(rest.to_string())
}

pub fn coerce_score(raw: &str) -> Option<f64> {
    coerce_number(&strip_grade_prefix(raw)?)
}

/// Percentages typed as fractions (`0.92`) are scaled to `92`.
///
/// A stored value of 1 or less is read as a fraction again when it comes
/// back through here, so `0.5` becomes `50`. Only values above 1 are stable.
pub fn coerce_percentage(raw: &str) -> Option<f64> {
    let value = coerce_score(raw)?;
    if value > 0.0 && value <= 1.0 {
        return Some((value * 1000.0).round() / 10.0);
    }
    Some(value)
}

pub fn coerce_field(field: Field, raw: &str) -> FieldValue {
    let value = match field.kind() {
        ValueKind::Text => coerce_text(raw).map(FieldValue::Text),
        ValueKind::Number => coerce_number(raw).map(FieldValue::Number),
        ValueKind::Percentage => coerce_percentage(raw).map(FieldValue::Number),
        ValueKind::Score => coerce_score(raw).map(FieldValue::Number),
        ValueKind::Serial | ValueKind::Count => coerce_int(raw).map(FieldValue::Int),
        ValueKind::Date => chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .map(FieldValue::Date),
    };
    value.unwrap_or(FieldValue::Null)
}

/// Builds a canonical row from `(field, raw cell)` pairs.
pub fn coerce_row<'a>(cells: impl IntoIterator<Item = (Field, &'a str)>) -> StudentRow {
    let mut row = StudentRow::default();
    for (field, raw) in cells {
        row.set(field, coerce_field(field, raw));
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_percentages_are_scaled() {
        assert_eq!(coerce_percentage("0.92"), Some(92.0));
        assert_eq!(coerce_percentage("0.856"), Some(85.6));
        assert_eq!(coerce_percentage("1"), Some(100.0));
        assert_eq!(coerce_percentage("78.4"), Some(78.4));
        assert_eq!(coerce_percentage("0"), Some(0.0));
    }

    #[test]
    fn grade_prefixes_and_placeholders() {
        assert_eq!(coerce_score("CGPA 8.5"), Some(8.5));
        assert_eq!(coerce_score("ogpa: 7.25"), Some(7.25));
        assert_eq!(coerce_percentage("cgpa 0.9"), Some(90.0));
        assert_eq!(coerce_percentage("__"), None);
        assert_eq!(coerce_percentage("_"), None);
        assert_eq!(coerce_percentage("85%"), Some(85.0));
    }

    #[test]
    fn serials_tolerate_float_cells() {
        assert_eq!(coerce_int("3.0"), Some(3));
        assert_eq!(coerce_int(" 12 "), Some(12));
        assert_eq!(coerce_int("abc"), None);
        assert_eq!(coerce_int("nan"), None);
        assert_eq!(coerce_int("1e20"), None);
    }

    #[test]
    fn text_nulls() {
        assert_eq!(coerce_text("  Placed "), Some("Placed".to_string()));
        assert_eq!(coerce_text(""), None);
        assert_eq!(coerce_text("NaN"), None);
    }

    #[test]
    fn numbers_never_fail() {
        assert_eq!(coerce_number("6,00,000"), Some(600000.0));
        assert_eq!(coerce_number("inf"), None);
        assert_eq!(coerce_number("six lakh"), None);
    }

    #[test]
    fn rendered_percentage_is_stable() {
        let first = coerce_field(Field::Percent10, "0.92");
        let rendered = first.render().unwrap_or_default();
        assert_eq!(rendered, "92");
        assert_eq!(coerce_field(Field::Percent10, &rendered), first);
    }

    #[test]
    fn small_corrected_percentages_rescale_on_reentry() {
        let first = coerce_field(Field::Percent10, "0.005");
        assert_eq!(first, FieldValue::Number(0.5));
        let rendered = first.render().unwrap_or_default();
        assert_eq!(coerce_field(Field::Percent10, &rendered), FieldValue::Number(50.0));

        let one = coerce_field(Field::Percent12, "0.01");
        assert_eq!(one.render().as_deref(), Some("1"));
        assert_eq!(coerce_field(Field::Percent12, "1"), FieldValue::Number(100.0));
    }

    #[test]
    fn row_from_cells() {
        let row = coerce_row([
            (Field::SrNo, "1.0"),
            (Field::RegNo, " R100 "),
            (Field::Ctc, "450000"),
            (Field::Backlogs, "nan"),
        ]);
        assert_eq!(row.sr_no, Some(1));
        assert_eq!(row.reg_no, "R100");
        assert_eq!(row.ctc, Some(450000.0));
        assert_eq!(row.backlogs, None);
    }
}
