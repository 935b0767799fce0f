use chrono::NaiveDate;

use crate::config::RosterSchema;
use crate::models::StudentRecord;

/// Placement date a record should carry after its status becomes `new_status`.
///
/// The first transition into "Placed" wins: a record that was already placed
/// keeps its date. Leaving "Placed" always clears it.
pub fn next_placed_date(
    previous: Option<&StudentRecord>,
    new_status: Option<&str>,
    effective: NaiveDate,
    schema: &RosterSchema,
) -> Option<NaiveDate> {
    if !schema.is_placed(new_status) {
        return None;
    }
    previous
        .filter(|record| schema.is_placed(record.row.status.as_deref()))
        .and_then(|record| record.placed_date)
        .or(Some(effective))
}

/// Re-derives the placement date on `record` against its prior state.
pub fn maintain(
    record: &mut StudentRecord,
    previous: Option<&StudentRecord>,
    effective: NaiveDate,
    schema: &RosterSchema,
) {
    record.placed_date = next_placed_date(previous, record.row.status.as_deref(), effective, schema);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRow;

    fn record(status: Option<&str>, placed_date: Option<NaiveDate>) -> StudentRecord {
        StudentRecord {
            row: StudentRow {
                reg_no: "R1".to_string(),
                status: status.map(str::to_string),
                ..Default::default()
            },
            placed_date,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn first_transition_sets_effective_date() {
        let schema = RosterSchema::default();
        let before = record(Some("Unplaced"), None);
        assert_eq!(
            next_placed_date(Some(&before), Some("Placed"), day(10), &schema),
            Some(day(10))
        );
        assert_eq!(next_placed_date(None, Some(" Placed "), day(11), &schema), Some(day(11)));
        assert_eq!(next_placed_date(None, Some("placed"), day(11), &schema), None);
    }

    #[test]
    fn staying_placed_keeps_original_date() {
        let schema = RosterSchema::default();
        let before = record(Some("Placed"), Some(day(1)));
        assert_eq!(
            next_placed_date(Some(&before), Some("Placed"), day(20), &schema),
            Some(day(1))
        );
    }

    #[test]
    fn leaving_placed_clears_date() {
        let schema = RosterSchema::default();
        let before = record(Some("Placed"), Some(day(1)));
        assert_eq!(next_placed_date(Some(&before), Some("Unplaced"), day(2), &schema), None);
        assert_eq!(next_placed_date(Some(&before), None, day(2), &schema), None);
    }

    #[test]
    fn stale_date_on_unplaced_record_is_not_reused() {
        let schema = RosterSchema::default();
        let before = record(Some("Unplaced"), Some(day(1)));
        assert_eq!(
            next_placed_date(Some(&before), Some("Placed"), day(5), &schema),
            Some(day(5))
        );
    }

    #[test]
    fn maintain_rewrites_record() {
        let schema = RosterSchema::default();
        let before = record(Some("Placed"), Some(day(1)));
        let mut after = record(Some("Placed"), None);
        maintain(&mut after, Some(&before), day(9), &schema);
        assert_eq!(after.placed_date, Some(day(1)));
    }
}
