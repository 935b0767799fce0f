use std::fmt::Write;

use crate::analytics::{GroupBreakdown, HistogramBucket};
use crate::cache::CachedAnalytics;
use crate::models::format_number;

const RECENT_PERIODS: usize = 6;

fn group_line(output: &mut String, group: &GroupBreakdown) {
    let _ = writeln!(
        output,
        "- {}: {} placed of {} eligible ({} students)",
        group.name, group.placed, group.eligible, group.total
    );
}

fn bucket_line(output: &mut String, bucket: &HistogramBucket) {
    let _ = writeln!(output, "- CTC {}: {}", bucket.label, bucket.count);
}

/// Renders the analytics bundle as a markdown placement report.
pub fn build_report(cached: &CachedAnalytics) -> String {
    let bundle = &cached.bundle;
    let mut output = String::new();

    let _ = writeln!(output, "# Placement Report");
    let _ = writeln!(
        output,
        "Generated from roster analytics computed {}",
        cached.updated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Students: {}", bundle.total_students);
    let _ = writeln!(
        output,
        "- Opted in: {} / not opted: {} / higher studies: {} / unspecified: {}",
        bundle.seeking.opted_in,
        bundle.seeking.not_opted,
        bundle.seeking.higher_studies,
        bundle.seeking.unspecified
    );
    let _ = writeln!(
        output,
        "- Placed: {} of {} eligible ({:.1}%)",
        bundle.placed, bundle.eligible, bundle.placement_rate
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Compensation");
    let comp = &bundle.compensation;
    if comp.count == 0 {
        let _ = writeln!(output, "No CTC figures recorded for placed students.");
    } else {
        let _ = writeln!(
            output,
            "- {} offers, mean {}, median {}, highest {}, lowest {}",
            comp.count,
            format_number(comp.mean),
            format_number(comp.median),
            format_number(comp.max),
            format_number(comp.min)
        );
        for bucket in bundle.ctc_histogram.iter().filter(|bucket| bucket.count > 0) {
            bucket_line(&mut output, bucket);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");
    if bundle.status_distribution.is_empty() {
        let _ = writeln!(output, "No students on the roster.");
    } else {
        for status in &bundle.status_distribution {
            let _ = writeln!(output, "- {}: {}", status.label, status.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Departments");
    if bundle.department_summary.is_empty() {
        let _ = writeln!(output, "No departments recorded.");
    } else {
        for dept in &bundle.department_summary {
            let _ = writeln!(
                output,
                "- {}: {} placed of {} opted in ({:.1}%), avg CTC {}, {} employers",
                dept.department,
                dept.placed,
                dept.opted_in,
                dept.placed_pct,
                format_number(dept.avg_ctc),
                dept.employer_count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Courses");
    if bundle.by_course.is_empty() {
        let _ = writeln!(output, "No courses recorded.");
    } else {
        for course in &bundle.by_course {
            group_line(&mut output, course);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Employers");
    if bundle.top_employers.is_empty() {
        let _ = writeln!(output, "No placements recorded yet.");
    } else {
        for employer in &bundle.top_employers {
            let _ = writeln!(output, "- {}: {} placed", employer.company, employer.placed);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Placements");
    let monthly = &bundle.trends.monthly;
    if monthly.labels.is_empty() {
        let _ = writeln!(output, "No dated placements recorded.");
    } else {
        let start = monthly.labels.len().saturating_sub(RECENT_PERIODS);
        for index in start..monthly.labels.len() {
            let _ = writeln!(
                output,
                "- {}: {} new ({} total)",
                monthly.labels[index], monthly.incremental[index], monthly.cumulative[index]
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{self, AnalyticsBundle};
    use crate::config::RosterSchema;
    use crate::models::{StudentRecord, StudentRow};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn empty_roster_renders_placeholders() {
        let report = build_report(&CachedAnalytics {
            bundle: AnalyticsBundle::default(),
            updated_at: at(),
        });
        assert!(report.starts_with("# Placement Report"));
        assert!(report.contains("2024-03-01 09:30 UTC"));
        assert!(report.contains("No CTC figures recorded"));
        assert!(report.contains("No placements recorded yet."));
        assert!(report.contains("No dated placements recorded."));
    }

    #[test]
    fn placed_students_show_up_in_sections() {
        let placed = StudentRecord {
            row: StudentRow {
                reg_no: "R1".into(),
                seeking_placement: Some("Yes".into()),
                department: Some("CSE".into()),
                course: Some("B.Tech".into()),
                status: Some("Placed".into()),
                company_name: Some("Acme".into()),
                ctc: Some(600000.0),
                ..Default::default()
            },
            placed_date: NaiveDate::from_ymd_opt(2024, 2, 12),
        };
        let waiting = StudentRecord {
            row: StudentRow {
                reg_no: "R2".into(),
                seeking_placement: Some("Yes".into()),
                department: Some("CSE".into()),
                course: Some("B.Tech".into()),
                status: Some("Unplaced".into()),
                ..Default::default()
            },
            placed_date: None,
        };
        let bundle = analytics::compute(&[placed, waiting], &RosterSchema::default());
        let report = build_report(&CachedAnalytics { bundle, updated_at: at() });

        assert!(report.contains("- Students: 2"));
        assert!(report.contains("- Acme: 1 placed"));
        assert!(report.contains("- 2024-02: 1 new (1 total)"));
        assert!(report.contains("- Placed: 1"));
    }
}
