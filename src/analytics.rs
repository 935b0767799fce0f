//! Aggregate views over the full roster.
//!
//! [`compute`] is a pure function of the roster and the schema; the cache
//! layer decides when to run it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::config::{RosterSchema, SeekingState};
use crate::models::{format_number, StudentRecord};
use crate::trends::{self, PlacementTrends};

const UNKNOWN_GROUP: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeekingCounts {
    pub opted_in: u32,
    pub not_opted: u32,
    pub higher_studies: u32,
    pub unspecified: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensationStats {
    pub count: u32,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    pub name: String,
    pub total: u32,
    pub eligible: u32,
    pub placed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentCourses {
    pub department: String,
    pub courses: Vec<GroupBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployerCount {
    pub company: String,
    pub placed: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderStat {
    pub gender: String,
    pub total: u32,
    pub eligible: u32,
    pub placed: u32,
    pub placement_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub label: String,
    pub lower: f64,
    /// `None` for the open-ended top bucket.
    pub upper: Option<f64>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub course: String,
    pub total: u32,
    pub opted_in: u32,
    pub not_opted_in: u32,
    pub eligible: u32,
    pub backlog_ineligible: u32,
    pub backlog_gap_pct: f64,
    pub any_backlog: u32,
    pub deemed_placed: u32,
    pub placed: u32,
    pub unplaced: u32,
    pub avg_ctc: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentSummary {
    pub department: String,
    pub total: u32,
    pub opted_in: u32,
    pub placed: u32,
    pub placed_pct: f64,
    pub highest_ctc: f64,
    pub avg_ctc: f64,
    pub median_ctc: f64,
    pub employer_count: u32,
    pub employers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBundle {
    pub total_students: u32,
    pub seeking: SeekingCounts,
    pub placed: u32,
    pub eligible: u32,
    pub placement_rate: f64,
    pub compensation: CompensationStats,
    pub status_distribution: Vec<LabelCount>,
    pub by_department: Vec<GroupBreakdown>,
    pub by_course: Vec<GroupBreakdown>,
    pub department_courses: Vec<DepartmentCourses>,
    pub top_employers: Vec<EmployerCount>,
    pub gender: Vec<GenderStat>,
    pub ctc_histogram: Vec<HistogramBucket>,
    pub course_summary: Vec<CourseSummary>,
    pub department_summary: Vec<DepartmentSummary>,
    pub trends: PlacementTrends,
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole` as a percentage to one decimal; zero when `whole` is zero.
pub fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round1(f64::from(part) * 100.0 / f64::from(whole))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    round2(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[mid],
        _ => round2((sorted[mid - 1] + sorted[mid]) / 2.0),
    }
}

fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

fn group_name(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_GROUP)
        .to_string()
}

/// Per-student facts every view is built from.
struct Facts<'a> {
    record: &'a StudentRecord,
    seeking: SeekingState,
    eligible: bool,
    placed: bool,
    deemed_placed: bool,
    /// Positive compensation of a placed student.
    ctc: Option<f64>,
}

impl<'a> Facts<'a> {
    fn new(record: &'a StudentRecord, schema: &RosterSchema) -> Self {
        let status = record.row.status.as_deref();
        let seeking = schema.seeking_state(record.row.seeking_placement.as_deref());
        let placed = schema.is_placed(status);
        Facts {
            record,
            seeking,
            eligible: seeking == SeekingState::OptedIn
                && schema.within_backlog_limit(record.row.backlogs),
            placed,
            deemed_placed: schema.is_deemed_placed(status),
            ctc: record.row.ctc.filter(|ctc| placed && *ctc > 0.0),
        }
    }
}

#[derive(Default)]
struct Tally {
    total: u32,
    opted_in: u32,
    not_opted: u32,
    eligible: u32,
    backlog_ineligible: u32,
    any_backlog: u32,
    placed: u32,
    deemed_placed: u32,
    ctcs: Vec<f64>,
    employers: BTreeSet<String>,
}

impl Tally {
    fn add(&mut self, facts: &Facts<'_>) {
        self.total += 1;
        match facts.seeking {
            SeekingState::OptedIn => {
                self.opted_in += 1;
                if !facts.eligible {
                    self.backlog_ineligible += 1;
                }
            }
            SeekingState::NotOpted => self.not_opted += 1,
            SeekingState::HigherStudies | SeekingState::Unspecified => {}
        }
        if facts.eligible {
            self.eligible += 1;
        }
        if facts.record.row.backlogs.is_some_and(|count| count > 0) {
            self.any_backlog += 1;
        }
        if facts.deemed_placed {
            self.deemed_placed += 1;
        }
        if facts.placed {
            self.placed += 1;
            if let Some(company) = facts.record.row.company_name.as_deref() {
                let company = company.trim();
                if !company.is_empty() {
                    self.employers.insert(company.to_string());
                }
            }
        }
        if let Some(ctc) = facts.ctc {
            self.ctcs.push(ctc);
        }
    }

    fn breakdown(&self, name: &str) -> GroupBreakdown {
        GroupBreakdown {
            name: name.to_string(),
            total: self.total,
            eligible: self.eligible,
            placed: self.placed,
        }
    }
}

fn ranked_employers(facts: &[Facts<'_>], limit: usize) -> Vec<EmployerCount> {
    let mut order: Vec<EmployerCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for fact in facts.iter().filter(|fact| fact.placed) {
        let Some(company) = fact.record.row.company_name.as_deref().map(str::trim) else {
            continue;
        };
        if company.is_empty() {
            continue;
        }
        match index.get(company) {
            Some(&position) => order[position].placed += 1,
            None => {
                index.insert(company.to_string(), order.len());
                order.push(EmployerCount {
                    company: company.to_string(),
                    placed: 1,
                });
            }
        }
    }
    // Stable sort keeps first-encountered order among equal counts.
    order.sort_by(|a, b| b.placed.cmp(&a.placed));
    order.truncate(limit);
    order
}

fn histogram(ctcs: &[f64], unit: f64, bounds: &[f64]) -> Vec<HistogramBucket> {
    let mut buckets: Vec<HistogramBucket> = bounds
        .iter()
        .enumerate()
        .map(|(i, lower)| {
            let upper = bounds.get(i + 1).copied();
            let label = match upper {
                Some(upper) => format!("{}-{}", format_number(*lower), format_number(upper)),
                None => format!("{}+", format_number(*lower)),
            };
            HistogramBucket {
                label,
                lower: *lower,
                upper,
                count: 0,
            }
        })
        .collect();

    let unit = if unit > 0.0 { unit } else { 1.0 };
    for ctc in ctcs.iter().map(|ctc| ctc / unit) {
        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| ctc >= b.lower && b.upper.map_or(true, |upper| ctc < upper))
        {
            bucket.count += 1;
        }
    }
    buckets
}

pub fn compute(records: &[StudentRecord], schema: &RosterSchema) -> AnalyticsBundle {
    let facts: Vec<Facts<'_>> = records.iter().map(|r| Facts::new(r, schema)).collect();

    let mut overall = Tally::default();
    let mut seeking = SeekingCounts::default();
    let mut statuses: BTreeMap<String, u32> = BTreeMap::new();
    let mut departments: BTreeMap<String, Tally> = BTreeMap::new();
    let mut courses: BTreeMap<String, Tally> = BTreeMap::new();
    let mut nested: BTreeMap<String, BTreeMap<String, Tally>> = BTreeMap::new();
    let mut genders: BTreeMap<String, Tally> = BTreeMap::new();
    let mut placed_dates = Vec::new();

    for fact in &facts {
        let row = &fact.record.row;
        overall.add(fact);
        match fact.seeking {
            SeekingState::OptedIn => seeking.opted_in += 1,
            SeekingState::NotOpted => seeking.not_opted += 1,
            SeekingState::HigherStudies => seeking.higher_studies += 1,
            SeekingState::Unspecified => seeking.unspecified += 1,
        }
        *statuses.entry(group_name(row.status.as_deref())).or_default() += 1;

        let department = group_name(row.department.as_deref());
        let course = group_name(row.course.as_deref());
        departments.entry(department.clone()).or_default().add(fact);
        courses.entry(course.clone()).or_default().add(fact);
        nested
            .entry(department)
            .or_default()
            .entry(course)
            .or_default()
            .add(fact);
        genders
            .entry(group_name(row.gender.as_deref()))
            .or_default()
            .add(fact);

        if fact.placed {
            if let Some(date) = fact.record.placed_date {
                placed_dates.push(date);
            }
        }
    }

    AnalyticsBundle {
        total_students: overall.total,
        seeking,
        placed: overall.placed,
        eligible: overall.eligible,
        placement_rate: percent(overall.placed, overall.eligible),
        compensation: CompensationStats {
            count: overall.ctcs.len() as u32,
            mean: mean(&overall.ctcs),
            median: median(&overall.ctcs),
            max: max(&overall.ctcs),
            min: min(&overall.ctcs),
        },
        status_distribution: statuses
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect(),
        by_department: departments.iter().map(|(name, t)| t.breakdown(name)).collect(),
        by_course: courses.iter().map(|(name, t)| t.breakdown(name)).collect(),
        department_courses: nested
            .iter()
            .map(|(department, courses)| DepartmentCourses {
                department: department.clone(),
                courses: courses.iter().map(|(name, t)| t.breakdown(name)).collect(),
            })
            .collect(),
        top_employers: ranked_employers(&facts, schema.top_employers),
        gender: genders
            .iter()
            .map(|(gender, t)| GenderStat {
                gender: gender.clone(),
                total: t.total,
                eligible: t.eligible,
                placed: t.placed,
                placement_rate: percent(t.placed, t.eligible),
            })
            .collect(),
        ctc_histogram: histogram(&overall.ctcs, schema.ctc_unit, &schema.ctc_buckets),
        course_summary: courses
            .iter()
            .map(|(course, t)| CourseSummary {
                course: course.clone(),
                total: t.total,
                opted_in: t.opted_in,
                not_opted_in: t.not_opted,
                eligible: t.eligible,
                backlog_ineligible: t.backlog_ineligible,
                backlog_gap_pct: percent(t.backlog_ineligible, t.opted_in),
                any_backlog: t.any_backlog,
                deemed_placed: t.deemed_placed,
                placed: t.placed,
                unplaced: t.eligible.saturating_sub(t.placed + t.deemed_placed),
                avg_ctc: mean(&t.ctcs),
            })
            .collect(),
        department_summary: departments
            .iter()
            .map(|(department, t)| DepartmentSummary {
                department: department.clone(),
                total: t.total,
                opted_in: t.opted_in,
                placed: t.placed,
                placed_pct: percent(t.placed, t.opted_in),
                highest_ctc: max(&t.ctcs),
                avg_ctc: mean(&t.ctcs),
                median_ctc: median(&t.ctcs),
                employer_count: t.employers.len() as u32,
                employers: t.employers.iter().cloned().collect(),
            })
            .collect(),
        trends: trends::placement_trends(&placed_dates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StudentRow;
    use chrono::NaiveDate;

    struct Student<'a> {
        reg_no: String,
        seeking: &'a str,
        backlogs: Option<i32>,
        status: &'a str,
        company: Option<&'a str>,
        ctc: Option<f64>,
        department: &'a str,
        course: &'a str,
        gender: &'a str,
        placed_date: Option<NaiveDate>,
    }

    impl<'a> Student<'a> {
        fn new(reg_no: usize) -> Self {
            Student {
                reg_no: format!("R{reg_no:03}"),
                seeking: "Yes",
                backlogs: Some(0),
                status: "Unplaced",
                company: None,
                ctc: None,
                department: "CSE",
                course: "B.Tech",
                gender: "F",
                placed_date: None,
            }
        }

        fn build(self) -> StudentRecord {
            StudentRecord {
                row: StudentRow {
                    reg_no: self.reg_no,
                    seeking_placement: Some(self.seeking.to_string()),
                    backlogs: self.backlogs,
                    status: Some(self.status.to_string()),
                    company_name: self.company.map(str::to_string),
                    ctc: self.ctc,
                    department: Some(self.department.to_string()),
                    course: Some(self.course.to_string()),
                    gender: Some(self.gender.to_string()),
                    ..Default::default()
                },
                placed_date: self.placed_date,
            }
        }
    }

    #[test]
    fn eligibility_and_placement_rate() {
        let schema = RosterSchema::default();
        let records: Vec<StudentRecord> = (0..100)
            .map(|i| {
                let mut student = Student::new(i);
                if i < 10 {
                    student.backlogs = Some(3 + (i as i32 % 2));
                } else if i < 55 {
                    student.status = "Placed";
                }
                student.build()
            })
            .collect();

        let bundle = compute(&records, &schema);
        assert_eq!(bundle.seeking.opted_in, 100);
        assert_eq!(bundle.eligible, 90);
        assert_eq!(bundle.placed, 45);
        assert_eq!(bundle.placement_rate, 50.0);
    }

    #[test]
    fn missing_backlogs_are_eligible() {
        let schema = RosterSchema::default();
        let mut student = Student::new(1);
        student.backlogs = None;
        let bundle = compute(&[student.build()], &schema);
        assert_eq!(bundle.eligible, 1);
    }

    #[test]
    fn empty_roster_has_zeroed_statistics() {
        let bundle = compute(&[], &RosterSchema::default());
        assert_eq!(bundle.placement_rate, 0.0);
        assert_eq!(bundle.compensation, CompensationStats::default());
        assert!(bundle.top_employers.is_empty());
        assert_eq!(bundle.ctc_histogram.len(), 8);
        assert!(bundle.trends.daily.labels.is_empty());
    }

    #[test]
    fn compensation_uses_placed_positive_values() {
        let schema = RosterSchema {
            ctc_unit: 1.0,
            ..RosterSchema::default()
        };
        let mut records = Vec::new();
        for (i, ctc) in [3.0, 5.0, 9.0, 15.0].into_iter().enumerate() {
            let mut student = Student::new(i);
            student.status = "Placed";
            student.ctc = Some(ctc);
            records.push(student.build());
        }
        let mut zero = Student::new(10);
        zero.status = "Placed";
        zero.ctc = Some(0.0);
        records.push(zero.build());
        let mut unplaced = Student::new(11);
        unplaced.ctc = Some(40.0);
        records.push(unplaced.build());

        let bundle = compute(&records, &schema);
        assert_eq!(bundle.compensation.count, 4);
        assert_eq!(bundle.compensation.mean, 8.0);
        assert_eq!(bundle.compensation.median, 7.0);
        assert_eq!(bundle.compensation.max, 15.0);
        assert_eq!(bundle.compensation.min, 3.0);

        let counts: Vec<(String, u32)> = bundle
            .ctc_histogram
            .iter()
            .map(|b| (b.label.clone(), b.count))
            .collect();
        assert_eq!(counts[1], ("2-4".to_string(), 1));
        assert_eq!(counts[2], ("4-6".to_string(), 1));
        assert_eq!(counts[4], ("8-10".to_string(), 1));
        assert_eq!(counts[7], ("14+".to_string(), 1));
    }

    #[test]
    fn employers_rank_by_count_then_first_seen() {
        let schema = RosterSchema::default();
        let companies = ["Infosys", "TCS", "TCS", "Wipro", "Infosys", "Zoho"];
        let records: Vec<StudentRecord> = companies
            .iter()
            .enumerate()
            .map(|(i, company)| {
                let mut student = Student::new(i);
                student.status = "Placed";
                student.company = Some(*company);
                student.build()
            })
            .collect();

        let bundle = compute(&records, &schema);
        let ranking: Vec<(&str, u32)> = bundle
            .top_employers
            .iter()
            .map(|e| (e.company.as_str(), e.placed))
            .collect();
        assert_eq!(
            ranking,
            vec![("Infosys", 2), ("TCS", 2), ("Wipro", 1), ("Zoho", 1)]
        );
    }

    #[test]
    fn course_and_department_summaries() {
        let schema = RosterSchema::default();
        let mut records = Vec::new();

        let mut placed = Student::new(1);
        placed.status = "Placed";
        placed.company = Some("Acme");
        placed.ctc = Some(6.0);
        records.push(placed.build());

        let mut deemed = Student::new(2);
        deemed.status = "Deemed Placed";
        records.push(deemed.build());

        let mut blocked = Student::new(3);
        blocked.backlogs = Some(4);
        records.push(blocked.build());

        records.push(Student::new(4).build());

        let mut opted_out = Student::new(5);
        opted_out.seeking = "No";
        opted_out.backlogs = Some(1);
        records.push(opted_out.build());

        let mut other = Student::new(6);
        other.department = "ECE";
        other.course = "M.Tech";
        other.gender = "M";
        records.push(other.build());

        let bundle = compute(&records, &schema);

        let btech = &bundle.course_summary[0];
        assert_eq!(btech.course, "B.Tech");
        assert_eq!(btech.total, 5);
        assert_eq!(btech.opted_in, 4);
        assert_eq!(btech.not_opted_in, 1);
        assert_eq!(btech.eligible, 3);
        assert_eq!(btech.backlog_ineligible, 1);
        assert_eq!(btech.backlog_gap_pct, 25.0);
        assert_eq!(btech.any_backlog, 2);
        assert_eq!(btech.deemed_placed, 1);
        assert_eq!(btech.placed, 1);
        assert_eq!(btech.unplaced, 1);
        assert_eq!(btech.avg_ctc, 6.0);

        let cse = &bundle.department_summary[0];
        assert_eq!(cse.department, "CSE");
        assert_eq!(cse.opted_in, 4);
        assert_eq!(cse.placed_pct, 25.0);
        assert_eq!(cse.employers, vec!["Acme".to_string()]);
        assert_eq!(cse.employer_count, 1);

        assert_eq!(bundle.department_courses.len(), 2);
        assert_eq!(bundle.department_courses[1].courses[0].name, "M.Tech");

        let female = bundle.gender.iter().find(|g| g.gender == "F").unwrap();
        assert_eq!(female.eligible, 3);
        assert_eq!(female.placement_rate, 33.3);
    }

    #[test]
    fn trends_use_placed_records_only() {
        let schema = RosterSchema::default();
        let mut a = Student::new(1);
        a.status = "Placed";
        a.placed_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let mut b = Student::new(2);
        b.status = "Placed";
        b.placed_date = NaiveDate::from_ymd_opt(2024, 1, 5);
        let bundle = compute(&[a.build(), b.build()], &schema);
        assert_eq!(bundle.trends.daily.incremental, vec![1, 0, 0, 0, 1]);
        assert_eq!(bundle.trends.daily.cumulative, vec![1, 1, 1, 1, 2]);
    }

    #[test]
    fn histogram_buckets_rupees_in_lakhs() {
        let schema = RosterSchema::default();
        let mut student = Student::new(1);
        student.status = "Placed";
        student.ctc = Some(600000.0);
        let bundle = compute(&[student.build()], &schema);
        let hit: Vec<&str> = bundle
            .ctc_histogram
            .iter()
            .filter(|b| b.count > 0)
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(hit, vec!["6-8"]);
        assert_eq!(bundle.compensation.max, 600000.0);
    }

    #[test]
    fn lowercase_status_is_not_placed() {
        let schema = RosterSchema::default();
        let mut student = Student::new(1);
        student.status = "placed";
        student.placed_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        let bundle = compute(&[student.build()], &schema);
        assert_eq!(bundle.placed, 0);
        assert!(bundle.trends.daily.labels.is_empty());
    }
}
