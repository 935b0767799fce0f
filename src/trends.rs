use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Parallel series over consecutive periods: placements in the period and
/// placements to date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub labels: Vec<String>,
    pub incremental: Vec<u32>,
    pub cumulative: Vec<u32>,
}

impl TrendSeries {
    fn from_periods<K: Ord>(periods: Vec<(K, String)>, counts: &BTreeMap<K, u32>) -> Self {
        let mut series = TrendSeries::default();
        let mut running = 0;
        for (key, label) in periods {
            let count = counts.get(&key).copied().unwrap_or(0);
            running += count;
            series.labels.push(label);
            series.incremental.push(count);
            series.cumulative.push(running);
        }
        series
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementTrends {
    pub daily: TrendSeries,
    pub weekly: TrendSeries,
    pub monthly: TrendSeries,
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn week_label(monday: NaiveDate) -> String {
    let week = monday.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

fn month_key(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

/// Builds gap-free series from the first to the last placement date.
pub fn placement_trends(dates: &[NaiveDate]) -> PlacementTrends {
    let (Some(first), Some(last)) = (dates.iter().min().copied(), dates.iter().max().copied())
    else {
        return PlacementTrends::default();
    };

    let mut daily: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut weekly: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    let mut monthly: BTreeMap<(i32, u32), u32> = BTreeMap::new();
    for date in dates {
        *daily.entry(*date).or_default() += 1;
        *weekly.entry(week_start(*date)).or_default() += 1;
        *monthly.entry(month_key(*date)).or_default() += 1;
    }

    let days: Vec<(NaiveDate, String)> = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| (day, day.format("%Y-%m-%d").to_string()))
        .collect();

    let last_week = week_start(last);
    let weeks: Vec<(NaiveDate, String)> = week_start(first)
        .iter_weeks()
        .take_while(|monday| *monday <= last_week)
        .map(|monday| (monday, week_label(monday)))
        .collect();

    let mut months = Vec::new();
    let (mut year, mut month) = month_key(first);
    while (year, month) <= month_key(last) {
        months.push(((year, month), format!("{year}-{month:02}")));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    PlacementTrends {
        daily: TrendSeries::from_periods(days, &daily),
        weekly: TrendSeries::from_periods(weeks, &weekly),
        monthly: TrendSeries::from_periods(months, &monthly),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_series_fills_gaps() {
        let trends = placement_trends(&[date(2024, 1, 1), date(2024, 1, 5)]);
        assert_eq!(trends.daily.labels.len(), 5);
        assert_eq!(trends.daily.labels[0], "2024-01-01");
        assert_eq!(trends.daily.labels[4], "2024-01-05");
        assert_eq!(trends.daily.incremental, vec![1, 0, 0, 0, 1]);
        assert_eq!(trends.daily.cumulative, vec![1, 1, 1, 1, 2]);
    }

    #[test]
    fn weekly_series_uses_iso_weeks() {
        let trends = placement_trends(&[date(2023, 12, 29), date(2024, 1, 2), date(2024, 1, 16)]);
        assert_eq!(trends.weekly.labels, vec!["2023-W52", "2024-W01", "2024-W02", "2024-W03"]);
        assert_eq!(trends.weekly.incremental, vec![1, 1, 0, 1]);
        assert_eq!(trends.weekly.cumulative, vec![1, 2, 2, 3]);
    }

    #[test]
    fn monthly_series_crosses_year_boundary() {
        let trends = placement_trends(&[date(2023, 11, 3), date(2024, 2, 10), date(2024, 2, 11)]);
        assert_eq!(trends.monthly.labels, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
        assert_eq!(trends.monthly.incremental, vec![1, 0, 0, 2]);
        assert_eq!(trends.monthly.cumulative, vec![1, 1, 1, 3]);
    }

    #[test]
    fn no_placements_yield_empty_series() {
        assert_eq!(placement_trends(&[]), PlacementTrends::default());
    }
}
