use crate::error::{EngineError, Result};
use crate::fields::Field;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            EngineError::Storage("DATABASE_URL must be set to a Postgres instance".to_string())
        })?;
        let max_connections = match std::env::var("PLACEMENT_MIS_MAX_CONNECTIONS") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                EngineError::validation("PLACEMENT_MIS_MAX_CONNECTIONS", "expected a positive integer")
            })?,
            Err(_) => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}

/// Seeking-placement category a free-text spreadsheet label falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekingState {
    OptedIn,
    NotOpted,
    HigherStudies,
    Unspecified,
}

/// Immutable description of the MIS template and the roster vocabulary.
///
/// Injected into the normalizer, the reconciler and the analytics engine so
/// none of them carry literals of their own.
#[derive(Debug, Clone)]
pub struct RosterSchema {
    /// Required header labels in template order, with the field each maps to.
    pub columns: Vec<(String, Field)>,
    /// Header repairs for labels a spreadsheet tool turned into numbers.
    pub header_aliases: Vec<(String, String)>,
    pub placed_status: String,
    pub deemed_placed_status: String,
    pub opted_in_labels: Vec<String>,
    pub not_opted_labels: Vec<String>,
    pub higher_studies_labels: Vec<String>,
    /// Students with this many backlogs or more are not eligible.
    pub backlog_limit: i32,
    /// Stored CTC is divided by this before bucketing; the default reads
    /// rupees as lakhs per annum.
    pub ctc_unit: f64,
    /// Lower bucket bounds in `ctc_unit`s.
    pub ctc_buckets: Vec<f64>,
    pub top_employers: usize,
}

impl Default for RosterSchema {
    fn default() -> Self {
        let labels = |values: &[&str]| values.iter().map(|v| v.to_string()).collect();
        Self {
            columns: Field::SPREADSHEET
                .into_iter()
                .map(|field| (field.label().to_string(), field))
                .collect(),
            header_aliases: vec![
                ("0.1".to_string(), "10%".to_string()),
                ("0.12".to_string(), "12%".to_string()),
            ],
            placed_status: "Placed".to_string(),
            deemed_placed_status: "Deemed Placed".to_string(),
            opted_in_labels: labels(&["yes", "opted in", "opted-in", "opted", "interested"]),
            not_opted_labels: labels(&["no", "not opted", "opted out", "not interested"]),
            higher_studies_labels: labels(&["higher studies", "higher study"]),
            backlog_limit: 3,
            ctc_unit: 100_000.0,
            ctc_buckets: vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0],
            top_employers: 10,
        }
    }
}

impl RosterSchema {
    /// Exact match on the sentinel; `"placed"` is a different status.
    pub fn is_placed(&self, status: Option<&str>) -> bool {
        status.is_some_and(|s| s.trim() == self.placed_status)
    }

    pub fn is_deemed_placed(&self, status: Option<&str>) -> bool {
        status.is_some_and(|s| s.trim() == self.deemed_placed_status)
    }

    pub fn seeking_state(&self, label: Option<&str>) -> SeekingState {
        let Some(label) = label.map(|l| l.trim().to_ascii_lowercase()) else {
            return SeekingState::Unspecified;
        };
        let matches = |set: &[String]| set.iter().any(|candidate| *candidate == label);
        if matches(&self.opted_in_labels) {
            SeekingState::OptedIn
        } else if matches(&self.not_opted_labels) {
            SeekingState::NotOpted
        } else if matches(&self.higher_studies_labels) {
            SeekingState::HigherStudies
        } else {
            SeekingState::Unspecified
        }
    }

    /// Unknown backlog counts do not disqualify a student.
    pub fn within_backlog_limit(&self, backlogs: Option<i32>) -> bool {
        backlogs.map_or(true, |count| count < self.backlog_limit)
    }

    pub fn resolve_header<'a>(&'a self, header: &'a str) -> &'a str {
        let numeric = header
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(|value| value.to_string());
        let probe = numeric.as_deref().unwrap_or(header);
        self.header_aliases
            .iter()
            .find(|(alias, _)| alias == probe)
            .map_or(header, |(_, canonical)| canonical.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeking_labels_are_case_insensitive() {
        let schema = RosterSchema::default();
        assert_eq!(schema.seeking_state(Some(" Opted In ")), SeekingState::OptedIn);
        assert_eq!(schema.seeking_state(Some("NO")), SeekingState::NotOpted);
        assert_eq!(
            schema.seeking_state(Some("Higher Studies")),
            SeekingState::HigherStudies
        );
        assert_eq!(schema.seeking_state(Some("maybe")), SeekingState::Unspecified);
        assert_eq!(schema.seeking_state(None), SeekingState::Unspecified);
    }

    #[test]
    fn numeric_headers_resolve_to_percentage_labels() {
        let schema = RosterSchema::default();
        assert_eq!(schema.resolve_header("0.1"), "10%");
        assert_eq!(schema.resolve_header("0.10"), "10%");
        assert_eq!(schema.resolve_header("0.12"), "12%");
        assert_eq!(schema.resolve_header("CTC"), "CTC");
    }

    #[test]
    fn missing_backlogs_count_as_eligible() {
        let schema = RosterSchema::default();
        assert!(schema.within_backlog_limit(None));
        assert!(schema.within_backlog_limit(Some(2)));
        assert!(!schema.within_backlog_limit(Some(3)));
    }
}
