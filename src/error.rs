use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unreadable input: {0}")]
    UnreadableInput(String),

    #[error("invalid template, please upload the MIS format; missing columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for EngineError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<csv::Error> for EngineError {
    fn from(error: csv::Error) -> Self {
        Self::UnreadableInput(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(format!("analytics payload: {error}"))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_names_missing_columns() {
        let error = EngineError::SchemaMismatch {
            missing: vec!["CTC".to_string(), "12%".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "invalid template, please upload the MIS format; missing columns: CTC, 12%"
        );
    }
}
