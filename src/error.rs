/*!
 * Error handling for workbook ingestion, KPI computation and persistence
 *
 * Provides detailed error types with context and suggestions. Data problems
 * inside a workbook are not errors: they skip the sheet or become KPI warnings.
 */

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use serde::{Serialize, Deserialize};

/// Library result type
pub type Result<T> = std::result::Result<T, SnfError>;

/// Hint returned when a workbook yields no facility data
pub const NO_VALID_DATA_HINT: &str =
    "No valid financial data found in workbook. Check sheet naming: facility sheets must be named '<code> (<name>)'";

/// Error types with context and suggestions
#[derive(Error, Debug)]
pub enum SnfError {
    /// File I/O errors with context
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
        context: ErrorContext,
    },

    /// Workbook could not be opened or a sheet could not be read
    #[error("Workbook error: {message}")]
    Workbook {
        message: String,
        context: ErrorContext,
    },

    /// Data validation errors with detailed information
    #[error("Data validation error: {message}")]
    DataValidation {
        message: String,
        field: Option<String>,
        value: Option<String>,
        context: ErrorContext,
    },

    /// File not found with suggestions
    #[error("File not found: {path}")]
    FileNotFound {
        path: PathBuf,
        suggestion: String,
    },

    /// Upload larger than the configured cap
    #[error("Workbook too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    /// Parsing finished but produced nothing usable
    #[error("No valid financial data found in {path}")]
    NoValidData {
        path: PathBuf,
        sheets_seen: usize,
    },

    /// Malformed period id
    #[error("Invalid period '{value}': expected YYYY-MM")]
    InvalidPeriod {
        value: String,
    },

    /// Malformed facility id
    #[error("Invalid facility id '{value}'")]
    InvalidFacilityId {
        value: String,
    },

    /// KPI id not present in the registry
    #[error("Unknown KPI '{kpi_id}'")]
    UnknownKpi {
        kpi_id: String,
        known: Vec<String>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        suggestion: Option<String>,
    },

    /// Export errors
    #[error("Export error: {message}")]
    Export {
        message: String,
        format: ExportFormat,
        suggestion: Option<String>,
    },

    /// Fact store errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// Generic errors with custom message
    #[error("{message}")]
    Custom {
        message: String,
        suggestion: Option<String>,
    },
}

/// Error context providing additional information
#[derive(Debug, Default, Clone)]
pub struct ErrorContext {
    pub file_path: Option<PathBuf>,
    pub sheet_name: Option<String>,
    pub row: Option<u32>,
    pub column: Option<u32>,
}

/// Export format for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    JsonLines,
    Csv,
    Sql,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "JSON"),
            ExportFormat::JsonLines => write!(f, "JSON Lines"),
            ExportFormat::Csv => write!(f, "CSV"),
            ExportFormat::Sql => write!(f, "SQL"),
        }
    }
}

impl SnfError {
    /// Create a file not found error with helpful suggestion
    pub fn file_not_found_with_suggestion(path: PathBuf) -> Self {
        let lower = path.to_string_lossy().to_lowercase();
        let suggestion = if lower.ends_with(".xlsx") || lower.ends_with(".xlsm") || lower.ends_with(".xls") {
            format!(
                "Check if the workbook exists at '{}'. Income-statement workbooks carry one sheet per facility named '<code> (<name>)'.",
                path.display()
            )
        } else if lower.ends_with(".toml") {
            format!(
                "Check if the configuration file exists at '{}'. Run `snfcli registry` to confirm the binary works with defaults.",
                path.display()
            )
        } else {
            format!(
                "Check if the file exists at '{}'. Make sure the path is correct and you have read permissions.",
                path.display()
            )
        };

        Self::FileNotFound { path, suggestion }
    }

    /// Create an invalid period error
    pub fn invalid_period(value: &str) -> Self {
        Self::InvalidPeriod {
            value: value.to_string(),
        }
    }

    /// Create an invalid facility id error
    pub fn invalid_facility_id(value: &str) -> Self {
        Self::InvalidFacilityId {
            value: value.to_string(),
        }
    }

    /// Create an unknown KPI error listing the registry ids
    pub fn unknown_kpi(kpi_id: &str, known: impl IntoIterator<Item = String>) -> Self {
        Self::UnknownKpi {
            kpi_id: kpi_id.to_string(),
            known: known.into_iter().collect(),
        }
    }

    /// Create a workbook error for a specific file
    pub fn workbook(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Workbook {
            message: message.into(),
            context: ErrorContext {
                file_path: Some(path.into()),
                ..Default::default()
            },
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            Self::FileNotFound { suggestion, .. } => {
                format!("{}\n\nSuggestion: {}", self, suggestion)
            }
            Self::NoValidData { .. } => {
                format!("{}\n\n{}", self, NO_VALID_DATA_HINT)
            }
            Self::InvalidPeriod { .. } => {
                format!("{}\n\nExpected format: YYYY-MM (for example 2025-01)", self)
            }
            Self::UnknownKpi { known, .. } => {
                format!("{}\n\nKnown KPIs: {}", self, known.join(", "))
            }
            Self::Configuration { suggestion: Some(sug), .. }
            | Self::Export { suggestion: Some(sug), .. }
            | Self::Custom { suggestion: Some(sug), .. } => {
                format!("{}\n\nSuggestion: {}", self, sug)
            }
            _ => self.to_string(),
        }
    }

    /// True for errors caused by the uploaded file rather than the environment
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound { .. }
                | Self::FileTooLarge { .. }
                | Self::NoValidData { .. }
                | Self::InvalidPeriod { .. }
                | Self::InvalidFacilityId { .. }
                | Self::UnknownKpi { .. }
                | Self::Workbook { .. }
        )
    }
}

// Convenience conversions
impl From<std::io::Error> for SnfError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
            context: ErrorContext::default(),
        }
    }
}

impl From<csv::Error> for SnfError {
    fn from(err: csv::Error) -> Self {
        SnfError::Export {
            message: err.to_string(),
            format: ExportFormat::Csv,
            suggestion: None,
        }
    }
}

impl From<serde_json::Error> for SnfError {
    fn from(err: serde_json::Error) -> Self {
        SnfError::Export {
            message: err.to_string(),
            format: ExportFormat::Json,
            suggestion: Some("Check if the data is serializable to JSON.".to_string()),
        }
    }
}

impl From<calamine::Error> for SnfError {
    fn from(err: calamine::Error) -> Self {
        SnfError::Workbook {
            message: err.to_string(),
            context: ErrorContext::default(),
        }
    }
}

impl From<rusqlite::Error> for SnfError {
    fn from(err: rusqlite::Error) -> Self {
        SnfError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_valid_data_message_carries_hint() {
        let err = SnfError::NoValidData {
            path: PathBuf::from("upload.xlsx"),
            sheets_seen: 3,
        };
        assert!(err.user_message().contains("Check sheet naming"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_workbook_suggestion() {
        let err = SnfError::file_not_found_with_suggestion(PathBuf::from("missing.xlsx"));
        assert!(err.user_message().contains("<code> (<name>)"));
    }
}
