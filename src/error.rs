use thiserror::Error;

/// Raised by [`crate::dataset::Dataset::get`] when the column is not part of the
/// owning source's schema. An unset cell is `Ok(None)`, never this error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Column \"{0}\" is not defined in schema")]
pub struct ColumnNotFound(pub String);

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Config error in datasource \"{datasource}\": {message}")]
    Config { datasource: String, message: String },
    #[error(transparent)]
    ColumnNotFound(#[from] ColumnNotFound),
    #[error("Datasource \"{datasource}\" could not answer {operation}() in time")]
    Timeout { datasource: String, operation: &'static str },
    #[error("Backend error in datasource \"{datasource}\": {message}")]
    Backend { datasource: String, message: String },
    #[error("Datasource \"{0}\" is not defined")]
    UnknownDatasource(String),
    #[error("Illegal search string: \"{0}\"")]
    InvalidSearchString(String),
    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, TributaryError>;

impl TributaryError {
    pub fn config(datasource: &str, message: impl Into<String>) -> Self {
        Self::Config { datasource: datasource.to_string(), message: message.into() }
    }
    pub fn timeout(datasource: &str, operation: &'static str) -> Self {
        Self::Timeout { datasource: datasource.to_string(), operation }
    }
    pub fn backend(datasource: &str, message: impl Into<String>) -> Self {
        Self::Backend { datasource: datasource.to_string(), message: message.into() }
    }
    /// Configuration errors are fatal to one node; everything else is an access error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Settings(_))
    }
}

// Helper conversions
impl From<rusqlite::Error> for TributaryError {
    fn from(e: rusqlite::Error) -> Self { Self::backend("sqlite", e.to_string()) }
}
impl From<::config::ConfigError> for TributaryError {
    fn from(e: ::config::ConfigError) -> Self { Self::Settings(e.to_string()) }
}
