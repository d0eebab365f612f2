use thiserror::Error;

#[derive(Debug, Error)]
pub enum BursarError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No payment with ID {0}")]
    UnknownPayment(i64),

    #[error("No batch with ID {0}")]
    UnknownBatch(i64),

    #[error("No term with ID {0}")]
    UnknownTerm(i64),

    #[error("No price configured for course {course} in term {term}")]
    MissingPrice { course: i64, term: i64 },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl BursarError {
    /// Coarse bucket recorded on a payment's status row when reconciliation
    /// fails, so exceptions can be triaged by kind.
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnknownPayment(_)
            | Self::UnknownBatch(_)
            | Self::UnknownTerm(_)
            | Self::MissingPrice { .. } => "LOOKUP_FAILURE",
            Self::Json(_) => "DATA_ERROR",
            Self::Settings(_) => "CONFIGURATION_GAP",
            Self::Db(_) | Self::Io(_) => "STORAGE_FAILURE",
            Self::Other(_) => "INTERNAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, BursarError>;
