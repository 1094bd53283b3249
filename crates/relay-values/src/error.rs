//! Error types for values elicitation.

use relay_oracle::OracleError;
use relay_types::UserKey;
use thiserror::Error;

/// Errors from the durable values store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A user record for this key already exists.
    #[error("user {0} already has values recorded")]
    AlreadyExists(UserKey),

    #[error("refusing to commit an empty value list")]
    EmptyValues,

    #[error("values store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("values store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("values store task failed: {0}")]
    Task(String),
}

/// Errors from dialogue session storage.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("session history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored session is corrupt: {0}")]
    Corrupt(String),

    #[error("session store task failed: {0}")]
    Task(String),
}

impl SessionStoreError {
    /// The stored record itself cannot be read back, as opposed to the
    /// store being unreachable. Retrying will not help.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::Corrupt(_))
    }
}

/// Why an elicitation did not end in saved values.
///
/// Every variant maps to a fixed user-facing notice; none of these
/// messages is ever shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElicitationError {
    /// The classifier judged the answer not to name any values.
    #[error("answer did not name any values")]
    ValidationRejected,

    /// The classifier could not be reached or its reply was unusable.
    #[error("classifier unavailable: {0}")]
    OracleUnavailable(OracleError),

    /// Session or values storage failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Every follow-up question in the budget was used.
    #[error("attempt budget of {0} follow-up questions exhausted")]
    BudgetExhausted(u32),
}

impl ElicitationError {
    /// Short label for logs and analytics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ValidationRejected => "validation_rejected",
            Self::OracleUnavailable(_) => "oracle_unavailable",
            Self::StorageFailure(_) => "storage_failure",
            Self::BudgetExhausted(_) => "budget_exhausted",
        }
    }
}
