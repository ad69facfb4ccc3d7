use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Duplicate key {key} for entity '{entity}'")]
    DuplicateKey { entity: String, key: String },

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Query translation error: {0}")]
    Translation(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Query returned {0} results where at most one was expected")]
    NonUniqueResult(usize),

    #[error("Unit of work timed out: {0}")]
    Timeout(String),

    #[error("Unit of work cancelled")]
    Cancelled,
}

impl DbError {
    /// Errors raised by the data source while applying writes.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Mapping(err.to_string())
    }
}
