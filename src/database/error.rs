use std::fmt;

/// Storage-layer error classification.
#[derive(Debug, Clone)]
pub enum DatabaseErrorKind {
    /// Row lookup found nothing.
    NotFound { entity: String, id: String },
    /// A unique constraint was violated (e.g. duplicate correlation id).
    UniqueViolation { constraint: String },
    /// Connection acquisition or pool failure; worth retrying.
    Connection { message: String },
    /// Everything else.
    Unknown { message: String },
}

#[derive(Debug, Clone)]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Connection { .. })
    }

    /// Map a sqlx error onto the storage taxonomy, pulling out unique
    /// violations so callers can treat duplicates as a distinct case.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            }),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::new(DatabaseErrorKind::Connection {
                    message: err.to_string(),
                })
            }
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    })
                } else {
                    DatabaseError::new(DatabaseErrorKind::Unknown {
                        message: db_err.to_string(),
                    })
                }
            }
            _ => DatabaseError::new(DatabaseErrorKind::Unknown {
                message: err.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::NotFound { entity, id } => {
                write!(f, "{} not found: {}", entity, id)
            }
            DatabaseErrorKind::UniqueViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::Connection { message } => {
                write!(f, "database connection error: {}", message)
            }
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}
