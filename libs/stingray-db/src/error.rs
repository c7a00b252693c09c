//! Error types for the data access layer
//!
//! Every failure is fatal for the current logical operation. Nothing in this
//! crate retries; callers own transactional boundaries.

/// Coarse classification of [`DbError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown table or relation name, or the registry was never installed
    MetadataNotFound,
    /// The join tree cannot be turned into SQL
    ShapeViolation,
    /// A physical identifier does not fit into a PostgreSQL name
    IdentifierLengthExceeded,
    /// The database state does not match what the operation expects
    ConcurrencyState,
    /// Invalid caller input or a programmer error in record usage
    Validation,
    /// The database driver reported a failure
    Database,
    /// A row or value could not be converted
    Decode,
}

/// Data access layer errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Table registry is not initialized")]
    RegistryNotInitialized,

    #[error("Table \"{0}\" not found")]
    TableNotFound(String),

    #[error("Table {table} does not have any relations")]
    NoRelations { table: String },

    #[error("Table {table} does not have a relation {relation}")]
    RelationNotFound { table: String, relation: String },

    #[error("Invalid join tree: {0}")]
    ShapeViolation(String),

    #[error("Identifier \"{0}\" exceeds the maximum postgres identifier length")]
    IdentifierLengthExceeded(String),

    #[error("Record not found: {table} #{id}")]
    RecordNotFound { table: String, id: String },

    #[error("Ambiguous record set: {0} records returned")]
    AmbiguousRecordSet(usize),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{side} model does not have property {property}")]
    MissingProperty { side: &'static str, property: String },

    #[error("Cannot decode column {column}")]
    Decode { column: String },

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RegistryNotInitialized
            | Self::TableNotFound(_)
            | Self::NoRelations { .. }
            | Self::RelationNotFound { .. } => ErrorKind::MetadataNotFound,
            Self::ShapeViolation(_) => ErrorKind::ShapeViolation,
            Self::IdentifierLengthExceeded(_) => ErrorKind::IdentifierLengthExceeded,
            Self::RecordNotFound { .. } | Self::AmbiguousRecordSet(_) => ErrorKind::ConcurrencyState,
            Self::Validation(_) | Self::MissingProperty { .. } => ErrorKind::Validation,
            Self::Database(_) => ErrorKind::Database,
            Self::Decode { .. } | Self::Serialization(_) => ErrorKind::Decode,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;
