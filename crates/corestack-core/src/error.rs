//! The closed exception taxonomy every persistence failure presents as.

use std::fmt;

use thiserror::Error;

/// A boxed backend-native cause, preserved alongside the translated error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every persistence failure surfaced to callers is exactly one of these.
///
/// Adapters translate backend-native errors into this taxonomy at the
/// boundary; repository methods never leak a backend-native error.
#[derive(Debug, Error)]
pub enum Error {
    /// A `get*` lookup missed. `find*` methods never raise this; they
    /// return `None` instead.
    #[error("{entity_type} not found: {identifier}")]
    EntityNotFound {
        /// Entity type name.
        entity_type: String,
        /// The id or uuid that was looked up.
        identifier: String,
    },

    /// A unique or composite-unique constraint was violated on insert.
    #[error("duplicate {entity_type} on {field}: {value}")]
    DuplicateEntity {
        /// Entity type name.
        entity_type: String,
        /// The field or composite-field name the constraint covers.
        field: String,
        /// The duplicate value (formatted for diagnostics).
        value: String,
    },

    /// A malformed query, a cardinality mismatch, or an aggregate overflow.
    #[error("query error on {entity_type}: {message}")]
    QueryError {
        /// Entity type name.
        entity_type: String,
        /// Description of the malformed query.
        message: String,
    },

    /// A transaction failed and every `*InTx` operation in it was rolled back.
    #[error("transaction on {entity_type} rolled back: {message}")]
    TransactionError {
        /// Entity type name the transaction was opened for.
        entity_type: String,
        /// Description of the failure that triggered the rollback.
        message: String,
        /// Always `true`: callers can assume the rollback completed.
        rolled_back: bool,
        /// The backend-native cause, if any.
        #[source]
        cause: Option<BoxError>,
    },

    /// Reserved for future optimistic locking. Never raised today.
    #[error("concurrency conflict on {entity_type}.{identifier}")]
    ConcurrencyError {
        /// Entity type name.
        entity_type: String,
        /// The id or uuid in conflict.
        identifier: String,
    },

    /// The underlying store is out of space or over quota.
    #[error("storage limit exceeded for {entity_type}: {message}")]
    StorageLimitError {
        /// Entity type name.
        entity_type: String,
        /// Backend-reported detail.
        message: String,
    },

    /// Generic catch-all wrapping a backend-native cause.
    #[error("persistence error on {entity_type}: {message}")]
    PersistenceError {
        /// Entity type name.
        entity_type: String,
        /// Human-readable description.
        message: String,
        /// The original backend-native cause.
        #[source]
        cause: Option<BoxError>,
    },
}

impl Error {
    /// The entity type name every variant carries.
    pub fn entity_type(&self) -> &str {
        match self {
            Error::EntityNotFound { entity_type, .. }
            | Error::DuplicateEntity { entity_type, .. }
            | Error::QueryError { entity_type, .. }
            | Error::TransactionError { entity_type, .. }
            | Error::ConcurrencyError { entity_type, .. }
            | Error::StorageLimitError { entity_type, .. }
            | Error::PersistenceError { entity_type, .. } => entity_type,
        }
    }

    /// Build an [`Error::EntityNotFound`].
    pub fn not_found(entity_type: impl Into<String>, identifier: impl fmt::Display) -> Self {
        Error::EntityNotFound {
            entity_type: entity_type.into(),
            identifier: identifier.to_string(),
        }
    }

    /// Build an [`Error::DuplicateEntity`].
    pub fn duplicate(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl fmt::Display,
    ) -> Self {
        Error::DuplicateEntity {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Build an [`Error::TransactionError`] with `rolled_back = true`.
    pub fn transaction(
        entity_type: impl Into<String>,
        message: impl Into<String>,
        cause: Option<BoxError>,
    ) -> Self {
        Error::TransactionError {
            entity_type: entity_type.into(),
            message: message.into(),
            rolled_back: true,
            cause,
        }
    }

    /// Build a [`Error::PersistenceError`] wrapping an arbitrary cause.
    pub fn persistence(
        entity_type: impl Into<String>,
        message: impl Into<String>,
        cause: Option<BoxError>,
    ) -> Self {
        Error::PersistenceError {
            entity_type: entity_type.into(),
            message: message.into(),
            cause,
        }
    }

    /// Whether this error represents a rolled-back transaction.
    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Error::TransactionError { rolled_back: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_entity_type_and_identifier() {
        let err = Error::not_found("Note", "missing-uuid");
        assert_eq!(err.entity_type(), "Note");
        assert!(err.to_string().contains("missing-uuid"));
    }

    #[test]
    fn transaction_error_is_rolled_back() {
        let err = Error::transaction("Note", "version adapter failed", None);
        assert!(err.is_rolled_back());
    }
}
