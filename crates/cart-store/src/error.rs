use domain::CartError;
use thiserror::Error;

use crate::retry::RetryExhausted;

/// Errors that can occur when interacting with the cart and order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent writer changed the record between read and write, or
    /// won a uniqueness race.
    #[error("Concurrent modification of {entity} {id}")]
    Conflict { entity: &'static str, id: String },

    /// Conflicts persisted past the retry budget.
    #[error(transparent)]
    RetriesExhausted(#[from] RetryExhausted),

    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The cart rejected the change; nothing was written.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// A persisted row could not be mapped back into the domain.
    #[error("Corrupt {entity} record: {reason}")]
    Corrupt { entity: &'static str, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn conflict(entity: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn corrupt(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            entity,
            reason: reason.into(),
        }
    }

    /// True for errors a caller may resolve by reloading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True for a conflict that survived every retry.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::RetriesExhausted(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(StoreError::conflict("cart", "abc").is_conflict());
        assert!(!StoreError::not_found("cart", "abc").is_conflict());
        assert!(
            !StoreError::from(RetryExhausted {
                operation: "upsert_line",
                attempts: 3
            })
            .is_conflict()
        );
    }

    #[test]
    fn messages_name_the_entity() {
        let err = StoreError::not_found("cart", "42");
        assert_eq!(err.to_string(), "cart not found: 42");

        let err = StoreError::conflict("cart", "42");
        assert_eq!(err.to_string(), "Concurrent modification of cart 42");
    }
}
