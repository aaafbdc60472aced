//! Error types for the token sequencer and record store.
//!
//! ## Error Cases
//! - `Validation`: one or more submission fields were missing or malformed.
//! - `NotFound`: no record exists for the requested id.
//! - `InvalidStatus`: a status string was neither `Pending` nor `Completed`.
//! - `StoreUnavailable`: the backing database could not be reached or the
//!   write failed. Retryable by the caller.
//! - `CorruptRecord`: a stored row could not be decoded into a record.

/// Re-exported so callers can construct and inspect store failures without
/// depending on `sqlx` directly.
pub use sqlx::Error as SqlxError;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Submission fields that failed validation, in declaration order.
    #[error("Missing or invalid fields: {}", .fields.join(", "))]
    Validation { fields: Vec<&'static str> },

    /// No record with this id exists.
    #[error("Service request {id} not found")]
    NotFound { id: String },

    #[error("Invalid status: {value}")]
    InvalidStatus { value: String },

    /// The backing store failed. No token is consumed when this is returned
    /// from a submission.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Corrupt record: {reason}")]
    CorruptRecord { reason: String },
}

impl Error {
    /// Returns the offending field names for a validation failure.
    pub fn invalid_fields(&self) -> Option<&[&'static str]> {
        match self {
            Self::Validation { fields } => Some(fields),
            _ => None,
        }
    }
}
