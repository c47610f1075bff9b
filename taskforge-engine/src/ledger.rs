//! External currency ledger and session lookup collaborators.
use thiserror::Error;

use crate::ids::SubjectId;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("economy backend is unavailable")]
    Unavailable,
    #[error("deposit of {amount:.2} to {subject} rejected: {reason}")]
    Rejected {
        subject: SubjectId,
        amount: f64,
        reason: String,
    },
}

/// External currency store.
///
/// A failed deposit must leave the balance untouched; the engine never
/// retries a deposit whose outcome it did not observe.
pub trait Ledger: Send + Sync {
    /// Credit `amount` to `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the deposit was not applied.
    fn deposit(&self, subject: &SubjectId, amount: f64) -> Result<(), LedgerError>;
}

/// Tells whether a subject currently has an active session.
pub trait SessionDirectory: Send + Sync {
    fn is_online(&self, subject: &SubjectId) -> bool;
}
