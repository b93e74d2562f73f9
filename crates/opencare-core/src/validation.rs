//! # Local Precondition Checks
//!
//! Preconditions that must hold before a record is allowed anywhere near the
//! store. A violation is a caller bug, not a recoverable condition: the
//! repository layer calls [`Patient::assert_valid`] and panics before any
//! write lands, so the bug surfaces loudly during development and testing
//! instead of producing a row the server will reject forever.

use thiserror::Error;

use crate::types::Patient;

/// Violations of domain preconditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A patient needs a date of birth or an age to be meaningful to any
    /// downstream consumer (age computation, defaulter views, the server).
    #[error("patient {id} must have a date of birth or an age")]
    MissingAgeInformation { id: String },

    /// `updated_at` may never run behind `created_at`.
    #[error("patient {id} has updated_at earlier than created_at")]
    TimestampsOutOfOrder { id: String },
}

impl Patient {
    /// Checks the patient's local preconditions.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.date_of_birth.is_none() && self.age.is_none() {
            return Err(DomainError::MissingAgeInformation {
                id: self.id.clone(),
            });
        }
        if self.updated_at < self.created_at {
            return Err(DomainError::TimestampsOutOfOrder {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Panics if the patient violates a precondition.
    ///
    /// Called on every local save path. Merge-applied writes skip this:
    /// server data already passed server-side validation.
    pub fn assert_valid(&self) {
        if let Err(e) = self.validate() {
            panic!("patient precondition violated: {e}");
        }
    }
}
