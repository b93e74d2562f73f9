//! # opencare-core: Pure Domain Types
//!
//! Domain model for the OpenCare offline-first clinical records store.
//!
//! ## What Lives Here
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         opencare-core                               │
//! │                                                                     │
//! │   types.rs       Entities (Patient, Measurement, ...) and the      │
//! │                  per-record SyncStatus state machine               │
//! │   payload.rs     Server-shaped wire payloads + push/pull responses │
//! │   validation.rs  Local precondition checks (fail loudly)           │
//! │                                                                     │
//! │   NO I/O. No async. No database. No network.                       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Sync Status State Machine
//! Every synced record carries a [`SyncStatus`]:
//! - `Pending`: has local changes not yet confirmed by the server
//! - `Done`: matches the last known server state
//! - `Invalid`: the server rejected the last pushed version; never retried
//!   automatically until a local edit resets it to `Pending`

pub mod payload;
pub mod types;
pub mod validation;

pub use payload::{
    AddressPayload, AppointmentPayload, BusinessIdPayload, MeasurementPayload,
    MedicalHistoryPayload, PatientPayload, PhoneNumberPayload, PrescriptionPayload, PullResponse,
    PushResponse, ValidationError,
};
pub use types::{
    Address, Answer, Appointment, AppointmentStatus, BusinessId, Facility, Gender, Measurement,
    MedicalHistory, Patient, PatientProfile, PatientStatus, PhoneNumber, PhoneType, Prescription,
    RecordType, SyncStatus,
};
pub use validation::DomainError;

/// Generates a new client-side record id (UUID v4).
///
/// UUID v4 ids are globally unique without coordination, which is what makes
/// offline record creation safe.
pub fn generate_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_record_ids_are_distinct_canonical_uuids() {
        let a = generate_record_id();
        let b = generate_record_id();
        assert_ne!(a, b);

        let parsed = uuid::Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(a, parsed.to_string());
    }
}
