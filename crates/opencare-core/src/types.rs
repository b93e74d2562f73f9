//! # Domain Types
//!
//! Entities held in the local record store, plus the sync-status state
//! machine that governs how each row participates in synchronization.
//!
//! ## Common Shape
//! Every synced entity carries:
//! - `id`: client-generated UUID v4 string - immutable, never reused
//! - `created_at` / `updated_at`: UTC timestamps, `updated_at >= created_at`
//! - `deleted_at`: soft-delete tombstone; once set, never cleared
//! - `sync_status`: [`SyncStatus`]
//!
//! ## Ownership
//! `Address`, `PhoneNumber` and `BusinessId` belong to a patient via
//! `patient_id` but are independently soft-deleted and independently merged.
//! Deleting a patient never cascades.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Sync Status
// =============================================================================

/// Per-record sync state.
///
/// Transitions:
/// - local create/update/delete -> `Pending`
/// - push acknowledged for a batch of ids -> `Done` for exactly those ids
/// - push response lists a validation error for an id -> `Invalid`,
///   overriding the `Done` just set
/// - pull merge for an id with no local pending edit -> `Done`
/// - pull merge for an id with a local `Pending`/`Invalid` row -> row kept,
///   status unchanged (local edit wins)
///
/// Nothing ever moves `Invalid` back automatically; only an explicit local
/// edit returns it to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum SyncStatus {
    Pending,
    Done,
    Invalid,
}

impl SyncStatus {
    /// Stable string form, matching what is stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Done => "done",
            SyncStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Record Type
// =============================================================================

/// The entity types managed by the sync engine.
///
/// Used as the key for continuation-token slots, worker labels and change
/// events. Patient covers the bundled dependents (address, phone numbers,
/// business identifiers) which sync inside the patient payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Patient,
    Measurement,
    Prescription,
    Appointment,
    MedicalHistory,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Patient => "patient",
            RecordType::Measurement => "measurement",
            RecordType::Prescription => "prescription",
            RecordType::Appointment => "appointment",
            RecordType::MedicalHistory => "medical_history",
        }
    }

    /// All record types, in the order workers are usually spawned.
    pub fn all() -> [RecordType; 5] {
        [
            RecordType::Patient,
            RecordType::Measurement,
            RecordType::Prescription,
            RecordType::Appointment,
            RecordType::MedicalHistory,
        ]
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Supporting Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum Gender {
    Female,
    Male,
    Transgender,
}

/// Whether the patient is still in care at this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum PatientStatus {
    Active,
    Dead,
    Migrated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum PhoneType {
    Mobile,
    Landline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Visited,
}

/// Three-valued answer used by medical history questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum Answer {
    Yes,
    No,
    Unanswered,
}

// =============================================================================
// Entities
// =============================================================================

/// A registered patient.
///
/// `date_of_birth` and `age` are alternatives: a patient must carry at least
/// one of them (see [`crate::validation`]). `recorded_at` is a denormalized
/// marker for the patient's earliest encounter, maintained from the patient's
/// measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Patient {
    pub id: String,
    pub full_name: String,
    pub gender: Gender,
    pub date_of_birth: Option<NaiveDate>,
    pub age: Option<i64>,
    pub status: PatientStatus,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Address {
    pub id: String,
    pub patient_id: String,
    pub street_address: Option<String>,
    pub village_or_colony: Option<String>,
    pub district: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PhoneNumber {
    pub id: String,
    pub patient_id: String,
    pub number: String,
    pub phone_type: PhoneType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

/// An external identifier for a patient (e.g. a BP passport number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BusinessId {
    pub id: String,
    pub patient_id: String,
    pub identifier: String,
    pub identifier_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

/// A blood-pressure measurement taken at a facility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Measurement {
    pub id: String,
    pub patient_id: String,
    pub facility_id: String,
    pub systolic: i64,
    pub diastolic: i64,
    /// When the reading was taken; may predate `created_at` for backfilled
    /// entries.
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub facility_id: String,
    pub name: String,
    pub dosage: Option<String>,
    pub rxnorm_code: Option<String>,
    pub is_protocol_drug: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub facility_id: String,
    pub scheduled_date: NaiveDate,
    pub status: AppointmentStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MedicalHistory {
    pub id: String,
    pub patient_id: String,
    pub diagnosed_with_hypertension: Answer,
    pub has_had_heart_attack: Answer,
    pub has_had_stroke: Answer,
    pub has_had_kidney_disease: Answer,
    pub has_diabetes: Answer,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
}

/// Reference data: a clinic/health facility.
///
/// Facilities are pulled read-only and survive the bulk local-data wipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub district: Option<String>,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Patient Profile
// =============================================================================

/// A patient together with its owned dependents.
///
/// This is the unit the patient sync pushes and pulls: the server bundles a
/// patient with its address, phone numbers and business identifiers in one
/// payload. Each row still merges independently under the per-id rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub patient: Patient,
    pub address: Option<Address>,
    pub phone_numbers: Vec<PhoneNumber>,
    pub business_ids: Vec<BusinessId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_string_form_matches_storage() {
        assert_eq!(SyncStatus::Pending.as_str(), "pending");
        assert_eq!(SyncStatus::Done.as_str(), "done");
        assert_eq!(SyncStatus::Invalid.as_str(), "invalid");
    }

    #[test]
    fn record_type_all_covers_every_variant() {
        let all = RecordType::all();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].as_str(), "patient");
        assert_eq!(all[4].to_string(), "medical_history");
    }
}
