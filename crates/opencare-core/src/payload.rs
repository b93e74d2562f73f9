//! # Server Payloads
//!
//! Server-shaped representations of entities used on the wire, plus the
//! push/pull response envelopes.
//!
//! Payloads deliberately carry no `sync_status`: pulled data is by definition
//! server-confirmed, and the merge engine decides what status the stored row
//! ends up with. A patient payload bundles its owned dependents; every other
//! type travels flat.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Answer, AppointmentStatus, Gender, PatientProfile, PatientStatus, PhoneType,
};

// =============================================================================
// Entity Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPayload {
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
    pub address: Option<AddressPayload>,
    pub phone_numbers: Vec<PhoneNumberPayload>,
    pub business_ids: Vec<BusinessIdPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressPayload {
    pub id: String,
    pub patient_id: String,
    pub street_address: Option<String>,
    pub village_or_colony: Option<String>,
    pub district: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumberPayload {
    pub id: String,
    pub patient_id: String,
    pub number: String,
    pub phone_type: PhoneType,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessIdPayload {
    pub id: String,
    pub patient_id: String,
    pub identifier: String,
    pub identifier_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPayload {
    pub id: String,
    pub patient_id: String,
    pub facility_id: String,
    pub systolic: i64,
    pub diastolic: i64,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionPayload {
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
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPayload {
    pub id: String,
    pub patient_id: String,
    pub facility_id: String,
    pub scheduled_date: NaiveDate,
    pub status: AppointmentStatus,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistoryPayload {
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
}

// =============================================================================
// Entity -> Payload Conversions (for the push path and for test fixtures)
// =============================================================================

impl PatientPayload {
    pub fn from_profile(profile: &PatientProfile) -> Self {
        let p = &profile.patient;
        PatientPayload {
            id: p.id.clone(),
            full_name: p.full_name.clone(),
            gender: p.gender,
            date_of_birth: p.date_of_birth,
            age: p.age,
            status: p.status,
            recorded_at: p.recorded_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
            deleted_at: p.deleted_at,
            address: profile.address.as_ref().map(AddressPayload::from),
            phone_numbers: profile
                .phone_numbers
                .iter()
                .map(PhoneNumberPayload::from)
                .collect(),
            business_ids: profile
                .business_ids
                .iter()
                .map(BusinessIdPayload::from)
                .collect(),
        }
    }
}

impl From<&crate::types::Address> for AddressPayload {
    fn from(a: &crate::types::Address) -> Self {
        AddressPayload {
            id: a.id.clone(),
            patient_id: a.patient_id.clone(),
            street_address: a.street_address.clone(),
            village_or_colony: a.village_or_colony.clone(),
            district: a.district.clone(),
            state: a.state.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
            deleted_at: a.deleted_at,
        }
    }
}

impl From<&crate::types::PhoneNumber> for PhoneNumberPayload {
    fn from(p: &crate::types::PhoneNumber) -> Self {
        PhoneNumberPayload {
            id: p.id.clone(),
            patient_id: p.patient_id.clone(),
            number: p.number.clone(),
            phone_type: p.phone_type,
            active: p.active,
            created_at: p.created_at,
            updated_at: p.updated_at,
            deleted_at: p.deleted_at,
        }
    }
}

impl From<&crate::types::BusinessId> for BusinessIdPayload {
    fn from(b: &crate::types::BusinessId) -> Self {
        BusinessIdPayload {
            id: b.id.clone(),
            patient_id: b.patient_id.clone(),
            identifier: b.identifier.clone(),
            identifier_type: b.identifier_type.clone(),
            created_at: b.created_at,
            updated_at: b.updated_at,
            deleted_at: b.deleted_at,
        }
    }
}

impl From<&crate::types::Measurement> for MeasurementPayload {
    fn from(m: &crate::types::Measurement) -> Self {
        MeasurementPayload {
            id: m.id.clone(),
            patient_id: m.patient_id.clone(),
            facility_id: m.facility_id.clone(),
            systolic: m.systolic,
            diastolic: m.diastolic,
            recorded_at: m.recorded_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
            deleted_at: m.deleted_at,
        }
    }
}

impl From<&crate::types::Prescription> for PrescriptionPayload {
    fn from(p: &crate::types::Prescription) -> Self {
        PrescriptionPayload {
            id: p.id.clone(),
            patient_id: p.patient_id.clone(),
            facility_id: p.facility_id.clone(),
            name: p.name.clone(),
            dosage: p.dosage.clone(),
            rxnorm_code: p.rxnorm_code.clone(),
            is_protocol_drug: p.is_protocol_drug,
            created_at: p.created_at,
            updated_at: p.updated_at,
            deleted_at: p.deleted_at,
        }
    }
}

impl From<&crate::types::Appointment> for AppointmentPayload {
    fn from(a: &crate::types::Appointment) -> Self {
        AppointmentPayload {
            id: a.id.clone(),
            patient_id: a.patient_id.clone(),
            facility_id: a.facility_id.clone(),
            scheduled_date: a.scheduled_date,
            status: a.status,
            cancel_reason: a.cancel_reason.clone(),
            created_at: a.created_at,
            updated_at: a.updated_at,
            deleted_at: a.deleted_at,
        }
    }
}

impl From<&crate::types::MedicalHistory> for MedicalHistoryPayload {
    fn from(h: &crate::types::MedicalHistory) -> Self {
        MedicalHistoryPayload {
            id: h.id.clone(),
            patient_id: h.patient_id.clone(),
            diagnosed_with_hypertension: h.diagnosed_with_hypertension,
            has_had_heart_attack: h.has_had_heart_attack,
            has_had_stroke: h.has_had_stroke,
            has_had_kidney_disease: h.has_had_kidney_disease,
            has_diabetes: h.has_diabetes,
            created_at: h.created_at,
            updated_at: h.updated_at,
            deleted_at: h.deleted_at,
        }
    }
}

// =============================================================================
// Payload -> Entity Conversions (for the merge engine)
// =============================================================================
//
// The merge engine decides the stored row's sync status; the payload itself
// never carries one.

impl PatientPayload {
    /// Materializes the patient row (without its dependents) at the given
    /// sync status.
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::Patient {
        crate::types::Patient {
            id: self.id.clone(),
            full_name: self.full_name.clone(),
            gender: self.gender,
            date_of_birth: self.date_of_birth,
            age: self.age,
            status: self.status,
            recorded_at: self.recorded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl AddressPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::Address {
        crate::types::Address {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            street_address: self.street_address.clone(),
            village_or_colony: self.village_or_colony.clone(),
            district: self.district.clone(),
            state: self.state.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl PhoneNumberPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::PhoneNumber {
        crate::types::PhoneNumber {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            number: self.number.clone(),
            phone_type: self.phone_type,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl BusinessIdPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::BusinessId {
        crate::types::BusinessId {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            identifier: self.identifier.clone(),
            identifier_type: self.identifier_type.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl MeasurementPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::Measurement {
        crate::types::Measurement {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            facility_id: self.facility_id.clone(),
            systolic: self.systolic,
            diastolic: self.diastolic,
            recorded_at: self.recorded_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl PrescriptionPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::Prescription {
        crate::types::Prescription {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            facility_id: self.facility_id.clone(),
            name: self.name.clone(),
            dosage: self.dosage.clone(),
            rxnorm_code: self.rxnorm_code.clone(),
            is_protocol_drug: self.is_protocol_drug,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl AppointmentPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::Appointment {
        crate::types::Appointment {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            facility_id: self.facility_id.clone(),
            scheduled_date: self.scheduled_date,
            status: self.status,
            cancel_reason: self.cancel_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

impl MedicalHistoryPayload {
    pub fn to_record(&self, sync_status: crate::types::SyncStatus) -> crate::types::MedicalHistory {
        crate::types::MedicalHistory {
            id: self.id.clone(),
            patient_id: self.patient_id.clone(),
            diagnosed_with_hypertension: self.diagnosed_with_hypertension,
            has_had_heart_attack: self.has_had_heart_attack,
            has_had_stroke: self.has_had_stroke,
            has_had_kidney_disease: self.has_had_kidney_disease,
            has_diabetes: self.has_diabetes,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
            sync_status,
        }
    }
}

// =============================================================================
// Push / Pull Response Envelopes
// =============================================================================

/// One server-reported rejection of a pushed record.
///
/// Absence of an id in the error list means the record was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub id: String,
    pub messages: Vec<String>,
}

/// Acknowledgment returned by the push network call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PushResponse {
    pub validation_errors: Vec<ValidationError>,
}

impl PushResponse {
    /// A fully-accepted response with no validation errors.
    pub fn accepted() -> Self {
        PushResponse::default()
    }
}

/// One page returned by the pull network call.
///
/// There is no explicit end-of-data flag: the pull loop stops when
/// `payloads.len()` is strictly less than the requested page size. A final
/// page that happens to be exactly full is NOT terminal; the server answers
/// the following request with an empty page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse<P> {
    pub payloads: Vec<P>,
    /// Opaque continuation token to persist once this page is merged.
    pub process_token: String,
}
