//! [`SyncRepository`] implementations for every opencare-db repository.
//!
//! These are thin adapters: the real work (chunked status queries, the merge
//! transaction) lives in opencare-db. The patient adapter is the only one
//! with a twist - its unit of sync is the bundled [`PatientProfile`], not
//! the bare patient row.

use opencare_core::{
    Appointment, AppointmentPayload, Measurement, MeasurementPayload, MedicalHistory,
    MedicalHistoryPayload, PatientPayload, PatientProfile, Prescription, PrescriptionPayload,
    RecordType, SyncStatus,
};
use opencare_db::{
    AppointmentRepository, MeasurementRepository, MedicalHistoryRepository, PatientRepository,
    PrescriptionRepository,
};

use crate::contract::{SyncRecord, SyncRepository};
use crate::error::SyncResult;

// =============================================================================
// SyncRecord
// =============================================================================

impl SyncRecord for PatientProfile {
    fn record_id(&self) -> &str {
        &self.patient.id
    }
}

impl SyncRecord for Measurement {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl SyncRecord for Prescription {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl SyncRecord for Appointment {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl SyncRecord for MedicalHistory {
    fn record_id(&self) -> &str {
        &self.id
    }
}

// =============================================================================
// SyncRepository Adapters
// =============================================================================

impl SyncRepository for PatientRepository {
    type Record = PatientProfile;
    type Payload = PatientPayload;

    fn record_type(&self) -> RecordType {
        RecordType::Patient
    }

    fn to_payload(record: &PatientProfile) -> PatientPayload {
        PatientPayload::from_profile(record)
    }

    async fn pending_records(&self) -> SyncResult<Vec<PatientProfile>> {
        Ok(self.records_with_sync_status(SyncStatus::Pending).await?)
    }

    async fn set_sync_status_for_ids(&self, ids: &[String], status: SyncStatus) -> SyncResult<()> {
        Ok(PatientRepository::set_sync_status_for_ids(self, ids, status).await?)
    }

    async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> SyncResult<()> {
        Ok(PatientRepository::set_sync_status(self, from, to).await?)
    }

    async fn merge_with_local_data(&self, payloads: Vec<PatientPayload>) -> SyncResult<()> {
        Ok(PatientRepository::merge_with_local_data(self, payloads).await?)
    }
}

impl SyncRepository for MeasurementRepository {
    type Record = Measurement;
    type Payload = MeasurementPayload;

    fn record_type(&self) -> RecordType {
        RecordType::Measurement
    }

    fn to_payload(record: &Measurement) -> MeasurementPayload {
        MeasurementPayload::from(record)
    }

    async fn pending_records(&self) -> SyncResult<Vec<Measurement>> {
        Ok(self.records_with_sync_status(SyncStatus::Pending).await?)
    }

    async fn set_sync_status_for_ids(&self, ids: &[String], status: SyncStatus) -> SyncResult<()> {
        Ok(MeasurementRepository::set_sync_status_for_ids(self, ids, status).await?)
    }

    async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> SyncResult<()> {
        Ok(MeasurementRepository::set_sync_status(self, from, to).await?)
    }

    async fn merge_with_local_data(&self, payloads: Vec<MeasurementPayload>) -> SyncResult<()> {
        Ok(MeasurementRepository::merge_with_local_data(self, payloads).await?)
    }
}

impl SyncRepository for PrescriptionRepository {
    type Record = Prescription;
    type Payload = PrescriptionPayload;

    fn record_type(&self) -> RecordType {
        RecordType::Prescription
    }

    fn to_payload(record: &Prescription) -> PrescriptionPayload {
        PrescriptionPayload::from(record)
    }

    async fn pending_records(&self) -> SyncResult<Vec<Prescription>> {
        Ok(self.records_with_sync_status(SyncStatus::Pending).await?)
    }

    async fn set_sync_status_for_ids(&self, ids: &[String], status: SyncStatus) -> SyncResult<()> {
        Ok(PrescriptionRepository::set_sync_status_for_ids(self, ids, status).await?)
    }

    async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> SyncResult<()> {
        Ok(PrescriptionRepository::set_sync_status(self, from, to).await?)
    }

    async fn merge_with_local_data(&self, payloads: Vec<PrescriptionPayload>) -> SyncResult<()> {
        Ok(PrescriptionRepository::merge_with_local_data(self, payloads).await?)
    }
}

impl SyncRepository for AppointmentRepository {
    type Record = Appointment;
    type Payload = AppointmentPayload;

    fn record_type(&self) -> RecordType {
        RecordType::Appointment
    }

    fn to_payload(record: &Appointment) -> AppointmentPayload {
        AppointmentPayload::from(record)
    }

    async fn pending_records(&self) -> SyncResult<Vec<Appointment>> {
        Ok(self.records_with_sync_status(SyncStatus::Pending).await?)
    }

    async fn set_sync_status_for_ids(&self, ids: &[String], status: SyncStatus) -> SyncResult<()> {
        Ok(AppointmentRepository::set_sync_status_for_ids(self, ids, status).await?)
    }

    async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> SyncResult<()> {
        Ok(AppointmentRepository::set_sync_status(self, from, to).await?)
    }

    async fn merge_with_local_data(&self, payloads: Vec<AppointmentPayload>) -> SyncResult<()> {
        Ok(AppointmentRepository::merge_with_local_data(self, payloads).await?)
    }
}

impl SyncRepository for MedicalHistoryRepository {
    type Record = MedicalHistory;
    type Payload = MedicalHistoryPayload;

    fn record_type(&self) -> RecordType {
        RecordType::MedicalHistory
    }

    fn to_payload(record: &MedicalHistory) -> MedicalHistoryPayload {
        MedicalHistoryPayload::from(record)
    }

    async fn pending_records(&self) -> SyncResult<Vec<MedicalHistory>> {
        Ok(self.records_with_sync_status(SyncStatus::Pending).await?)
    }

    async fn set_sync_status_for_ids(&self, ids: &[String], status: SyncStatus) -> SyncResult<()> {
        Ok(MedicalHistoryRepository::set_sync_status_for_ids(self, ids, status).await?)
    }

    async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> SyncResult<()> {
        Ok(MedicalHistoryRepository::set_sync_status(self, from, to).await?)
    }

    async fn merge_with_local_data(&self, payloads: Vec<MedicalHistoryPayload>) -> SyncResult<()> {
        Ok(MedicalHistoryRepository::merge_with_local_data(self, payloads).await?)
    }
}
