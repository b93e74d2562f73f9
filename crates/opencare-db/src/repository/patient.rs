//! # Patient Repository
//!
//! Storage for patients and their owned dependents (address, phone numbers,
//! business identifiers). The four tables are written together - a profile
//! save or a payload merge is one transaction - but every row keeps its own
//! sync status and soft-delete tombstone.
//!
//! ## The Merge Rule (per row, keyed by id)
//! ```text
//! ┌──────────────────────────┬───────────────────────────────────────────┐
//! │ local row                │ incoming server payload                   │
//! ├──────────────────────────┼───────────────────────────────────────────┤
//! │ absent                   │ insert, sync_status = done                │
//! │ sync_status = done       │ overwrite all fields, stays done          │
//! │ sync_status = pending    │ SKIP - unpushed local edit wins           │
//! │ sync_status = invalid    │ SKIP - awaiting a local fix               │
//! └──────────────────────────┴───────────────────────────────────────────┘
//! ```
//! A patient's own pending edit does not block merging an already-synced
//! dependent, and vice versa. Merges are row-level upserts
//! (`ON CONFLICT(id) DO UPDATE`), never delete-and-reinsert, so sibling rows
//! and foreign keys are untouched mid-transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use opencare_core::{
    Address, BusinessId, Patient, PatientPayload, PatientProfile, PhoneNumber, RecordType,
    SyncStatus,
};

use crate::changes::ChangeNotifier;
use crate::error::{DbError, DbResult};
use crate::repository::support::{self, MergeAction, MAX_QUERY_PARAMS};

/// Repository for patient profiles.
#[derive(Debug, Clone)]
pub struct PatientRepository {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl PatientRepository {
    pub fn new(pool: SqlitePool, notifier: ChangeNotifier) -> Self {
        PatientRepository { pool, notifier }
    }

    // =========================================================================
    // Local Writes
    // =========================================================================

    /// Saves a patient with its dependents atomically.
    ///
    /// Every row is stamped `updated_at = now` and `sync_status = pending`.
    /// Panics if the patient violates a local precondition (no date of birth
    /// and no age) - nothing is written in that case.
    pub async fn save_profile(&self, profile: &PatientProfile) -> DbResult<()> {
        profile.patient.assert_valid();

        let now = Utc::now();
        debug!(patient_id = %profile.patient.id, "Saving patient profile");

        let mut tx = self.pool.begin().await?;

        let mut patient = profile.patient.clone();
        patient.updated_at = now;
        patient.sync_status = SyncStatus::Pending;
        upsert_patient_row(&mut tx, &patient).await?;

        if let Some(address) = &profile.address {
            let mut address = address.clone();
            address.updated_at = now;
            address.sync_status = SyncStatus::Pending;
            upsert_address_row(&mut tx, &address).await?;
        }

        for phone in &profile.phone_numbers {
            let mut phone = phone.clone();
            phone.updated_at = now;
            phone.sync_status = SyncStatus::Pending;
            upsert_phone_row(&mut tx, &phone).await?;
        }

        for business_id in &profile.business_ids {
            let mut business_id = business_id.clone();
            business_id.updated_at = now;
            business_id.sync_status = SyncStatus::Pending;
            upsert_business_id_row(&mut tx, &business_id).await?;
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Upserts a single phone number and marks the owning patient pending,
    /// since the profile as a whole now has unpushed changes. Sibling rows
    /// are not touched.
    pub async fn save_phone_number(&self, phone: &PhoneNumber) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut phone = phone.clone();
        phone.updated_at = now;
        phone.sync_status = SyncStatus::Pending;
        upsert_phone_row(&mut tx, &phone).await?;
        touch_patient(&mut tx, &phone.patient_id, now).await?;

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Upserts a single address; same semantics as [`Self::save_phone_number`].
    pub async fn save_address(&self, address: &Address) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut address = address.clone();
        address.updated_at = now;
        address.sync_status = SyncStatus::Pending;
        upsert_address_row(&mut tx, &address).await?;
        touch_patient(&mut tx, &address.patient_id, now).await?;

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Upserts a single business identifier; same semantics as
    /// [`Self::save_phone_number`].
    pub async fn save_business_id(&self, business_id: &BusinessId) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut business_id = business_id.clone();
        business_id.updated_at = now;
        business_id.sync_status = SyncStatus::Pending;
        upsert_business_id_row(&mut tx, &business_id).await?;
        touch_patient(&mut tx, &business_id.patient_id, now).await?;

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Soft-deletes a patient. The row stays in the store (tombstone) so the
    /// deletion can sync; dependents are NOT cascaded.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE patients SET deleted_at = ?2, updated_at = ?2, sync_status = ?3 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Patient", id));
        }

        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a patient by id. Soft-deleted patients are invisible here.
    pub async fn get(&self, id: &str) -> DbResult<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>(
            "SELECT * FROM patients WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    /// Gets a patient with its live (non-deleted) dependents.
    pub async fn profile(&self, id: &str) -> DbResult<Option<PatientProfile>> {
        let Some(patient) = self.get(id).await? else {
            return Ok(None);
        };

        let address = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE patient_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let phone_numbers = self.phone_numbers(id).await?;
        let business_ids = self.business_ids(id).await?;

        Ok(Some(PatientProfile {
            patient,
            address,
            phone_numbers,
            business_ids,
        }))
    }

    /// Live phone numbers for a patient.
    pub async fn phone_numbers(&self, patient_id: &str) -> DbResult<Vec<PhoneNumber>> {
        let rows = sqlx::query_as::<_, PhoneNumber>(
            "SELECT * FROM phone_numbers WHERE patient_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Live addresses for a patient.
    pub async fn addresses(&self, patient_id: &str) -> DbResult<Vec<Address>> {
        let rows = sqlx::query_as::<_, Address>(
            "SELECT * FROM addresses WHERE patient_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Live business identifiers for a patient.
    pub async fn business_ids(&self, patient_id: &str) -> DbResult<Vec<BusinessId>> {
        let rows = sqlx::query_as::<_, BusinessId>(
            "SELECT * FROM business_ids WHERE patient_id = ?1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Syncable Repository Operations
    // =========================================================================

    /// All patient profiles whose patient row has the given sync status,
    /// bundled with every dependent row (tombstones included - deletions
    /// must sync too). Chunked transparently past query limits.
    pub async fn records_with_sync_status(
        &self,
        status: SyncStatus,
    ) -> DbResult<Vec<PatientProfile>> {
        let patients: Vec<Patient> =
            support::records_with_status(&self.pool, "patients", status).await?;

        if patients.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = patients.iter().map(|p| p.id.clone()).collect();

        let mut addresses: HashMap<String, Vec<Address>> = HashMap::new();
        for row in fetch_dependents::<Address>(&self.pool, "addresses", &ids).await? {
            addresses.entry(row.patient_id.clone()).or_default().push(row);
        }

        let mut phones: HashMap<String, Vec<PhoneNumber>> = HashMap::new();
        for row in fetch_dependents::<PhoneNumber>(&self.pool, "phone_numbers", &ids).await? {
            phones.entry(row.patient_id.clone()).or_default().push(row);
        }

        let mut business_ids: HashMap<String, Vec<BusinessId>> = HashMap::new();
        for row in fetch_dependents::<BusinessId>(&self.pool, "business_ids", &ids).await? {
            business_ids
                .entry(row.patient_id.clone())
                .or_default()
                .push(row);
        }

        let profiles = patients
            .into_iter()
            .map(|patient| {
                let id = patient.id.clone();
                PatientProfile {
                    patient,
                    address: addresses.remove(&id).and_then(|mut a| {
                        a.sort_by(|x, y| x.id.cmp(&y.id));
                        a.into_iter().next()
                    }),
                    phone_numbers: phones.remove(&id).unwrap_or_default(),
                    business_ids: business_ids.remove(&id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(profiles)
    }

    /// Bulk status transition for an explicit patient-id list.
    ///
    /// Dependents of those patients ride along, but only from `pending`:
    /// an `invalid` dependent never changes status without a local edit.
    pub async fn set_sync_status_for_ids(
        &self,
        ids: &[String],
        status: SyncStatus,
    ) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        support::set_status_for_ids(&self.pool, "patients", "id", ids, status).await?;
        for table in ["addresses", "phone_numbers", "business_ids"] {
            set_pending_dependent_status(&self.pool, table, ids, status).await?;
        }

        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Bulk transition of every row currently in `from` to `to`, across the
    /// patient table and all dependent tables.
    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> DbResult<()> {
        for table in ["patients", "addresses", "phone_numbers", "business_ids"] {
            support::set_status_transition(&self.pool, table, from, to).await?;
        }
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Merges a batch of server payloads (see module docs for the rule).
    /// The whole batch commits in one transaction.
    pub async fn merge_with_local_data(&self, payloads: Vec<PatientPayload>) -> DbResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let count = payloads.len();
        let mut tx = self.pool.begin().await?;

        for payload in &payloads {
            if support::merge_action(&mut tx, "patients", &payload.id).await?
                == MergeAction::Upsert
            {
                upsert_patient_row(&mut tx, &payload.to_record(SyncStatus::Done)).await?;
            }

            // Dependents merge independently: a pending patient row does not
            // block an already-synced dependent, and vice versa.
            if let Some(address) = &payload.address {
                if support::merge_action(&mut tx, "addresses", &address.id).await?
                    == MergeAction::Upsert
                {
                    upsert_address_row(&mut tx, &address.to_record(SyncStatus::Done)).await?;
                }
            }

            for phone in &payload.phone_numbers {
                if support::merge_action(&mut tx, "phone_numbers", &phone.id).await?
                    == MergeAction::Upsert
                {
                    upsert_phone_row(&mut tx, &phone.to_record(SyncStatus::Done)).await?;
                }
            }

            for business_id in &payload.business_ids {
                if support::merge_action(&mut tx, "business_ids", &business_id.id).await?
                    == MergeAction::Upsert
                {
                    upsert_business_id_row(&mut tx, &business_id.to_record(SyncStatus::Done))
                        .await?;
                }
            }
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);

        info!(count, "Merged patient payloads");
        Ok(())
    }

    // =========================================================================
    // Recorded-At Maintenance
    // =========================================================================

    /// Compare-and-update of the denormalized `recorded_at` marker:
    /// `recorded_at = max(existing, candidate)`.
    ///
    /// If the candidate is not strictly newer the row is left completely
    /// untouched - no status change, no timestamp bump.
    pub async fn compare_and_update_recorded_at(
        &self,
        id: &str,
        candidate: DateTime<Utc>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT recorded_at FROM patients WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(existing) = existing else {
            return Err(DbError::not_found("Patient", id));
        };

        if candidate <= existing {
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE patients SET recorded_at = ?2, updated_at = ?3, sync_status = ?4 \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(candidate)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }

    /// Recomputes `recorded_at` from the patient's own measurements: the
    /// earliest `recorded_at` among non-deleted measurements, falling back
    /// to the patient's creation time when none survive.
    ///
    /// Only an actual change marks the patient `pending`; recomputing to the
    /// same value leaves the row untouched.
    pub async fn update_recorded_at_from_measurements(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as("SELECT recorded_at, created_at FROM patients WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((current, created_at)) = row else {
            return Err(DbError::not_found("Patient", id));
        };

        let recorded: Vec<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT recorded_at FROM measurements WHERE patient_id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let target = recorded.into_iter().min().unwrap_or(created_at);

        if target == current {
            return Ok(());
        }

        let now = Utc::now();
        sqlx::query(
            "UPDATE patients SET recorded_at = ?2, updated_at = ?3, sync_status = ?4 \
             WHERE id = ?1",
        )
        .bind(id)
        .bind(target)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.notifier.notify(RecordType::Patient);
        Ok(())
    }
}

// =============================================================================
// Row Upserts
// =============================================================================
//
// INSERT ... ON CONFLICT(id) DO UPDATE keeps these as row-level writes:
// sibling rows keep their rowids and foreign keys stay satisfied throughout
// the transaction.

async fn upsert_patient_row(conn: &mut SqliteConnection, p: &Patient) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO patients (
            id, full_name, gender, date_of_birth, age, status,
            recorded_at, created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            gender = excluded.gender,
            date_of_birth = excluded.date_of_birth,
            age = excluded.age,
            status = excluded.status,
            recorded_at = excluded.recorded_at,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&p.id)
    .bind(&p.full_name)
    .bind(p.gender)
    .bind(p.date_of_birth)
    .bind(p.age)
    .bind(p.status)
    .bind(p.recorded_at)
    .bind(p.created_at)
    .bind(p.updated_at)
    .bind(p.deleted_at)
    .bind(p.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_address_row(conn: &mut SqliteConnection, a: &Address) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO addresses (
            id, patient_id, street_address, village_or_colony, district, state,
            created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            street_address = excluded.street_address,
            village_or_colony = excluded.village_or_colony,
            district = excluded.district,
            state = excluded.state,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&a.id)
    .bind(&a.patient_id)
    .bind(&a.street_address)
    .bind(&a.village_or_colony)
    .bind(&a.district)
    .bind(&a.state)
    .bind(a.created_at)
    .bind(a.updated_at)
    .bind(a.deleted_at)
    .bind(a.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_phone_row(conn: &mut SqliteConnection, p: &PhoneNumber) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO phone_numbers (
            id, patient_id, number, phone_type, active,
            created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            number = excluded.number,
            phone_type = excluded.phone_type,
            active = excluded.active,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&p.id)
    .bind(&p.patient_id)
    .bind(&p.number)
    .bind(p.phone_type)
    .bind(p.active)
    .bind(p.created_at)
    .bind(p.updated_at)
    .bind(p.deleted_at)
    .bind(p.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

async fn upsert_business_id_row(
    conn: &mut SqliteConnection,
    b: &BusinessId,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO business_ids (
            id, patient_id, identifier, identifier_type,
            created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            identifier = excluded.identifier,
            identifier_type = excluded.identifier_type,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&b.id)
    .bind(&b.patient_id)
    .bind(&b.identifier)
    .bind(&b.identifier_type)
    .bind(b.created_at)
    .bind(b.updated_at)
    .bind(b.deleted_at)
    .bind(b.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

/// Marks the owning patient pending after a dependent edit.
async fn touch_patient(
    conn: &mut SqliteConnection,
    patient_id: &str,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE patients SET updated_at = ?2, sync_status = ?3 WHERE id = ?1")
        .bind(patient_id)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(conn)
        .await?;
    Ok(())
}

/// Fetches all dependent rows (tombstones included) for a set of patient
/// ids, chunked under the parameter ceiling.
async fn fetch_dependents<T>(
    pool: &SqlitePool,
    table: &str,
    patient_ids: &[String],
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::new();

    for chunk in patient_ids.chunks(MAX_QUERY_PARAMS) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT * FROM {table} WHERE patient_id IN ("));
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        qb.push(") ORDER BY id");

        rows.extend(qb.build_query_as::<T>().fetch_all(pool).await?);
    }

    Ok(rows)
}

/// Moves dependents of the given patients from `pending` to `status`.
/// Rows in other states (notably `invalid`) are never touched here.
async fn set_pending_dependent_status(
    pool: &SqlitePool,
    table: &str,
    patient_ids: &[String],
    status: SyncStatus,
) -> Result<(), sqlx::Error> {
    for chunk in patient_ids.chunks(MAX_QUERY_PARAMS - 2) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {table} SET sync_status = "));
        qb.push_bind(status);
        qb.push(" WHERE sync_status = ");
        qb.push_bind(SyncStatus::Pending);
        qb.push(" AND patient_id IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        qb.push(")");

        qb.build().execute(pool).await?;
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::{measurement, profile, t0};
    use chrono::Duration;
    use opencare_core::PatientPayload;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn payload_for(profile_id: &str) -> PatientPayload {
        PatientPayload::from_profile(&profile(profile_id))
    }

    #[tokio::test]
    async fn merge_inserts_unknown_patient_as_done() {
        let db = db().await;
        let repo = db.patients();

        repo.merge_with_local_data(vec![payload_for("p1")]).await.unwrap();

        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Done);
        // Bundled dependents landed too, each as done.
        let phones = repo.phone_numbers("p1").await.unwrap();
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].sync_status, SyncStatus::Done);
    }

    #[tokio::test]
    async fn merge_never_clobbers_pending_local_edit() {
        let db = db().await;
        let repo = db.patients();

        let mut local = profile("p1");
        local.patient.full_name = "Locally Edited".into();
        repo.save_profile(&local).await.unwrap();

        let mut incoming = payload_for("p1");
        incoming.full_name = "Server Version".into();
        repo.merge_with_local_data(vec![incoming]).await.unwrap();

        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.full_name, "Locally Edited");
        assert_eq!(stored.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn merge_overwrites_done_row_and_keeps_done() {
        let db = db().await;
        let repo = db.patients();

        repo.merge_with_local_data(vec![payload_for("p1")]).await.unwrap();

        let mut newer = payload_for("p1");
        newer.full_name = "Renamed On Server".into();
        newer.updated_at = t0() + Duration::hours(1);
        repo.merge_with_local_data(vec![newer]).await.unwrap();

        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.full_name, "Renamed On Server");
        assert_eq!(stored.sync_status, SyncStatus::Done);
    }

    #[tokio::test]
    async fn merge_skips_invalid_rows() {
        let db = db().await;
        let repo = db.patients();

        repo.save_profile(&profile("p1")).await.unwrap();
        repo.set_sync_status_for_ids(&["p1".to_string()], SyncStatus::Invalid)
            .await
            .unwrap();

        let mut incoming = payload_for("p1");
        incoming.full_name = "Server Version".into();
        repo.merge_with_local_data(vec![incoming]).await.unwrap();

        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_ne!(stored.full_name, "Server Version");
        assert_eq!(stored.sync_status, SyncStatus::Invalid);
    }

    #[tokio::test]
    async fn pending_patient_does_not_block_dependent_merge() {
        let db = db().await;
        let repo = db.patients();

        // Everything synced, then a local patient-only edit.
        repo.merge_with_local_data(vec![payload_for("p1")]).await.unwrap();
        let mut local = repo.profile("p1").await.unwrap().unwrap();
        local.patient.full_name = "Local Rename".into();
        let patient_only = PatientProfile {
            patient: local.patient.clone(),
            address: None,
            phone_numbers: vec![],
            business_ids: vec![],
        };
        repo.save_profile(&patient_only).await.unwrap();

        // Server updates the phone number; patient is pending but the
        // dependent is done, so the dependent must still merge.
        let mut incoming = payload_for("p1");
        incoming.phone_numbers[0].number = "1111122222".into();
        repo.merge_with_local_data(vec![incoming]).await.unwrap();

        let stored = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(stored.full_name, "Local Rename");
        let phones = repo.phone_numbers("p1").await.unwrap();
        assert_eq!(phones[0].number, "1111122222");
    }

    #[tokio::test]
    async fn editing_phone_number_leaves_sibling_rows_untouched() {
        let db = db().await;
        let repo = db.patients();

        repo.save_profile(&profile("p1")).await.unwrap();
        let before_addresses = repo.addresses("p1").await.unwrap();
        let before_business_ids = repo.business_ids("p1").await.unwrap();

        let mut phone = repo.phone_numbers("p1").await.unwrap().remove(0);
        phone.number = "0000011111".into();
        repo.save_phone_number(&phone).await.unwrap();

        let after_addresses = repo.addresses("p1").await.unwrap();
        let after_business_ids = repo.business_ids("p1").await.unwrap();

        assert_eq!(before_addresses, after_addresses);
        assert_eq!(before_business_ids, after_business_ids);
        assert_eq!(repo.phone_numbers("p1").await.unwrap()[0].number, "0000011111");
    }

    #[tokio::test]
    async fn push_ack_marks_profile_done_and_invalid_override_sticks() {
        let db = db().await;
        let repo = db.patients();

        repo.save_profile(&profile("p1")).await.unwrap();
        repo.save_profile(&profile("p2")).await.unwrap();

        let ids = vec!["p1".to_string(), "p2".to_string()];
        repo.set_sync_status_for_ids(&ids, SyncStatus::Done).await.unwrap();
        repo.set_sync_status_for_ids(&["p2".to_string()], SyncStatus::Invalid)
            .await
            .unwrap();

        assert_eq!(
            repo.get("p1").await.unwrap().unwrap().sync_status,
            SyncStatus::Done
        );
        assert_eq!(
            repo.get("p2").await.unwrap().unwrap().sync_status,
            SyncStatus::Invalid
        );
        // Dependents of p1 were acked with it.
        assert_eq!(
            repo.phone_numbers("p1").await.unwrap()[0].sync_status,
            SyncStatus::Done
        );
    }

    #[tokio::test]
    async fn soft_deleted_patient_disappears_from_reads_but_still_syncs() {
        let db = db().await;
        let repo = db.patients();

        repo.save_profile(&profile("p1")).await.unwrap();
        repo.soft_delete("p1").await.unwrap();

        assert!(repo.get("p1").await.unwrap().is_none());

        let pending = repo.records_with_sync_status(SyncStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].patient.deleted_at.is_some());
    }

    #[tokio::test]
    async fn compare_and_update_recorded_at_takes_max() {
        let db = db().await;
        let repo = db.patients();
        repo.save_profile(&profile("p1")).await.unwrap();
        repo.set_sync_status_for_ids(&["p1".to_string()], SyncStatus::Done)
            .await
            .unwrap();

        // Older candidate: row completely untouched.
        let before = repo.get("p1").await.unwrap().unwrap();
        repo.compare_and_update_recorded_at("p1", t0() - Duration::days(1))
            .await
            .unwrap();
        let after = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(before, after);

        // Newer candidate: recorded_at advances, row goes pending.
        let newer = t0() + Duration::days(2);
        repo.compare_and_update_recorded_at("p1", newer).await.unwrap();
        let after = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(after.recorded_at, newer);
        assert_eq!(after.sync_status, SyncStatus::Pending);
        assert!(after.updated_at > before.updated_at);
    }

    #[tokio::test]
    async fn recorded_at_falls_back_through_surviving_measurements() {
        let db = db().await;
        let patients = db.patients();
        let measurements = db.measurements();

        patients.save_profile(&profile("p1")).await.unwrap();

        let mut first = measurement("m1", "p1", "fac-1");
        first.recorded_at = t0() + Duration::days(1);
        let mut second = measurement("m2", "p1", "fac-1");
        second.recorded_at = t0() + Duration::days(3);
        measurements.save(&first).await.unwrap();
        measurements.save(&second).await.unwrap();

        patients.update_recorded_at_from_measurements("p1").await.unwrap();
        assert_eq!(
            patients.get("p1").await.unwrap().unwrap().recorded_at,
            first.recorded_at
        );

        // Deleting the oldest moves the marker to the next-oldest survivor.
        measurements.soft_delete("m1").await.unwrap();
        patients.update_recorded_at_from_measurements("p1").await.unwrap();
        let after_first_delete = patients.get("p1").await.unwrap().unwrap();
        assert_eq!(after_first_delete.recorded_at, second.recorded_at);
        assert_eq!(after_first_delete.sync_status, SyncStatus::Pending);

        // Deleting the last falls back to the patient's own creation time.
        measurements.soft_delete("m2").await.unwrap();
        patients.update_recorded_at_from_measurements("p1").await.unwrap();
        let after_second_delete = patients.get("p1").await.unwrap().unwrap();
        assert_eq!(after_second_delete.recorded_at, after_second_delete.created_at);
        assert_eq!(after_second_delete.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    #[should_panic(expected = "precondition violated")]
    async fn saving_patient_without_dob_or_age_panics() {
        let db = db().await;
        let mut bad = profile("p1");
        bad.patient.date_of_birth = None;
        bad.patient.age = None;
        let _ = db.patients().save_profile(&bad).await;
    }
}
