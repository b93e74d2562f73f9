//! # Measurement Repository
//!
//! Blood-pressure readings. Flat rows (no bundling): each measurement merges
//! and pushes on its own. `changed_since` answers the "what did the server
//! change while I was away" question for conflict-aware screens.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use opencare_core::{Measurement, MeasurementPayload, RecordType, SyncStatus};

use crate::changes::ChangeNotifier;
use crate::error::{DbError, DbResult};
use crate::repository::support::{self, MergeAction};

/// Repository for blood-pressure measurements.
#[derive(Debug, Clone)]
pub struct MeasurementRepository {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl MeasurementRepository {
    pub fn new(pool: SqlitePool, notifier: ChangeNotifier) -> Self {
        MeasurementRepository { pool, notifier }
    }

    /// Upserts a measurement, stamping it `updated_at = now` and `pending`.
    pub async fn save(&self, measurement: &Measurement) -> DbResult<()> {
        let mut measurement = measurement.clone();
        measurement.updated_at = Utc::now();
        measurement.sync_status = SyncStatus::Pending;

        debug!(id = %measurement.id, patient_id = %measurement.patient_id, "Saving measurement");

        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, &measurement).await?;

        self.notifier.notify(RecordType::Measurement);
        Ok(())
    }

    /// Gets a measurement by id; soft-deleted rows are invisible.
    pub async fn get(&self, id: &str) -> DbResult<Option<Measurement>> {
        let row = sqlx::query_as::<_, Measurement>(
            "SELECT * FROM measurements WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Live measurements for a patient, newest reading first.
    pub async fn measurements_for_patient(&self, patient_id: &str) -> DbResult<Vec<Measurement>> {
        let rows = sqlx::query_as::<_, Measurement>(
            "SELECT * FROM measurements WHERE patient_id = ?1 AND deleted_at IS NULL \
             ORDER BY recorded_at DESC, id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Soft-deletes a measurement; the tombstone syncs like any other edit.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE measurements SET deleted_at = ?2, updated_at = ?2, sync_status = ?3 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Measurement", id));
        }

        self.notifier.notify(RecordType::Measurement);
        Ok(())
    }

    /// Count of rows for a patient whose last change landed after `instant`,
    /// regardless of sync status. Tombstones count too. Pure point-in-time
    /// read; used to decide whether derived values need recomputing.
    pub async fn changed_since(
        &self,
        patient_id: &str,
        instant: DateTime<Utc>,
    ) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM measurements WHERE patient_id = ?1 AND updated_at > ?2",
        )
        .bind(patient_id)
        .bind(instant)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    // =========================================================================
    // Syncable Repository Operations
    // =========================================================================

    pub async fn records_with_sync_status(
        &self,
        status: SyncStatus,
    ) -> DbResult<Vec<Measurement>> {
        let rows = support::records_with_status(&self.pool, "measurements", status).await?;
        Ok(rows)
    }

    pub async fn set_sync_status_for_ids(
        &self,
        ids: &[String],
        status: SyncStatus,
    ) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        support::set_status_for_ids(&self.pool, "measurements", "id", ids, status).await?;
        self.notifier.notify(RecordType::Measurement);
        Ok(())
    }

    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> DbResult<()> {
        support::set_status_transition(&self.pool, "measurements", from, to).await?;
        self.notifier.notify(RecordType::Measurement);
        Ok(())
    }

    /// Merges a batch of server payloads in one transaction (insert unknown
    /// rows as `done`, overwrite `done` rows, skip `pending`/`invalid`).
    pub async fn merge_with_local_data(&self, payloads: Vec<MeasurementPayload>) -> DbResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let count = payloads.len();
        let mut tx = self.pool.begin().await?;

        for payload in &payloads {
            if support::merge_action(&mut tx, "measurements", &payload.id).await?
                == MergeAction::Upsert
            {
                upsert_row(&mut tx, &payload.to_record(SyncStatus::Done)).await?;
            }
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::Measurement);

        info!(count, "Merged measurement payloads");
        Ok(())
    }
}

async fn upsert_row(conn: &mut SqliteConnection, m: &Measurement) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO measurements (
            id, patient_id, facility_id, systolic, diastolic,
            recorded_at, created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            patient_id = excluded.patient_id,
            facility_id = excluded.facility_id,
            systolic = excluded.systolic,
            diastolic = excluded.diastolic,
            recorded_at = excluded.recorded_at,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&m.id)
    .bind(&m.patient_id)
    .bind(&m.facility_id)
    .bind(m.systolic)
    .bind(m.diastolic)
    .bind(m.recorded_at)
    .bind(m.created_at)
    .bind(m.updated_at)
    .bind(m.deleted_at)
    .bind(m.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}
