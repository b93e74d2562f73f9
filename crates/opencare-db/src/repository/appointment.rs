//! Follow-up appointments. An appointment is mutated in place (scheduled ->
//! cancelled/visited) rather than deleted, so the interesting transitions
//! here are status updates that re-queue the row for push.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use opencare_core::{Appointment, AppointmentPayload, AppointmentStatus, RecordType, SyncStatus};

use crate::changes::ChangeNotifier;
use crate::error::{DbError, DbResult};
use crate::repository::support::{self, MergeAction};

#[derive(Debug, Clone)]
pub struct AppointmentRepository {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl AppointmentRepository {
    pub fn new(pool: SqlitePool, notifier: ChangeNotifier) -> Self {
        AppointmentRepository { pool, notifier }
    }

    pub async fn save(&self, appointment: &Appointment) -> DbResult<()> {
        let mut appointment = appointment.clone();
        appointment.updated_at = Utc::now();
        appointment.sync_status = SyncStatus::Pending;

        debug!(id = %appointment.id, status = ?appointment.status, "Saving appointment");

        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, &appointment).await?;

        self.notifier.notify(RecordType::Appointment);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Appointment>> {
        let row = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Appointments still in the `scheduled` state for a patient.
    pub async fn scheduled_for_patient(&self, patient_id: &str) -> DbResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments \
             WHERE patient_id = ?1 AND status = ?2 AND deleted_at IS NULL \
             ORDER BY scheduled_date, id",
        )
        .bind(patient_id)
        .bind(AppointmentStatus::Scheduled)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Cancels a scheduled appointment with a reason.
    pub async fn cancel(&self, id: &str, reason: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE appointments \
             SET status = ?2, cancel_reason = ?3, updated_at = ?4, sync_status = ?5 \
             WHERE id = ?1 AND status = ?6 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(AppointmentStatus::Cancelled)
        .bind(reason)
        .bind(now)
        .bind(SyncStatus::Pending)
        .bind(AppointmentStatus::Scheduled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Appointment", id));
        }

        self.notifier.notify(RecordType::Appointment);
        Ok(())
    }

    /// Marks a scheduled appointment as attended.
    pub async fn mark_visited(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE appointments SET status = ?2, updated_at = ?3, sync_status = ?4 \
             WHERE id = ?1 AND status = ?5 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(AppointmentStatus::Visited)
        .bind(now)
        .bind(SyncStatus::Pending)
        .bind(AppointmentStatus::Scheduled)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Appointment", id));
        }

        self.notifier.notify(RecordType::Appointment);
        Ok(())
    }

    /// Count of appointment rows for a patient changed after `instant`,
    /// regardless of sync status.
    pub async fn changed_since(
        &self,
        patient_id: &str,
        instant: DateTime<Utc>,
    ) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM appointments WHERE patient_id = ?1 AND updated_at > ?2",
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
    ) -> DbResult<Vec<Appointment>> {
        let rows = support::records_with_status(&self.pool, "appointments", status).await?;
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
        support::set_status_for_ids(&self.pool, "appointments", "id", ids, status).await?;
        self.notifier.notify(RecordType::Appointment);
        Ok(())
    }

    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> DbResult<()> {
        support::set_status_transition(&self.pool, "appointments", from, to).await?;
        self.notifier.notify(RecordType::Appointment);
        Ok(())
    }

    pub async fn merge_with_local_data(&self, payloads: Vec<AppointmentPayload>) -> DbResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let count = payloads.len();
        let mut tx = self.pool.begin().await?;

        for payload in &payloads {
            if support::merge_action(&mut tx, "appointments", &payload.id).await?
                == MergeAction::Upsert
            {
                upsert_row(&mut tx, &payload.to_record(SyncStatus::Done)).await?;
            }
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::Appointment);

        info!(count, "Merged appointment payloads");
        Ok(())
    }
}

async fn upsert_row(conn: &mut SqliteConnection, a: &Appointment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO appointments (
            id, patient_id, facility_id, scheduled_date, status, cancel_reason,
            created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(id) DO UPDATE SET
            patient_id = excluded.patient_id,
            facility_id = excluded.facility_id,
            scheduled_date = excluded.scheduled_date,
            status = excluded.status,
            cancel_reason = excluded.cancel_reason,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&a.id)
    .bind(&a.patient_id)
    .bind(&a.facility_id)
    .bind(a.scheduled_date)
    .bind(a.status)
    .bind(&a.cancel_reason)
    .bind(a.created_at)
    .bind(a.updated_at)
    .bind(a.deleted_at)
    .bind(a.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::appointment;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn cancel_records_reason_and_re_queues() {
        let db = db().await;
        let repo = db.appointments();

        repo.save(&appointment("a1", "p1")).await.unwrap();
        repo.set_sync_status_for_ids(&["a1".to_string()], SyncStatus::Done)
            .await
            .unwrap();

        repo.cancel("a1", "moved_to_private_practitioner").await.unwrap();

        let stored = repo.get("a1").await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(
            stored.cancel_reason.as_deref(),
            Some("moved_to_private_practitioner")
        );
        assert_eq!(stored.sync_status, SyncStatus::Pending);

        // Cancelling a non-scheduled appointment is an error.
        assert!(matches!(
            repo.cancel("a1", "again").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn visited_appointment_leaves_the_scheduled_list() {
        let db = db().await;
        let repo = db.appointments();

        repo.save(&appointment("a1", "p1")).await.unwrap();
        repo.save(&appointment("a2", "p1")).await.unwrap();
        repo.mark_visited("a1").await.unwrap();

        let scheduled = repo.scheduled_for_patient("p1").await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].id, "a2");
    }

    #[tokio::test]
    async fn merge_does_not_resurrect_a_pending_cancellation() {
        let db = db().await;
        let repo = db.appointments();

        repo.save(&appointment("a1", "p1")).await.unwrap();
        repo.cancel("a1", "public_hospital_transfer").await.unwrap();

        // Server still believes it is scheduled.
        let incoming = appointment("a1", "p1");
        repo.merge_with_local_data(vec![AppointmentPayload::from(&incoming)])
            .await
            .unwrap();

        let stored = repo.get("a1").await.unwrap().unwrap();
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
    }
}
