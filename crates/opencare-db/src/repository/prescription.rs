//! Prescribed drugs. Same flat-row sync shape as measurements; the domain
//! twist is that "stopping" a drug is a soft delete, and a refill with a new
//! dosage arrives as a fresh row from the server.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use opencare_core::{Prescription, PrescriptionPayload, RecordType, SyncStatus};

use crate::changes::ChangeNotifier;
use crate::error::{DbError, DbResult};
use crate::repository::support::{self, MergeAction};

#[derive(Debug, Clone)]
pub struct PrescriptionRepository {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl PrescriptionRepository {
    pub fn new(pool: SqlitePool, notifier: ChangeNotifier) -> Self {
        PrescriptionRepository { pool, notifier }
    }

    pub async fn save(&self, prescription: &Prescription) -> DbResult<()> {
        let mut prescription = prescription.clone();
        prescription.updated_at = Utc::now();
        prescription.sync_status = SyncStatus::Pending;

        debug!(id = %prescription.id, name = %prescription.name, "Saving prescription");

        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, &prescription).await?;

        self.notifier.notify(RecordType::Prescription);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Prescription>> {
        let row = sqlx::query_as::<_, Prescription>(
            "SELECT * FROM prescriptions WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Currently prescribed drugs for a patient.
    pub async fn prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let rows = sqlx::query_as::<_, Prescription>(
            "SELECT * FROM prescriptions WHERE patient_id = ?1 AND deleted_at IS NULL \
             ORDER BY name, id",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stops a drug: soft delete, queued for push.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE prescriptions SET deleted_at = ?2, updated_at = ?2, sync_status = ?3 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Prescription", id));
        }

        self.notifier.notify(RecordType::Prescription);
        Ok(())
    }

    /// Count of prescription rows for a patient changed after `instant`,
    /// regardless of sync status, tombstones included.
    pub async fn changed_since(
        &self,
        patient_id: &str,
        instant: DateTime<Utc>,
    ) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM prescriptions WHERE patient_id = ?1 AND updated_at > ?2",
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
    ) -> DbResult<Vec<Prescription>> {
        let rows = support::records_with_status(&self.pool, "prescriptions", status).await?;
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
        support::set_status_for_ids(&self.pool, "prescriptions", "id", ids, status).await?;
        self.notifier.notify(RecordType::Prescription);
        Ok(())
    }

    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> DbResult<()> {
        support::set_status_transition(&self.pool, "prescriptions", from, to).await?;
        self.notifier.notify(RecordType::Prescription);
        Ok(())
    }

    pub async fn merge_with_local_data(&self, payloads: Vec<PrescriptionPayload>) -> DbResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let count = payloads.len();
        let mut tx = self.pool.begin().await?;

        for payload in &payloads {
            if support::merge_action(&mut tx, "prescriptions", &payload.id).await?
                == MergeAction::Upsert
            {
                upsert_row(&mut tx, &payload.to_record(SyncStatus::Done)).await?;
            }
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::Prescription);

        info!(count, "Merged prescription payloads");
        Ok(())
    }
}

async fn upsert_row(conn: &mut SqliteConnection, p: &Prescription) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO prescriptions (
            id, patient_id, facility_id, name, dosage, rxnorm_code,
            is_protocol_drug, created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            patient_id = excluded.patient_id,
            facility_id = excluded.facility_id,
            name = excluded.name,
            dosage = excluded.dosage,
            rxnorm_code = excluded.rxnorm_code,
            is_protocol_drug = excluded.is_protocol_drug,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&p.id)
    .bind(&p.patient_id)
    .bind(&p.facility_id)
    .bind(&p.name)
    .bind(&p.dosage)
    .bind(&p.rxnorm_code)
    .bind(p.is_protocol_drug)
    .bind(p.created_at)
    .bind(p.updated_at)
    .bind(p.deleted_at)
    .bind(p.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::prescription;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn stopped_drug_disappears_from_patient_view_but_stays_queued() {
        let db = db().await;
        let repo = db.prescriptions();

        repo.save(&prescription("rx1", "p1")).await.unwrap();
        repo.save(&prescription("rx2", "p1")).await.unwrap();
        repo.soft_delete("rx1").await.unwrap();

        let visible = repo.prescriptions_for_patient("p1").await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "rx2");

        let pending = repo.records_with_sync_status(SyncStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn merge_keeps_local_pending_dosage_change() {
        let db = db().await;
        let repo = db.prescriptions();

        let mut local = prescription("rx1", "p1");
        local.dosage = Some("10 mg".into());
        repo.save(&local).await.unwrap();

        let mut incoming = prescription("rx1", "p1");
        incoming.dosage = Some("5 mg".into());
        repo.merge_with_local_data(vec![PrescriptionPayload::from(&incoming)])
            .await
            .unwrap();

        let stored = repo.get("rx1").await.unwrap().unwrap();
        assert_eq!(stored.dosage.as_deref(), Some("10 mg"));
    }
}
