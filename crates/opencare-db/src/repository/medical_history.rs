//! Medical history questionnaires. One row per patient in practice, but the
//! store does not enforce that; rows sync and merge like any other flat type.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use opencare_core::{MedicalHistory, MedicalHistoryPayload, RecordType, SyncStatus};

use crate::changes::ChangeNotifier;
use crate::error::{DbError, DbResult};
use crate::repository::support::{self, MergeAction};

#[derive(Debug, Clone)]
pub struct MedicalHistoryRepository {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl MedicalHistoryRepository {
    pub fn new(pool: SqlitePool, notifier: ChangeNotifier) -> Self {
        MedicalHistoryRepository { pool, notifier }
    }

    pub async fn save(&self, history: &MedicalHistory) -> DbResult<()> {
        let mut history = history.clone();
        history.updated_at = Utc::now();
        history.sync_status = SyncStatus::Pending;

        debug!(id = %history.id, patient_id = %history.patient_id, "Saving medical history");

        let mut conn = self.pool.acquire().await?;
        upsert_row(&mut conn, &history).await?;

        self.notifier.notify(RecordType::MedicalHistory);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<MedicalHistory>> {
        let row = sqlx::query_as::<_, MedicalHistory>(
            "SELECT * FROM medical_histories WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Latest questionnaire for a patient, if any.
    pub async fn history_for_patient(&self, patient_id: &str) -> DbResult<Option<MedicalHistory>> {
        let row = sqlx::query_as::<_, MedicalHistory>(
            "SELECT * FROM medical_histories \
             WHERE patient_id = ?1 AND deleted_at IS NULL \
             ORDER BY updated_at DESC, id DESC LIMIT 1",
        )
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE medical_histories SET deleted_at = ?2, updated_at = ?2, sync_status = ?3 \
             WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .bind(SyncStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("MedicalHistory", id));
        }

        self.notifier.notify(RecordType::MedicalHistory);
        Ok(())
    }

    // =========================================================================
    // Syncable Repository Operations
    // =========================================================================

    pub async fn records_with_sync_status(
        &self,
        status: SyncStatus,
    ) -> DbResult<Vec<MedicalHistory>> {
        let rows = support::records_with_status(&self.pool, "medical_histories", status).await?;
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
        support::set_status_for_ids(&self.pool, "medical_histories", "id", ids, status).await?;
        self.notifier.notify(RecordType::MedicalHistory);
        Ok(())
    }

    pub async fn set_sync_status(&self, from: SyncStatus, to: SyncStatus) -> DbResult<()> {
        support::set_status_transition(&self.pool, "medical_histories", from, to).await?;
        self.notifier.notify(RecordType::MedicalHistory);
        Ok(())
    }

    pub async fn merge_with_local_data(
        &self,
        payloads: Vec<MedicalHistoryPayload>,
    ) -> DbResult<()> {
        if payloads.is_empty() {
            return Ok(());
        }

        let count = payloads.len();
        let mut tx = self.pool.begin().await?;

        for payload in &payloads {
            if support::merge_action(&mut tx, "medical_histories", &payload.id).await?
                == MergeAction::Upsert
            {
                upsert_row(&mut tx, &payload.to_record(SyncStatus::Done)).await?;
            }
        }

        tx.commit().await?;
        self.notifier.notify(RecordType::MedicalHistory);

        info!(count, "Merged medical history payloads");
        Ok(())
    }
}

async fn upsert_row(conn: &mut SqliteConnection, h: &MedicalHistory) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO medical_histories (
            id, patient_id, diagnosed_with_hypertension, has_had_heart_attack,
            has_had_stroke, has_had_kidney_disease, has_diabetes,
            created_at, updated_at, deleted_at, sync_status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(id) DO UPDATE SET
            patient_id = excluded.patient_id,
            diagnosed_with_hypertension = excluded.diagnosed_with_hypertension,
            has_had_heart_attack = excluded.has_had_heart_attack,
            has_had_stroke = excluded.has_had_stroke,
            has_had_kidney_disease = excluded.has_had_kidney_disease,
            has_diabetes = excluded.has_diabetes,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at,
            sync_status = excluded.sync_status
        "#,
    )
    .bind(&h.id)
    .bind(&h.patient_id)
    .bind(h.diagnosed_with_hypertension)
    .bind(h.has_had_heart_attack)
    .bind(h.has_had_stroke)
    .bind(h.has_had_kidney_disease)
    .bind(h.has_diabetes)
    .bind(h.created_at)
    .bind(h.updated_at)
    .bind(h.deleted_at)
    .bind(h.sync_status)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::medical_history;
    use opencare_core::Answer;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn answering_a_question_re_queues_the_row() {
        let db = db().await;
        let repo = db.medical_histories();

        repo.merge_with_local_data(vec![MedicalHistoryPayload::from(&medical_history(
            "h1", "p1",
        ))])
        .await
        .unwrap();

        let mut history = repo.history_for_patient("p1").await.unwrap().unwrap();
        assert_eq!(history.sync_status, SyncStatus::Done);

        history.has_diabetes = Answer::Yes;
        repo.save(&history).await.unwrap();

        let stored = repo.get("h1").await.unwrap().unwrap();
        assert_eq!(stored.has_diabetes, Answer::Yes);
        assert_eq!(stored.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn merge_respects_unanswered_local_edit() {
        let db = db().await;
        let repo = db.medical_histories();

        let mut local = medical_history("h1", "p1");
        local.has_had_stroke = Answer::Yes;
        repo.save(&local).await.unwrap();

        let incoming = medical_history("h1", "p1");
        repo.merge_with_local_data(vec![MedicalHistoryPayload::from(&incoming)])
            .await
            .unwrap();

        let stored = repo.get("h1").await.unwrap().unwrap();
        assert_eq!(stored.has_had_stroke, Answer::Yes);
    }
}
