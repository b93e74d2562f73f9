//! Per-record-type continuation tokens for the pull protocol.
//!
//! A token is persisted only AFTER its page has merged, so a crash between
//! merge and token write replays at most one page. The merge is idempotent,
//! so the replay is harmless.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use opencare_core::RecordType;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct SyncTokenRepository {
    pool: SqlitePool,
}

impl SyncTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncTokenRepository { pool }
    }

    /// The stored continuation token for a record type. `None` means no
    /// pull has ever completed a page; the server treats a missing token
    /// as "from the beginning".
    pub async fn get(&self, record_type: RecordType) -> DbResult<Option<String>> {
        let token: Option<String> =
            sqlx::query_scalar("SELECT token FROM sync_tokens WHERE record_type = ?1")
                .bind(record_type.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(token)
    }

    /// Persists the continuation token returned with a merged page.
    pub async fn set(&self, record_type: RecordType, token: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sync_tokens (record_type, token, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(record_type) DO UPDATE SET \
                 token = excluded.token, updated_at = excluded.updated_at",
        )
        .bind(record_type.as_str())
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(record_type = %record_type, token, "Stored continuation token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn tokens_are_independent_per_record_type() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sync_tokens();

        assert_eq!(repo.get(RecordType::Patient).await.unwrap(), None);

        repo.set(RecordType::Patient, "tok-1").await.unwrap();
        repo.set(RecordType::Measurement, "tok-2").await.unwrap();
        repo.set(RecordType::Patient, "tok-3").await.unwrap();

        assert_eq!(
            repo.get(RecordType::Patient).await.unwrap().as_deref(),
            Some("tok-3")
        );
        assert_eq!(
            repo.get(RecordType::Measurement).await.unwrap().as_deref(),
            Some("tok-2")
        );
        assert_eq!(repo.get(RecordType::Appointment).await.unwrap(), None);
    }
}
