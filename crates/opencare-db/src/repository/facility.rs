//! Facilities are reference data: pulled read-only, never pushed, and kept
//! through the bulk patient-data wipe. No sync status, no change events.

use sqlx::SqlitePool;

use opencare_core::Facility;

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct FacilityRepository {
    pool: SqlitePool,
}

impl FacilityRepository {
    pub fn new(pool: SqlitePool) -> Self {
        FacilityRepository { pool }
    }

    pub async fn save(&self, facility: &Facility) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO facilities (
                id, name, district, state, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                district = excluded.district,
                state = excluded.state,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at
            "#,
        )
        .bind(&facility.id)
        .bind(&facility.name)
        .bind(&facility.district)
        .bind(&facility.state)
        .bind(facility.created_at)
        .bind(facility.updated_at)
        .bind(facility.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Facility>> {
        let row = sqlx::query_as::<_, Facility>(
            "SELECT * FROM facilities WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All live facilities, alphabetical.
    pub async fn all(&self) -> DbResult<Vec<Facility>> {
        let rows = sqlx::query_as::<_, Facility>(
            "SELECT * FROM facilities WHERE deleted_at IS NULL ORDER BY name, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::test_support::facility;

    #[tokio::test]
    async fn facilities_upsert_and_list_alphabetically() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.facilities();

        let mut b = facility("fac-b");
        b.name = "Zila Hospital".into();
        let mut a = facility("fac-a");
        a.name = "CHC Rampura".into();

        repo.save(&b).await.unwrap();
        repo.save(&a).await.unwrap();

        let all = repo.all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "CHC Rampura");

        b.name = "District Hospital".into();
        repo.save(&b).await.unwrap();
        assert_eq!(
            repo.get("fac-b").await.unwrap().unwrap().name,
            "District Hospital"
        );
    }
}
