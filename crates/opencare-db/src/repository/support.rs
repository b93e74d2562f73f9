//! # Shared Repository Plumbing
//!
//! SQLite caps the number of bound parameters in a single statement (999 for
//! the stock build). A clinic device can easily accumulate more pending rows
//! than that between syncs, so every id-list statement chunks its input and
//! every status read pages its output, transparently to callers.

use opencare_core::SyncStatus;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

/// SQLite's default SQLITE_MAX_VARIABLE_NUMBER.
pub(crate) const MAX_QUERY_PARAMS: usize = 999;

/// Sets `sync_status` for an explicit id list, chunked to stay under the
/// bound-parameter ceiling. Idempotent: rows already in `status` are simply
/// rewritten.
///
/// Returns the number of affected rows across all chunks.
pub(crate) async fn set_status_for_ids(
    pool: &SqlitePool,
    table: &str,
    id_column: &str,
    ids: &[String],
    status: SyncStatus,
) -> Result<u64, sqlx::Error> {
    let mut affected = 0u64;

    // One bind is taken by the status itself.
    for chunk in ids.chunks(MAX_QUERY_PARAMS - 1) {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {table} SET sync_status = "));
        qb.push_bind(status);
        qb.push(format!(" WHERE {id_column} IN ("));

        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(id);
        }
        qb.push(")");

        affected += qb.build().execute(pool).await?.rows_affected();
    }

    Ok(affected)
}

/// Bulk transition: every row currently in `from` moves to `to`.
pub(crate) async fn set_status_transition(
    pool: &SqlitePool,
    table: &str,
    from: SyncStatus,
    to: SyncStatus,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE {table} SET sync_status = ?1 WHERE sync_status = ?2"
    ))
    .bind(to)
    .bind(from)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fetches every row with the given `sync_status`, paging with LIMIT/OFFSET
/// and unioning the pages so the full result set comes back even when it
/// exceeds a single query's limits.
///
/// Ordered by `(updated_at, id)` so paging is stable under concurrent reads.
pub(crate) async fn records_with_status<T>(
    pool: &SqlitePool,
    table: &str,
    status: SyncStatus,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let page = MAX_QUERY_PARAMS as i64;
    let sql = format!(
        "SELECT * FROM {table} WHERE sync_status = ?1 \
         ORDER BY updated_at ASC, id ASC LIMIT ?2 OFFSET ?3"
    );

    let mut records: Vec<T> = Vec::new();
    let mut offset: i64 = 0;

    loop {
        let rows: Vec<T> = sqlx::query_as(&sql)
            .bind(status)
            .bind(page)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        let fetched = rows.len();
        records.extend(rows);

        if (fetched as i64) < page {
            break;
        }
        offset += fetched as i64;
    }

    Ok(records)
}

/// What the merge engine should do with one incoming payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeAction {
    /// No local row, or the local row matches the server (`done`): the
    /// payload may be written.
    Upsert,
    /// The local row has an unpushed edit (`pending`) or a server rejection
    /// awaiting a local fix (`invalid`): the local row is authoritative.
    Skip,
}

/// Decides the merge action for one id by inspecting the local row's sync
/// status inside the merge transaction.
pub(crate) async fn merge_action(
    conn: &mut SqliteConnection,
    table: &str,
    id: &str,
) -> Result<MergeAction, sqlx::Error> {
    let status: Option<SyncStatus> =
        sqlx::query_scalar(&format!("SELECT sync_status FROM {table} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(conn)
            .await?;

    Ok(match status {
        Some(SyncStatus::Pending) | Some(SyncStatus::Invalid) => MergeAction::Skip,
        Some(SyncStatus::Done) | None => MergeAction::Upsert,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_stays_under_parameter_ceiling() {
        let ids: Vec<String> = (0..2500).map(|i| format!("id-{i}")).collect();
        let chunks: Vec<_> = ids.chunks(MAX_QUERY_PARAMS - 1).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() + 1 <= MAX_QUERY_PARAMS));
    }
}
