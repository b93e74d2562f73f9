//! # Database Pool Management
//!
//! Connection pool creation and configuration for the local SQLite store.
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so background sync
//! transactions never block user-facing reads:
//! - Readers don't block writers
//! - Writers don't block readers
//! - Better crash recovery

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use opencare_core::RecordType;

use crate::changes::{ChangeEvent, ChangeNotifier};
use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::appointment::AppointmentRepository;
use crate::repository::facility::FacilityRepository;
use crate::repository::measurement::MeasurementRepository;
use crate::repository::medical_history::MedicalHistoryRepository;
use crate::repository::patient::PatientRepository;
use crate::repository::prescription::PrescriptionRepository;
use crate::repository::sync_token::SyncTokenRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/opencare.db")
///     .max_connections(5)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for one device's screens plus sync workers)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Connection timeout duration.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on connect.
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// In-memory databases are per-connection, so the pool is pinned to a
    /// single connection that never idles out.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; clones share the pool and the change notifier. Every
/// repository obtained from the same `Database` reports mutations through the
/// same [`ChangeNotifier`], which is what live screens subscribe to.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    notifier: ChangeNotifier,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL journal, NORMAL synchronous, foreign keys on
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = if config.is_in_memory() {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            // sqlite://path?mode=rwc creates the file if missing
            let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
            SqliteConnectOptions::from_str(&connect_url)
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        }
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            notifier: ChangeNotifier::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For advanced queries not covered by repositories; prefer repository
    /// methods when available.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Subscribes to change events for all record types.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    // -------------------------------------------------------------------------
    // Repository accessors
    // -------------------------------------------------------------------------

    pub fn patients(&self) -> PatientRepository {
        PatientRepository::new(self.pool.clone(), self.notifier.clone())
    }

    pub fn measurements(&self) -> MeasurementRepository {
        MeasurementRepository::new(self.pool.clone(), self.notifier.clone())
    }

    pub fn prescriptions(&self) -> PrescriptionRepository {
        PrescriptionRepository::new(self.pool.clone(), self.notifier.clone())
    }

    pub fn appointments(&self) -> AppointmentRepository {
        AppointmentRepository::new(self.pool.clone(), self.notifier.clone())
    }

    pub fn medical_histories(&self) -> MedicalHistoryRepository {
        MedicalHistoryRepository::new(self.pool.clone(), self.notifier.clone())
    }

    pub fn facilities(&self) -> FacilityRepository {
        FacilityRepository::new(self.pool.clone())
    }

    pub fn sync_tokens(&self) -> SyncTokenRepository {
        SyncTokenRepository::new(self.pool.clone())
    }

    // -------------------------------------------------------------------------
    // Bulk wipe
    // -------------------------------------------------------------------------

    /// Clears all patient-data tables and continuation tokens in one
    /// transaction. Used on logout/account switch.
    ///
    /// Reference tables (facilities) and anything session-related are left
    /// untouched: a freshly logged-in user at the same clinic must still see
    /// its facility list without re-pulling reference data.
    pub async fn wipe_patient_data(&self) -> DbResult<()> {
        info!("Wiping local patient data");

        let mut tx = self.pool.begin().await?;

        // Dependents first so the patient FK holds mid-transaction.
        for table in [
            "addresses",
            "phone_numbers",
            "business_ids",
            "measurements",
            "prescriptions",
            "appointments",
            "medical_histories",
            "patients",
            "sync_tokens",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        for record_type in RecordType::all() {
            self.notifier.notify(record_type);
        }

        info!("Local patient data wiped");
        Ok(())
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{facility, measurement, profile};
    use opencare_core::SyncStatus;

    #[tokio::test]
    async fn in_memory_database_is_healthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn config_builder_applies_settings() {
        let config = DbConfig::new("/tmp/opencare-test.db")
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
    }

    #[tokio::test]
    async fn wipe_clears_patient_data_but_keeps_facilities() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let fac = facility("fac-1");
        db.facilities().save(&fac).await.unwrap();

        let profile = profile("patient-1");
        db.patients().save_profile(&profile).await.unwrap();
        db.measurements()
            .save(&measurement("m-1", "patient-1", "fac-1"))
            .await
            .unwrap();
        db.sync_tokens()
            .set(RecordType::Measurement, "tok-9")
            .await
            .unwrap();

        db.wipe_patient_data().await.unwrap();

        assert!(db.patients().get("patient-1").await.unwrap().is_none());
        let pending = db
            .measurements()
            .records_with_sync_status(SyncStatus::Pending)
            .await
            .unwrap();
        assert!(pending.is_empty());
        assert_eq!(
            db.sync_tokens().get(RecordType::Measurement).await.unwrap(),
            None
        );

        // Reference data survives logout.
        assert!(db.facilities().get("fac-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mutations_emit_change_events() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut rx = db.subscribe();

        db.patients().save_profile(&profile("patient-7")).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.record_type, opencare_core::RecordType::Patient);
    }
}
