//! # opencare-db: Database Layer for OpenCare
//!
//! SQLite-backed storage for the offline-first clinical records store.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      opencare-db (THIS CRATE)                       │
//! │                                                                     │
//! │   ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐     │
//! │   │   Database   │   │  Repositories  │   │    Migrations    │     │
//! │   │  (pool.rs)   │   │ patient.rs ... │   │    (embedded)    │     │
//! │   │              │◄──│ merge engine,  │   │ 001_initial_...  │     │
//! │   │  SqlitePool  │   │ chunked status │   │                  │     │
//! │   │  WAL mode    │   │ queries        │   │                  │     │
//! │   └──────────────┘   └────────────────┘   └──────────────────┘     │
//! │            │                                                        │
//! │            ▼                                                        │
//! │   ChangeNotifier (changes.rs) - every committed mutation emits a   │
//! │   ChangeEvent so live screens can re-query                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`pool`] - Connection pool creation, repository accessors, bulk wipe
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`changes`] - Change notification for subscriptions
//! - [`repository`] - Repository implementations (per entity type)

pub mod changes;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use changes::{ChangeEvent, ChangeNotifier};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::appointment::AppointmentRepository;
pub use repository::facility::FacilityRepository;
pub use repository::measurement::MeasurementRepository;
pub use repository::medical_history::MedicalHistoryRepository;
pub use repository::patient::PatientRepository;
pub use repository::prescription::PrescriptionRepository;
pub use repository::sync_token::SyncTokenRepository;
