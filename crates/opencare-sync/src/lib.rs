//! # opencare-sync: Sync Engine for OpenCare
//!
//! Keeps a device's local record store converging with the backend.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     opencare-sync (THIS CRATE)                      │
//! │                                                                     │
//! │   ┌──────────────┐      ┌──────────────────┐     ┌──────────────┐  │
//! │   │  SyncWorker  │─────►│ SyncCoordinator  │────►│  SyncApi     │  │
//! │   │  (one per    │      │ push: pending →  │     │  (transport, │  │
//! │   │ record type) │      │   upload → ack   │     │  host-owned) │  │
//! │   │              │      │ pull: token page │     └──────────────┘  │
//! │   └──────────────┘      │   loop → merge   │                       │
//! │                         └────────┬─────────┘                       │
//! │                                  │ SyncRepository contract         │
//! └──────────────────────────────────┼─────────────────────────────────┘
//!                                    ▼
//!                         opencare-db repositories
//! ```
//!
//! ## Module Organization
//! - [`contract`] - `SyncRepository` / `SyncApi` traits
//! - [`repositories`] - contract impls for every opencare-db repository
//! - [`coordinator`] - push and pull protocols
//! - [`worker`] - periodic per-record-type sync loops
//! - [`config`] - TOML + environment configuration
//! - [`error`] - sync error types and retryability

pub mod config;
pub mod contract;
pub mod coordinator;
pub mod error;
pub mod repositories;
pub mod worker;

pub use config::{SyncConfig, SyncSettings};
pub use contract::{SyncApi, SyncRecord, SyncRepository};
pub use coordinator::{PullOutcome, PushOutcome, SyncCoordinator};
pub use error::{SyncError, SyncResult};
pub use worker::{SyncWorker, SyncWorkerHandle};
