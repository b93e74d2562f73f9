//! # Repository Implementations
//!
//! One repository per synced entity type. All of them follow the same
//! pattern:
//!
//! - local mutations stamp `updated_at = now` and `sync_status = 'pending'`
//! - user-facing reads filter soft-deleted rows; sync reads do not
//! - `records_with_sync_status` / `set_sync_status*` respect the SQLite
//!   bound-parameter ceiling by chunking (see [`support`])
//! - `merge_with_local_data` applies the status-aware merge rule in one
//!   transaction: insert missing rows as `done`, overwrite `done` rows,
//!   never touch `pending`/`invalid` rows

pub mod appointment;
pub mod facility;
pub mod measurement;
pub mod medical_history;
pub mod patient;
pub mod prescription;
pub(crate) mod support;
pub mod sync_token;
