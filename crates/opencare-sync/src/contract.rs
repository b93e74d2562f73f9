//! # Syncable Repository Contract
//!
//! The coordinator is generic over two seams:
//!
//! - [`SyncRepository`]: what the local store must offer for a record type
//!   to participate in sync (pending-record reads, bulk status transitions,
//!   the merge engine).
//! - [`SyncApi`]: the transport. The engine never talks HTTP itself; hosts
//!   plug in a client per record type. Tests plug in scripted fakes.
//!
//! Both traits return `impl Future + Send` so a worker holding a repository
//! and an api can be driven from a spawned task.

use std::future::Future;

use opencare_core::{PullResponse, PushResponse, RecordType, SyncStatus};

use crate::error::SyncResult;

/// A record that can be pushed: it knows its own id, which is what the push
/// acknowledgment is keyed on.
pub trait SyncRecord {
    fn record_id(&self) -> &str;
}

/// The store-side contract for one synced record type.
pub trait SyncRepository: Send + Sync {
    /// What the store hands to the push path. For patients this is the whole
    /// profile bundle; for everything else the entity itself.
    type Record: SyncRecord + Send + Sync;

    /// The wire shape for this record type.
    type Payload: Send;

    fn record_type(&self) -> RecordType;

    /// Converts a record to its wire shape.
    fn to_payload(record: &Self::Record) -> Self::Payload;

    /// All records currently awaiting push.
    fn pending_records(&self) -> impl Future<Output = SyncResult<Vec<Self::Record>>> + Send;

    /// Sets the sync status of exactly the given ids.
    fn set_sync_status_for_ids(
        &self,
        ids: &[String],
        status: SyncStatus,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Moves every record currently in `from` to `to`.
    fn set_sync_status(
        &self,
        from: SyncStatus,
        to: SyncStatus,
    ) -> impl Future<Output = SyncResult<()>> + Send;

    /// Applies one pulled page through the status-aware merge rule.
    fn merge_with_local_data(
        &self,
        payloads: Vec<Self::Payload>,
    ) -> impl Future<Output = SyncResult<()>> + Send;
}

/// The transport contract for one synced record type.
pub trait SyncApi: Send + Sync {
    type Payload: Send;

    /// Uploads a batch of payloads. The response lists per-id validation
    /// rejections; an id absent from that list was accepted.
    fn push(
        &self,
        payloads: Vec<Self::Payload>,
    ) -> impl Future<Output = SyncResult<PushResponse>> + Send;

    /// Requests one page of server changes. `token` is the continuation
    /// token from the last merged page, or `None` for a first pull.
    fn pull(
        &self,
        page_size: usize,
        token: Option<String>,
    ) -> impl Future<Output = SyncResult<PullResponse<Self::Payload>>> + Send;
}
