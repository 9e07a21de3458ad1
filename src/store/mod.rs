pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::request::{Request, RequestStatus};

/// Outcome of a status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Updated(Request),
    NotFound,
    /// The record exists but its status did not match the required one.
    /// Carries the record as currently stored.
    Conflict(Request),
}

/// Persistence for Request records.
/// Implementations: [`postgres::PgStore`] and [`memory::MemoryStore`].
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Persist a new record and return it as stored.
    async fn insert(&self, request: &Request) -> anyhow::Result<Request>;

    /// All records, newest `created_at` first.
    async fn list(&self) -> anyhow::Result<Vec<Request>>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Request>>;

    /// Set `status` and move `updated_at` to `at`, or one microsecond past the
    /// previous value if `at` is not later. With `only_if`, the write only
    /// happens when the current status equals it.
    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
        only_if: Option<RequestStatus>,
    ) -> anyhow::Result<StatusChange>;
}
