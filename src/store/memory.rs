use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{RequestStore, StatusChange};
use crate::models::request::{Request, RequestStatus};

/// Process-local store used when no `DATABASE_URL` is configured, and by tests.
/// Records are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<Uuid, Request>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert(&self, request: &Request) -> anyhow::Result<Request> {
        if self.rows.contains_key(&request.id) {
            anyhow::bail!("duplicate request id {}", request.id);
        }
        self.rows.insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn list(&self) -> anyhow::Result<Vec<Request>> {
        let mut rows: Vec<Request> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Request>> {
        Ok(self.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
        only_if: Option<RequestStatus>,
    ) -> anyhow::Result<StatusChange> {
        // get_mut holds the shard lock, so check-and-set is atomic per id
        let Some(mut row) = self.rows.get_mut(&id) else {
            return Ok(StatusChange::NotFound);
        };
        if let Some(required) = only_if {
            if row.status != required {
                return Ok(StatusChange::Conflict(row.clone()));
            }
        }
        row.status = status;
        row.updated_at = at.max(row.updated_at + Duration::microseconds(1));
        Ok(StatusChange::Updated(row.clone()))
    }
}
