use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{RequestStore, StatusChange};
use crate::models::request::{Request, RequestStatus};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert(&self, request: &Request) -> anyhow::Result<Request> {
        let row = sqlx::query_as::<_, Request>(
            r#"INSERT INTO requests (id, name, message, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $5)
               RETURNING id, name, message, status, created_at, updated_at"#,
        )
        .bind(request.id)
        .bind(&request.name)
        .bind(&request.message)
        .bind(request.status)
        .bind(request.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("insert request failed: {:?}", e);
            e
        })?;
        Ok(row)
    }

    async fn list(&self) -> anyhow::Result<Vec<Request>> {
        let rows = sqlx::query_as::<_, Request>(
            r#"SELECT id, name, message, status, created_at, updated_at
               FROM requests
               ORDER BY created_at DESC, id DESC"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Request>> {
        let row = sqlx::query_as::<_, Request>(
            "SELECT id, name, message, status, created_at, updated_at FROM requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        at: DateTime<Utc>,
        only_if: Option<RequestStatus>,
    ) -> anyhow::Result<StatusChange> {
        let row = sqlx::query_as::<_, Request>(
            r#"UPDATE requests
               SET status = $1,
                   updated_at = GREATEST($2, updated_at + INTERVAL '1 microsecond')
               WHERE id = $3 AND ($4::varchar IS NULL OR status = $4)
               RETURNING id, name, message, status, created_at, updated_at"#,
        )
        .bind(status)
        .bind(at)
        .bind(id)
        .bind(only_if)
        .fetch_optional(&self.pool)
        .await?;

        match (row, only_if) {
            (Some(updated), _) => Ok(StatusChange::Updated(updated)),
            (None, None) => Ok(StatusChange::NotFound),
            // Conditional miss: tell "absent" apart from "wrong status"
            (None, Some(_)) => Ok(match self.get(id).await? {
                Some(current) => StatusChange::Conflict(current),
                None => StatusChange::NotFound,
            }),
        }
    }
}
