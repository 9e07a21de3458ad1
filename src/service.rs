//! Request lifecycle and notification fan-out.
//!
//! Every successful create or status update is one store write followed by
//! one relay publish. The two are not transactional: a failed publish is
//! logged and counted, and the caller still gets the stored record.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::metrics;
use crate::models::notification::Notification;
use crate::models::request::{Decision, NewRequest, Request, RequestStatus};
use crate::notification::{Relay, CLIENT_ROLES};
use crate::store::{RequestStore, StatusChange};

/// What a status update may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Unconditional write: last writer wins, decided requests can be re-decided.
    #[default]
    Overwrite,
    /// Only pending requests can be decided; anything else is a conflict.
    PendingOnly,
}

impl FromStr for TransitionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(TransitionPolicy::Overwrite),
            "pending-only" | "pending_only" => Ok(TransitionPolicy::PendingOnly),
            other => anyhow::bail!(
                "invalid transition policy '{}': expected overwrite or pending-only",
                other
            ),
        }
    }
}

/// Reply to a negotiate call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Negotiated {
    pub url: String,
    pub user_id: String,
}

pub struct RequestService {
    store: Arc<dyn RequestStore>,
    relay: Arc<dyn Relay>,
    policy: TransitionPolicy,
}

impl RequestService {
    pub fn new(
        store: Arc<dyn RequestStore>,
        relay: Arc<dyn Relay>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            store,
            relay,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    pub async fn create(&self, input: NewRequest) -> Result<Request, AppError> {
        input.validate()?;

        let record = Request::pending(input.name, input.message, now());
        let stored = self.store.insert(&record).await?;
        metrics::record_created();
        tracing::info!(request_id = %stored.id, "request created");

        self.publish(Notification::NewRequest(stored.clone())).await;
        Ok(stored)
    }

    pub async fn list(&self) -> Result<Vec<Request>, AppError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Request, AppError> {
        self.store.get(id).await?.ok_or(AppError::NotFound)
    }

    pub async fn update_status(&self, id: Uuid, decision: Decision) -> Result<Request, AppError> {
        let status = RequestStatus::from(decision);
        let only_if = match self.policy {
            TransitionPolicy::Overwrite => None,
            TransitionPolicy::PendingOnly => Some(RequestStatus::Pending),
        };

        let updated = match self.store.update_status(id, status, now(), only_if).await? {
            StatusChange::Updated(r) => r,
            StatusChange::NotFound => return Err(AppError::NotFound),
            StatusChange::Conflict(current) => {
                tracing::warn!(
                    request_id = %id,
                    current = %current.status,
                    requested = %status,
                    "status update refused: request already decided"
                );
                return Err(AppError::AlreadyDecided(current.status));
            }
        };
        metrics::record_decision(updated.status);
        tracing::info!(request_id = %id, status = %updated.status, "request status updated");

        self.publish(Notification::StatusUpdate(updated.clone())).await;
        Ok(updated)
    }

    /// Issue a relay endpoint for `user_id`; an absent or empty id gets a
    /// generated `user-<millis>` one.
    pub async fn negotiate(&self, user_id: Option<String>) -> Result<Negotiated, AppError> {
        let user_id = user_id
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("user-{}", Utc::now().timestamp_millis()));

        let access = self
            .relay
            .client_access(&user_id, &CLIENT_ROLES)
            .await
            .map_err(|e| AppError::Internal(e.context("failed to generate relay token")))?;

        tracing::debug!(user_id = %user_id, expires_at = %access.expires_at, "relay endpoint issued");
        Ok(Negotiated {
            url: access.url,
            user_id,
        })
    }

    async fn publish(&self, notification: Notification) {
        let group = notification.audience().group();
        match self.relay.send_to_group(&group, &notification).await {
            Ok(()) => metrics::record_publish(notification.kind(), true),
            Err(e) => {
                metrics::record_publish(notification.kind(), false);
                tracing::error!(
                    group = %group,
                    kind = notification.kind(),
                    request_id = %notification.request().id,
                    "relay publish failed, subscribers stay stale until refresh: {:#}",
                    e
                );
            }
        }
    }
}

/// Wall clock truncated to the microsecond precision Postgres stores.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
