//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use approvals::config::Config;
use approvals::models::notification::Notification;
use approvals::notification::{ClientAccess, Relay};
use approvals::service::{RequestService, TransitionPolicy};
use approvals::store::memory::MemoryStore;
use approvals::AppState;

/// Relay double that records every publish and can be told to fail.
#[derive(Default)]
pub struct RecordingRelay {
    sent: Mutex<Vec<(String, Notification)>>,
    failing: AtomicBool,
}

impl RecordingRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let relay = Self::default();
        relay.failing.store(true, Ordering::SeqCst);
        Arc::new(relay)
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn send_to_group(&self, group: &str, notification: &Notification) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("relay unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((group.to_string(), notification.clone()));
        Ok(())
    }

    async fn client_access(&self, user_id: &str, roles: &[&str]) -> anyhow::Result<ClientAccess> {
        Ok(ClientAccess {
            url: format!("wss://relay.test/client?user={}&roles={}", user_id, roles.join(",")),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub relay: Arc<RecordingRelay>,
    pub service: RequestService,
}

pub fn harness(policy: TransitionPolicy) -> Harness {
    harness_with(RecordingRelay::new(), policy)
}

pub fn harness_with(relay: Arc<RecordingRelay>, policy: TransitionPolicy) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let service = RequestService::new(store.clone(), relay.clone(), policy);
    Harness {
        store,
        relay,
        service,
    }
}

pub fn state_with(relay: Arc<dyn Relay>, policy: TransitionPolicy) -> Arc<AppState> {
    let config = Config {
        transition_policy: policy,
        ..Config::default()
    };
    AppState::new(Arc::new(MemoryStore::new()), relay, config)
}
