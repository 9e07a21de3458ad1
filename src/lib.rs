//! Approval requests with real-time status fan-out.
//!
//! Library crate shared by the `approvals` binary and the integration tests.

pub mod api;
pub mod client;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod notification;
pub mod service;
pub mod store;

use std::sync::Arc;

use notification::Relay;
use service::RequestService;
use store::RequestStore;

/// Shared application state passed to handlers.
pub struct AppState {
    pub service: RequestService,
    pub config: config::Config,
}

impl AppState {
    /// Wire explicitly constructed store and relay handles into the service.
    pub fn new(
        store: Arc<dyn RequestStore>,
        relay: Arc<dyn Relay>,
        config: config::Config,
    ) -> Arc<Self> {
        let service = RequestService::new(store, relay, config.transition_policy);
        Arc::new(Self { service, config })
    }
}
