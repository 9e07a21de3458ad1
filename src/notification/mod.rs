pub mod local;
pub mod webpubsub;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::notification::Notification;

/// Roles granted to every negotiated client connection.
pub const CLIENT_ROLES: [&str; 2] = ["webpubsub.sendToGroup", "webpubsub.joinLeaveGroup"];

/// A scoped, time-limited endpoint a client opens its real-time channel on.
#[derive(Debug, Clone)]
pub struct ClientAccess {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Abstraction over the publish/subscribe relay.
/// Implementations: WebPubSubRelay (managed service over REST), LocalRelay (in-process).
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast a notification to every connection joined to `group`.
    async fn send_to_group(&self, group: &str, notification: &Notification) -> anyhow::Result<()>;

    /// Issue a connection endpoint for `user_id` carrying `roles`.
    async fn client_access(&self, user_id: &str, roles: &[&str]) -> anyhow::Result<ClientAccess>;
}
