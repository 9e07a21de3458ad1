use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::{ClientAccess, Relay};
use crate::client::{ConnectionState, Subscription, EVENT_BUFFER};
use crate::models::notification::Notification;

/// Per-group backlog before slow subscribers start losing messages.
const GROUP_CAPACITY: usize = 256;

/// In-process relay: one broadcast channel per group.
///
/// Used when no managed relay is configured and in tests. Subscribers live in
/// the same process and attach through [`LocalRelay::subscribe`]; it cannot
/// issue network endpoints.
#[derive(Default)]
pub struct LocalRelay {
    groups: DashMap<String, broadcast::Sender<Notification>>,
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver on `group`, created under the entry lock so a concurrent
    /// prune cannot orphan it.
    fn join(&self, group: &str) -> broadcast::Receiver<Notification> {
        self.groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(GROUP_CAPACITY).0)
            .subscribe()
    }

    /// Drop groups nobody is subscribed to.
    fn prune(&self) {
        self.groups.retain(|_, tx| tx.receiver_count() > 0);
    }

    /// Number of groups with a live channel.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Join `groups` and receive their messages. The subscription is already
    /// joined when this returns, so nothing published afterwards is missed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the merge task is
    /// spawned onto the current one.
    pub fn subscribe(&self, groups: &[String]) -> Subscription {
        self.prune();
        let streams: Vec<_> = groups
            .iter()
            .map(|g| BroadcastStream::new(self.join(g)))
            .collect();

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut merged = futures::stream::select_all(streams);
            loop {
                tokio::select! {
                    item = merged.next() => match item {
                        Some(Ok(notification)) => {
                            if event_tx.send(notification).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(BroadcastStreamRecvError::Lagged(n))) => {
                            tracing::warn!(skipped = n, "local relay subscriber lagged, messages dropped");
                        }
                        None => break,
                    },
                    _ = event_tx.closed() => break,
                }
            }
            // release the group receivers before reporting the end
            drop(merged);
            state_tx.send_replace(ConnectionState::Disconnected);
        });

        Subscription {
            state: state_rx,
            events: event_rx,
        }
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn send_to_group(&self, group: &str, notification: &Notification) -> anyhow::Result<()> {
        if self
            .groups
            .remove_if(group, |_, tx| tx.receiver_count() == 0)
            .is_some()
        {
            tracing::debug!(group = %group, "last local subscriber left, group dropped");
            return Ok(());
        }
        let Some(tx) = self.groups.get(group).map(|s| s.clone()) else {
            tracing::debug!(group = %group, "no local subscribers, dropping notification");
            return Ok(());
        };
        // An error only means nobody is listening right now
        let delivered = tx.send(notification.clone()).unwrap_or(0);
        tracing::debug!(group = %group, delivered, "local relay broadcast");
        Ok(())
    }

    async fn client_access(&self, _user_id: &str, _roles: &[&str]) -> anyhow::Result<ClientAccess> {
        anyhow::bail!("in-process relay does not issue client endpoints; set RELAY_CONNECTION_STRING")
    }
}
