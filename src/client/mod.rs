//! Client side of the real-time channel: the relay connection state machine,
//! the HTTP API client, and the two reconciling views built on top of them.

pub mod connection;
pub mod http;
pub mod views;

use tokio::sync::{mpsc, watch};

use crate::models::notification::Notification;
use crate::models::request::Request;

/// Lifecycle of one relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

/// A live relay subscription: connection state plus the typed fan-out events
/// received on the joined groups. The event channel closes when the
/// connection ends.
pub struct Subscription {
    pub state: watch::Receiver<ConnectionState>,
    pub events: mpsc::Receiver<Notification>,
}

/// Buffer size for events not yet consumed by a view.
pub(crate) const EVENT_BUFFER: usize = 64;

/// Server answer to a decision made from this client, or a message saying
/// why it could not be made.
pub type LocalDecision = Result<Request, String>;

/// Something that reconciles relay events into local state.
pub trait View {
    /// Merge one event. Returns true if the visible state changed.
    fn apply(&mut self, notification: &Notification) -> bool;

    fn set_connection(&mut self, state: ConnectionState);

    /// Reflect the server's answer to our own approve/reject call.
    fn record_decision(&mut self, updated: Request) -> bool {
        self.apply(&Notification::StatusUpdate(updated))
    }

    /// One-line message shown to the user, cleared with `None`.
    fn set_notice(&mut self, _notice: Option<String>) {}
}

/// Drive `view` from `subscription` until the event channel closes, calling
/// `on_change` after every visible change.
pub async fn follow<V: View>(view: &mut V, subscription: Subscription, on_change: impl FnMut(&V)) {
    follow_with_decisions(view, subscription, None, on_change).await
}

/// Like [`follow`], also merging the outcomes of decisions made locally.
/// The decision channel closing does not end the loop.
pub async fn follow_with_decisions<V: View>(
    view: &mut V,
    mut subscription: Subscription,
    mut decisions: Option<mpsc::Receiver<LocalDecision>>,
    mut on_change: impl FnMut(&V),
) {
    let initial = *subscription.state.borrow_and_update();
    view.set_connection(initial);
    on_change(view);

    let mut state_open = true;
    let mut decisions_open = decisions.is_some();
    loop {
        tokio::select! {
            changed = subscription.state.changed(), if state_open => match changed {
                Ok(()) => {
                    let state = *subscription.state.borrow_and_update();
                    view.set_connection(state);
                    on_change(view);
                }
                Err(_) => state_open = false,
            },
            event = subscription.events.recv() => match event {
                Some(notification) => {
                    if view.apply(&notification) {
                        on_change(view);
                    }
                }
                None => break,
            },
            decision = next_decision(&mut decisions), if decisions_open => match decision {
                Some(Ok(updated)) => {
                    view.set_notice(None);
                    view.record_decision(updated);
                    on_change(view);
                }
                Some(Err(msg)) => {
                    view.set_notice(Some(msg));
                    on_change(view);
                }
                None => decisions_open = false,
            },
        }
    }

    view.set_connection(ConnectionState::Disconnected);
    on_change(view);
}

async fn next_decision(decisions: &mut Option<mpsc::Receiver<LocalDecision>>) -> Option<LocalDecision> {
    match decisions {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
