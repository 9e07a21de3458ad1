//! WebSocket subscriber for the managed relay.
//!
//! Speaks the `json.webpubsub.azure.v1` subprotocol:
//!   1. open the negotiated URL
//!   2. wait for the `connected` system message, then join each group
//!   3. decode group messages carrying a notification and forward them
//!   4. report Disconnected when the socket closes; reconnecting is the
//!      caller's business

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
    MaybeTlsStream, WebSocketStream,
};

use super::{ConnectionState, Subscription, EVENT_BUFFER};
use crate::models::notification::Notification;

pub const SUBPROTOCOL: &str = "json.webpubsub.azure.v1";

/// Frames the relay sends to a client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    System {
        event: String,
        #[serde(default)]
        user_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        #[serde(default)]
        group: Option<String>,
        #[serde(default)]
        data: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        ack_id: u64,
        success: bool,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    #[serde(other)]
    Unknown,
}

/// What one inbound frame means for the connection.
#[derive(Debug, PartialEq)]
pub enum Step {
    Connected,
    Closed,
    Event(Notification),
    Ignore,
}

/// Interpret one text frame. Anything that is not a well-formed notification
/// is ignored, matching the relay's at-most-once contract.
pub fn interpret(text: &str) -> Step {
    match serde_json::from_str::<Inbound>(text) {
        Ok(Inbound::System { event, user_id, message }) => match event.as_str() {
            "connected" => {
                tracing::info!(user_id = ?user_id, "relay connected");
                Step::Connected
            }
            "disconnected" => {
                tracing::info!(reason = ?message, "relay disconnected");
                Step::Closed
            }
            _ => Step::Ignore,
        },
        Ok(Inbound::Message { group, data }) => match serde_json::from_value::<Notification>(data) {
            Ok(n) => Step::Event(n),
            Err(e) => {
                tracing::debug!(group = ?group, "skipping non-notification message: {}", e);
                Step::Ignore
            }
        },
        Ok(Inbound::Ack { ack_id, success, error }) => {
            if !success {
                tracing::warn!(ack_id, error = ?error, "relay refused group operation");
            }
            Step::Ignore
        }
        Ok(Inbound::Unknown) => Step::Ignore,
        Err(e) => {
            tracing::debug!("undecodable relay frame: {}", e);
            Step::Ignore
        }
    }
}

fn join_group_frame(group: &str, ack_id: u64) -> Message {
    Message::Text(
        json!({ "type": "joinGroup", "group": group, "ackId": ack_id }).to_string(),
    )
}

/// Open the relay endpoint at `url` and join `groups` once connected.
/// Fails only if the WebSocket handshake fails.
pub async fn connect(url: &str, groups: Vec<String>) -> anyhow::Result<Subscription> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("sec-websocket-protocol", HeaderValue::from_static(SUBPROTOCOL));

    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    let (ws, _resp) = connect_async(request).await?;

    tokio::spawn(async move {
        if let Err(e) = run(ws, groups, &state_tx, &event_tx).await {
            tracing::warn!("relay connection ended: {}", e);
        }
        state_tx.send_replace(ConnectionState::Disconnected);
    });

    Ok(Subscription {
        state: state_rx,
        events: event_rx,
    })
}

async fn run(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    groups: Vec<String>,
    state_tx: &watch::Sender<ConnectionState>,
    event_tx: &mpsc::Sender<Notification>,
) -> anyhow::Result<()> {
    let (mut sink, mut stream) = ws.split();
    let mut next_ack: u64 = 0;

    loop {
        let frame = tokio::select! {
            frame = stream.next() => frame,
            // subscriber went away
            _ = event_tx.closed() => break,
        };
        let Some(frame) = frame else { break };

        match frame? {
            Message::Text(text) => match interpret(&text) {
                Step::Connected => {
                    state_tx.send_replace(ConnectionState::Connected);
                    for group in &groups {
                        next_ack += 1;
                        sink.send(join_group_frame(group, next_ack)).await?;
                    }
                }
                Step::Event(n) => {
                    if event_tx.send(n).await.is_err() {
                        break;
                    }
                }
                Step::Closed => break,
                Step::Ignore => {}
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = sink.close().await;
    Ok(())
}
