use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::request::Request;

pub const ADMINS_GROUP: &str = "admins";

/// Fan-out message published to the relay.
/// Wire shape: `{"type": "new_request" | "status_update", "data": <Request>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Notification {
    NewRequest(Request),
    StatusUpdate(Request),
}

impl Notification {
    pub fn request(&self) -> &Request {
        match self {
            Notification::NewRequest(r) | Notification::StatusUpdate(r) => r,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::NewRequest(_) => "new_request",
            Notification::StatusUpdate(_) => "status_update",
        }
    }

    /// New requests go to every approver; status updates only to the
    /// requester of that one request.
    pub fn audience(&self) -> Audience {
        match self {
            Notification::NewRequest(_) => Audience::Admins,
            Notification::StatusUpdate(r) => Audience::Requester(r.id),
        }
    }
}

/// A named subscriber set on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admins,
    Requester(Uuid),
}

impl Audience {
    pub fn group(&self) -> String {
        match self {
            Audience::Admins => ADMINS_GROUP.to_string(),
            Audience::Requester(id) => format!("request-{}", id),
        }
    }
}
