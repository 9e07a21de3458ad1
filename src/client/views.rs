//! Reconciling client views.
//!
//! Each view loads once over HTTP and then merges relay events by id. There
//! is no resync point: a view that missed a message stays stale until the
//! next message for that id arrives.

use std::fmt::Write as _;

use uuid::Uuid;

use super::{ConnectionState, View};
use crate::models::notification::Notification;
use crate::models::request::{Decision, Request, RequestStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Loading,
    Ready,
}

// ── Approver dashboard ───────────────────────────────────────

/// Every request, newest first, kept current by `new_request` and
/// `status_update` events.
#[derive(Debug)]
pub struct Dashboard {
    phase: Phase,
    connected: bool,
    requests: Vec<Request>,
    notice: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            phase: Phase::Loading,
            connected: false,
            requests: Vec::new(),
            notice: None,
        }
    }

    /// Initial full fetch.
    pub fn loaded(&mut self, requests: Vec<Request>) {
        self.requests = requests;
        self.phase = Phase::Ready;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn pending(&self) -> impl Iterator<Item = &Request> {
        self.requests
            .iter()
            .filter(|r| !r.status.is_terminal())
    }

    fn replace(&mut self, record: Request) -> bool {
        match self.requests.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record;
                true
            }
            None => false,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Approver dashboard [{}]",
            if self.connected { "connected" } else { "disconnected" }
        );
        match self.phase {
            Phase::Loading => out.push_str("  loading...\n"),
            Phase::Ready if self.requests.is_empty() => out.push_str("  no requests\n"),
            Phase::Ready => {
                for r in &self.requests {
                    let _ = writeln!(
                        out,
                        "  {:<36}  {:<8}  {:<20}  {}",
                        r.id,
                        r.status,
                        r.name,
                        r.created_at.format("%Y-%m-%d %H:%M:%S")
                    );
                    for line in r.message.lines() {
                        let _ = writeln!(out, "      {}", line);
                    }
                }
            }
        }
        if let Some(notice) = &self.notice {
            let _ = writeln!(out, "  ! {}", notice);
        }
        let _ = writeln!(
            out,
            "{} pending. Type `a <id>` to approve, `r <id>` to reject.",
            self.pending().count()
        );
        out
    }
}

/// Parse one dashboard input line: `a <id>` / `approve <id>` or
/// `r <id>` / `reject <id>`.
pub fn parse_decision(line: &str) -> Result<(Uuid, Decision), String> {
    let mut parts = line.split_whitespace();
    let decision = match parts.next() {
        Some("a") | Some("approve") => Decision::Approved,
        Some("r") | Some("reject") => Decision::Rejected,
        Some(other) => return Err(format!("unknown command '{}': use a <id> or r <id>", other)),
        None => return Err("empty command".to_string()),
    };
    let id = parts
        .next()
        .ok_or_else(|| "missing request id".to_string())?;
    let id = Uuid::parse_str(id).map_err(|_| format!("'{}' is not a request id", id))?;
    if parts.next().is_some() {
        return Err("too many arguments".to_string());
    }
    Ok((id, decision))
}

impl View for Dashboard {
    fn apply(&mut self, notification: &Notification) -> bool {
        match notification {
            Notification::NewRequest(r) => {
                // last message wins per id
                if !self.replace(r.clone()) {
                    self.requests.insert(0, r.clone());
                }
                true
            }
            Notification::StatusUpdate(r) => self.replace(r.clone()),
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connected = state == ConnectionState::Connected;
    }

    fn record_decision(&mut self, updated: Request) -> bool {
        self.replace(updated)
    }

    fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }
}

// ── Requester status page ────────────────────────────────────

/// One request as seen by its submitter.
#[derive(Debug)]
pub struct StatusPage {
    id: Uuid,
    phase: Phase,
    connected: bool,
    request: Option<Request>,
}

impl StatusPage {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: Phase::Loading,
            connected: false,
            request: None,
        }
    }

    /// Initial fetch; `None` when the server does not know the id.
    pub fn loaded(&mut self, request: Option<Request>) {
        self.request = request.filter(|r| r.id == self.id);
        self.phase = Phase::Ready;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Request {} [{}]",
            self.id,
            if self.connected { "connected" } else { "disconnected" }
        );
        match (self.phase, &self.request) {
            (Phase::Loading, _) => out.push_str("  loading...\n"),
            (Phase::Ready, None) => out.push_str("  request not found\n"),
            (Phase::Ready, Some(r)) => {
                let headline = match r.status {
                    RequestStatus::Pending => "Waiting for approval",
                    RequestStatus::Approved => "Approved",
                    RequestStatus::Rejected => "Rejected",
                };
                let _ = writeln!(out, "  {}", headline);
                let _ = writeln!(out, "  name:      {}", r.name);
                let _ = writeln!(out, "  message:   {}", r.message);
                let _ = writeln!(
                    out,
                    "  submitted: {}",
                    r.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        out
    }
}

impl View for StatusPage {
    fn apply(&mut self, notification: &Notification) -> bool {
        match notification {
            Notification::StatusUpdate(r) if r.id == self.id => {
                self.request = Some(r.clone());
                true
            }
            _ => false,
        }
    }

    fn set_connection(&mut self, state: ConnectionState) {
        self.connected = state == ConnectionState::Connected;
    }
}
