use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// One approval ask. Serialized with camelCase keys and RFC 3339 timestamps,
/// which is the shape both the HTTP API and relay notifications carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: Uuid,
    pub name: String,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// A fresh pending record. `created_at` and `updated_at` are both `at`.
    pub fn pending(name: String, message: String, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            message,
            status: RequestStatus::Pending,
            created_at: at,
            updated_at: at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The only statuses an approver may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Decision::Approved),
            "rejected" => Ok(Decision::Rejected),
            other => Err(format!(
                "invalid status '{}': must be one of approved, rejected",
                other
            )),
        }
    }
}

impl From<Decision> for RequestStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

// ── Request bodies ───────────────────────────────────────────

/// Body of `POST /requests`. Missing fields deserialize as empty strings so
/// they fail validation with a field-level message instead of a parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
}

impl NewRequest {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Body of `PATCH /requests/:id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_record_has_equal_timestamps() {
        let now = Utc::now();
        let r = Request::pending("Alice".into(), "Need access".into(), now);
        assert_eq!(r.status, RequestStatus::Pending);
        assert_eq!(r.created_at, r.updated_at);
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let r = Request::pending("Alice".into(), "Need access".into(), Utc::now());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["status"], "pending");
        assert!(v.get("createdAt").is_some());
        assert!(v.get("updatedAt").is_some());
        assert!(v.get("created_at").is_none());
        // RFC 3339 strings, not numbers
        assert!(v["createdAt"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_decision_parse_is_strict() {
        assert_eq!("approved".parse::<Decision>(), Ok(Decision::Approved));
        assert_eq!("rejected".parse::<Decision>(), Ok(Decision::Rejected));
        assert!("pending".parse::<Decision>().is_err());
        assert!("APPROVED".parse::<Decision>().is_err());
        assert!("".parse::<Decision>().is_err());
    }

    #[test]
    fn test_new_request_validation() {
        assert!(NewRequest::new("Alice", "hi").validate().is_ok());

        let err = NewRequest::new("", "hi").validate().unwrap_err();
        assert!(err.field_errors().contains_key("name"));
        assert!(!err.field_errors().contains_key("message"));

        let missing: NewRequest = serde_json::from_value(json!({})).unwrap();
        let err = missing.validate().unwrap_err();
        assert_eq!(err.field_errors().len(), 2);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Approved.is_terminal());
        assert!(RequestStatus::Rejected.is_terminal());
    }
}
