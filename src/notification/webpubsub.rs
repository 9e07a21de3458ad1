//! Client for a managed Web PubSub relay.
//!
//! Two things are needed from the service:
//! - group broadcast over its REST data plane, authenticated with a
//!   short-lived HS256 token signed by the hub access key
//! - client access URLs: a `wss://` endpoint carrying a token scoped to one
//!   user id and a set of roles

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ClientAccess, Relay};
use crate::models::notification::Notification;

const API_VERSION: &str = "2024-01-01";

/// Lifetime of the tokens used for our own REST calls.
const SERVICE_TOKEN_TTL_SECS: i64 = 3600;

// ── Connection string ────────────────────────────────────────

/// Parsed `Endpoint=https://host;AccessKey=...;Version=1.0;[Port=8080;]`.
#[derive(Clone)]
pub struct ConnectionString {
    pub endpoint: Url,
    access_key: String,
}

impl FromStr for ConnectionString {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pairs: HashMap<String, String> = s
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| {
                let (k, v) = p.split_once('=')?;
                Some((k.trim().to_ascii_lowercase(), v.trim().to_string()))
            })
            .collect();

        let endpoint = pairs
            .get("endpoint")
            .context("connection string is missing Endpoint")?;
        let mut endpoint = Url::parse(endpoint).context("connection string Endpoint is not a URL")?;
        if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
            anyhow::bail!("connection string Endpoint must be http or https");
        }
        if let Some(port) = pairs.get("port") {
            let port: u16 = port.parse().context("connection string Port is not a number")?;
            endpoint
                .set_port(Some(port))
                .map_err(|_| anyhow::anyhow!("cannot set port on endpoint"))?;
        }

        let access_key = pairs
            .get("accesskey")
            .filter(|k| !k.is_empty())
            .context("connection string is missing AccessKey")?
            .clone();

        Ok(Self {
            endpoint,
            access_key,
        })
    }
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the key
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

// ── Token claims ─────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ServiceClaims {
    aud: String,
    iat: i64,
    exp: i64,
}

/// Claims of a client access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientClaims {
    pub aud: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

// ── Relay ────────────────────────────────────────────────────

/// [`Relay`] backed by the managed service.
#[derive(Clone)]
pub struct WebPubSubRelay {
    client: reqwest::Client,
    connection: ConnectionString,
    hub: String,
    client_token_ttl: chrono::Duration,
}

impl WebPubSubRelay {
    pub fn new(
        connection_string: &str,
        hub: &str,
        client_token_ttl: chrono::Duration,
    ) -> anyhow::Result<Self> {
        let connection: ConnectionString = connection_string.parse()?;
        if hub.is_empty() {
            anyhow::bail!("relay hub name must not be empty");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("approvals-relay/1.0")
            .build()
            .context("failed to build relay HTTP client")?;
        Ok(Self {
            client,
            connection,
            hub: hub.to_string(),
            client_token_ttl,
        })
    }

    pub fn hub(&self) -> &str {
        &self.hub
    }

    /// Endpoint without the trailing slash `Url` always keeps.
    fn base(&self) -> String {
        self.connection.endpoint.as_str().trim_end_matches('/').to_string()
    }

    fn hub_path(&self) -> String {
        urlencoding::encode(&self.hub).into_owned()
    }

    fn sign<T: Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.connection.access_key.as_bytes()),
        )
        .context("failed to sign relay token")
    }

    /// URL of the REST call that broadcasts to `group`, without query.
    pub fn group_send_url(&self, group: &str) -> String {
        format!(
            "{}/api/hubs/{}/groups/{}/:send",
            self.base(),
            self.hub_path(),
            urlencoding::encode(group)
        )
    }

    /// Audience clients must present; always the http(s) form of the endpoint.
    pub fn client_audience(&self) -> String {
        format!("{}/client/hubs/{}", self.base(), self.hub_path())
    }

    fn client_base_url(&self) -> String {
        let audience = self.client_audience();
        if let Some(rest) = audience.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = audience.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            audience
        }
    }

    fn service_token(&self, audience: &str) -> anyhow::Result<String> {
        let now = Utc::now().timestamp();
        self.sign(&ServiceClaims {
            aud: audience.to_string(),
            iat: now,
            exp: now + SERVICE_TOKEN_TTL_SECS,
        })
    }
}

#[async_trait]
impl Relay for WebPubSubRelay {
    async fn send_to_group(&self, group: &str, notification: &Notification) -> anyhow::Result<()> {
        let url = self.group_send_url(group);
        let token = self.service_token(&url)?;

        let resp = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(notification)
            .send()
            .await
            .context("failed to reach relay")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("relay returned error: status={}, body={}", status, body);
        }

        tracing::debug!(
            group = %group,
            kind = notification.kind(),
            request_id = %notification.request().id,
            "relay broadcast accepted"
        );
        Ok(())
    }

    async fn client_access(&self, user_id: &str, roles: &[&str]) -> anyhow::Result<ClientAccess> {
        let now = Utc::now();
        let expires_at = now + self.client_token_ttl;
        let token = self.sign(&ClientClaims {
            aud: self.client_audience(),
            sub: user_id.to_string(),
            role: roles.iter().map(|r| r.to_string()).collect(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        })?;

        Ok(ClientAccess {
            url: format!(
                "{}?access_token={}",
                self.client_base_url(),
                urlencoding::encode(&token)
            ),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const CONN: &str = "Endpoint=https://demo.webpubsub.azure.com;AccessKey=c2VjcmV0LWtleQ==;Version=1.0;";

    fn relay() -> WebPubSubRelay {
        WebPubSubRelay::new(CONN, "approval", chrono::Duration::minutes(60)).unwrap()
    }

    #[test]
    fn test_parse_connection_string() {
        let cs: ConnectionString = CONN.parse().unwrap();
        assert_eq!(cs.endpoint.host_str(), Some("demo.webpubsub.azure.com"));
        // base64 padding '=' must survive the key=value split
        assert_eq!(cs.access_key, "c2VjcmV0LWtleQ==");
    }

    #[test]
    fn test_parse_connection_string_with_port() {
        let cs: ConnectionString = "endpoint=http://localhost;accesskey=abc;port=8080"
            .parse()
            .unwrap();
        assert_eq!(cs.endpoint.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_parse_connection_string_rejects_missing_parts() {
        assert!("AccessKey=abc".parse::<ConnectionString>().is_err());
        assert!("Endpoint=https://x.example".parse::<ConnectionString>().is_err());
        assert!("Endpoint=ftp://x.example;AccessKey=abc"
            .parse::<ConnectionString>()
            .is_err());
    }

    #[test]
    fn test_debug_hides_access_key() {
        let cs: ConnectionString = CONN.parse().unwrap();
        assert!(!format!("{:?}", cs).contains("c2VjcmV0"));
    }

    #[test]
    fn test_group_send_url() {
        assert_eq!(
            relay().group_send_url("admins"),
            "https://demo.webpubsub.azure.com/api/hubs/approval/groups/admins/:send"
        );
    }

    #[tokio::test]
    async fn test_client_access_token_is_scoped() {
        let relay = relay();
        let access = relay
            .client_access("user-42", &super::super::CLIENT_ROLES)
            .await
            .unwrap();

        let (base, token) = access.url.split_once("?access_token=").unwrap();
        assert_eq!(base, "wss://demo.webpubsub.azure.com/client/hubs/approval");

        let token = urlencoding::decode(token).unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["https://demo.webpubsub.azure.com/client/hubs/approval"]);
        let claims = decode::<ClientClaims>(
            &token,
            &DecodingKey::from_secret(b"c2VjcmV0LWtleQ=="),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(claims.sub, "user-42");
        assert_eq!(
            claims.role,
            vec!["webpubsub.sendToGroup", "webpubsub.joinLeaveGroup"]
        );
        assert_eq!(claims.exp - claims.iat, 3600);
    }
}
