use anyhow::Context;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::request::{Decision, Request};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub url: String,
    pub user_id: String,
}

/// Thin HTTP client for a running approvals server.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn create(&self, name: &str, message: &str) -> anyhow::Result<Request> {
        let resp = self
            .client
            .post(self.url("/requests"))
            .json(&json!({ "name": name, "message": message }))
            .send()
            .await
            .context("failed to reach server")?;
        decode(resp).await
    }

    pub async fn list(&self) -> anyhow::Result<Vec<Request>> {
        let resp = self
            .client
            .get(self.url("/requests"))
            .send()
            .await
            .context("failed to reach server")?;
        decode(resp).await
    }

    /// `None` when the server answers 404.
    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Request>> {
        let resp = self
            .client
            .get(self.url(&format!("/requests/{}", id)))
            .send()
            .await
            .context("failed to reach server")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(resp).await.map(Some)
    }

    pub async fn decide(&self, id: Uuid, decision: Decision) -> anyhow::Result<Request> {
        let resp = self
            .client
            .patch(self.url(&format!("/requests/{}", id)))
            .json(&json!({ "status": decision }))
            .send()
            .await
            .context("failed to reach server")?;
        decode(resp).await
    }

    pub async fn negotiate(&self, user_id: &str) -> anyhow::Result<NegotiateResponse> {
        let resp = self
            .client
            .post(self.url("/pubsub/negotiate"))
            .json(&json!({ "userId": user_id }))
            .send()
            .await
            .context("failed to reach server")?;
        decode(resp).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("server returned error: status={}, body={}", status, body);
    }
    resp.json::<T>().await.context("unexpected response body")
}
