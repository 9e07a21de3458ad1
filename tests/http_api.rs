//! HTTP surface tests: the router is driven in-process with `oneshot`.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use approvals::api;
use approvals::notification::{local::LocalRelay, webpubsub::WebPubSubRelay};
use approvals::service::TransitionPolicy;
use common::{state_with, RecordingRelay};

fn app(policy: TransitionPolicy) -> Router {
    api::app(state_with(RecordingRelay::new(), policy))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create(app: &Router, name: &str, message: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/requests",
        Some(json!({ "name": name, "message": message })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

mod request_routes {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_201_with_pending_record() {
        let app = app(TransitionPolicy::Overwrite);
        let body = create(&app, "Alice", "Need access to prod").await;

        assert_eq!(body["status"], "pending");
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["message"], "Need access to prod");
        assert_eq!(body["createdAt"], body["updatedAt"]);
        assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_create_missing_fields_is_400_with_details() {
        let app = app(TransitionPolicy::Overwrite);
        let (status, body) = send(&app, "POST", "/requests", Some(json!({ "name": "" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
        let fields: Vec<&str> = body["error"]["details"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["message", "name"]);

        let (_, list) = send(&app, "GET", "/requests", None).await;
        assert_eq!(list, json!([]));
    }

    #[tokio::test]
    async fn test_create_malformed_json_is_400() {
        let app = app(TransitionPolicy::Overwrite);
        let req = Request::builder()
            .method("POST")
            .uri("/requests")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let app = app(TransitionPolicy::Overwrite);
        create(&app, "first", "m").await;
        create(&app, "second", "m").await;

        let (status, list) = send(&app, "GET", "/requests", None).await;
        assert_eq!(status, StatusCode::OK);
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        let created_at = |v: &Value| {
            chrono::DateTime::parse_from_rfc3339(v["createdAt"].as_str().unwrap()).unwrap()
        };
        assert!(created_at(&list[0]) >= created_at(&list[1]));
    }

    #[tokio::test]
    async fn test_get_unknown_and_malformed_ids_are_404() {
        let app = app(TransitionPolicy::Overwrite);

        let uri = format!("/requests/{}", uuid::Uuid::new_v4());
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "request_not_found");

        let (status, _) = send(&app, "GET", "/requests/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_patch_approves() {
        let app = app(TransitionPolicy::Overwrite);
        let created = create(&app, "Alice", "m").await;
        let uri = format!("/requests/{}", created["id"].as_str().unwrap());

        let (status, body) = send(&app, "PATCH", &uri, Some(json!({ "status": "approved" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");
        assert_eq!(body["createdAt"], created["createdAt"]);
        assert_ne!(body["updatedAt"], created["updatedAt"]);

        let (_, fetched) = send(&app, "GET", &uri, None).await;
        assert_eq!(fetched, body);
    }

    #[tokio::test]
    async fn test_patch_invalid_status_is_400() {
        let app = app(TransitionPolicy::Overwrite);
        let created = create(&app, "Alice", "m").await;
        let uri = format!("/requests/{}", created["id"].as_str().unwrap());

        for bad in [json!({ "status": "pending" }), json!({ "status": "maybe" }), json!({})] {
            let (status, body) = send(&app, "PATCH", &uri, Some(bad)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"]["details"][0]["field"], "status");
        }

        let (_, fetched) = send(&app, "GET", &uri, None).await;
        assert_eq!(fetched["status"], "pending");
    }

    #[tokio::test]
    async fn test_patch_unknown_id_is_404() {
        let app = app(TransitionPolicy::Overwrite);
        let uri = format!("/requests/{}", uuid::Uuid::new_v4());
        let (status, _) = send(&app, "PATCH", &uri, Some(json!({ "status": "rejected" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pending_only_second_decision_is_409() {
        let app = app(TransitionPolicy::PendingOnly);
        let created = create(&app, "Alice", "m").await;
        let uri = format!("/requests/{}", created["id"].as_str().unwrap());

        let (status, _) = send(&app, "PATCH", &uri, Some(json!({ "status": "approved" }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, "PATCH", &uri, Some(json!({ "status": "rejected" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_decided");
    }

    #[tokio::test]
    async fn test_routes_are_also_served_under_api_prefix() {
        let app = app(TransitionPolicy::Overwrite);
        let (status, body) = send(
            &app,
            "POST",
            "/api/requests",
            Some(json!({ "name": "Alice", "message": "m" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, list) = send(&app, "GET", "/requests", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list[0]["id"], body["id"]);
    }
}

mod negotiate_routes {
    use super::*;

    const CONN: &str = "Endpoint=https://demo.webpubsub.azure.com;AccessKey=dGVzdC1rZXk=;Version=1.0;";

    fn managed_app() -> Router {
        let relay = WebPubSubRelay::new(CONN, "approval", chrono::Duration::minutes(60)).unwrap();
        api::app(state_with(Arc::new(relay), TransitionPolicy::Overwrite))
    }

    #[tokio::test]
    async fn test_negotiate_returns_client_url() {
        let app = managed_app();
        let (status, body) = send(
            &app,
            "POST",
            "/pubsub/negotiate",
            Some(json!({ "userId": "admin" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], "admin");
        assert!(body["url"]
            .as_str()
            .unwrap()
            .starts_with("wss://demo.webpubsub.azure.com/client/hubs/approval?access_token="));
    }

    #[tokio::test]
    async fn test_negotiate_without_body_generates_user_id() {
        let app = managed_app();
        let (status, body) = send(&app, "POST", "/api/pubsub/negotiate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["userId"].as_str().unwrap().starts_with("user-"));

        let (_, body) = send(&app, "POST", "/pubsub/negotiate", Some(json!({ "userId": "" }))).await;
        assert!(body["userId"].as_str().unwrap().starts_with("user-"));
    }

    #[tokio::test]
    async fn test_negotiate_rejects_malformed_body() {
        let app = managed_app();
        let req = Request::builder()
            .method("POST")
            .uri("/pubsub/negotiate")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/pubsub/negotiate", Some(json!({ "userId": 42 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_input");
        assert_eq!(body["error"]["details"][0]["field"], "body");
    }

    #[tokio::test]
    async fn test_negotiate_without_managed_relay_is_500() {
        let app = api::app(state_with(
            Arc::new(LocalRelay::new()),
            TransitionPolicy::Overwrite,
        ));
        let (status, body) = send(&app, "POST", "/pubsub/negotiate", Some(json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["type"], "internal_error");
    }
}

mod ops_routes {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoints() {
        let app = app(TransitionPolicy::Overwrite);
        for uri in ["/healthz", "/readyz"] {
            let resp = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_metrics_exposes_counters() {
        let app = app(TransitionPolicy::Overwrite);
        create(&app, "Alice", "m").await;

        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("approvals_requests_created_total"));
        assert!(text.contains("approvals_relay_publishes_total"));
    }

    #[tokio::test]
    async fn test_responses_carry_request_id_and_security_headers() {
        let app = app(TransitionPolicy::Overwrite);
        let resp = app
            .oneshot(Request::builder().uri("/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.headers().contains_key("x-request-id"));
        assert_eq!(resp.headers()["x-content-type-options"], "nosniff");
        assert_eq!(resp.headers()["cache-control"], "no-store");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = app(TransitionPolicy::Overwrite);
        let (status, _) = send(&app, "GET", "/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
