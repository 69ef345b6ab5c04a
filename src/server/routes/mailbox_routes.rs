// Mailbox routes: producer callback, polling, reset, per-job access

use super::ApiError;
use crate::mailbox::{job_id_from_payload, JobId, MailboxError};
use crate::server::ServerAppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const NO_DATA: &str = "No data yet";

#[derive(Debug, Deserialize)]
pub struct LatestDataQuery {
    #[serde(rename = "jobId", alias = "job_id")]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub success: String,
}

/// POST /callback: a producer delivers a result
pub async fn callback_handler(
    State(state): State<ServerAppState>,
    Json(payload): Json<Value>,
) -> Result<Json<MessageBody>, ApiError> {
    let job_id = job_id_from_payload(&payload);
    log::debug!("Callback received (job: {:?})", job_id);

    match state.mailbox.submit_result(job_id, payload) {
        Ok(_) => Ok(Json(MessageBody {
            message: "Data received successfully".to_string(),
        })),
        Err(e @ MailboxError::UnreadResultPending) => Err(ApiError::conflict(e.to_string())),
    }
}

/// GET /latest-data[?jobId=]: the payload waiting for a poller
pub async fn latest_data_handler(
    State(state): State<ServerAppState>,
    Query(query): Query<LatestDataQuery>,
) -> Result<Json<Value>, ApiError> {
    let entry = match query.job_id.filter(|id| !id.is_empty()) {
        Some(id) => state.mailbox.peek_job(&JobId::from(id)),
        None => state.mailbox.peek(),
    };

    entry
        .map(|entry| Json(entry.payload))
        .ok_or_else(|| ApiError::not_found(NO_DATA))
}

/// GET|POST /reset
pub async fn reset_handler(State(state): State<ServerAppState>) -> Json<SuccessBody> {
    state.mailbox.reset();
    Json(SuccessBody {
        success: "Data reset".to_string(),
    })
}

/// DELETE /latest-data: empty the latest slot, keep job-keyed results
pub async fn clear_latest_handler(State(state): State<ServerAppState>) -> Json<SuccessBody> {
    state.mailbox.clear_latest();
    Json(SuccessBody {
        success: "Latest data cleared".to_string(),
    })
}

/// GET /jobs/:job_id
pub async fn get_job_handler(
    State(state): State<ServerAppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .mailbox
        .peek_job(&JobId::from(job_id))
        .map(|entry| Json(entry.payload))
        .ok_or_else(|| ApiError::not_found(NO_DATA))
}

/// DELETE /jobs/:job_id: consume the result exactly once
pub async fn take_job_handler(
    State(state): State<ServerAppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .mailbox
        .take_job(&JobId::from(job_id))
        .map(|entry| Json(entry.payload))
        .ok_or_else(|| ApiError::not_found(NO_DATA))
}

#[cfg(test)]
mod tests {
    use crate::config::MailboxConfig;
    use crate::mailbox::UnreadPolicy;
    use crate::server::{build_router, ServerAppState};
    use crate::shutdown::ShutdownState;
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(policy: UnreadPolicy) -> (Router, ServerAppState) {
        let config = MailboxConfig {
            capacity: 4,
            unread_policy: policy,
        };
        let state = ServerAppState::new(&config, ShutdownState::new());
        (build_router(state.clone(), &[]), state)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_latest_data_empty_is_404() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);
        let (status, body) = send(&app, Method::GET, "/latest-data", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "No data yet"}));
    }

    #[tokio::test]
    async fn test_callback_then_latest_data() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);
        let payload = json!({"topic": "rust", "keywords": ["borrow", "async"]});

        let (status, body) = send(&app, Method::POST, "/callback", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Data received successfully");

        let (status, body) = send(&app, Method::GET, "/latest-data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, payload);
    }

    #[tokio::test]
    async fn test_latest_data_by_job_id() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);
        send(&app, Method::POST, "/callback", Some(json!({"jobId": "a", "keywords": ["x"]}))).await;
        send(&app, Method::POST, "/callback", Some(json!({"jobId": "b", "keywords": ["y"]}))).await;

        let (status, body) = send(&app, Method::GET, "/latest-data?jobId=a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["keywords"], json!(["x"]));

        let (status, _) = send(&app, Method::GET, "/latest-data?jobId=c", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_get_and_post() {
        let (app, state) = app_with(UnreadPolicy::Overwrite);
        send(&app, Method::POST, "/callback", Some(json!({"keywords": []}))).await;

        let (status, body) = send(&app, Method::GET, "/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": "Data reset"}));
        assert!(state.mailbox.is_empty());

        // Idempotent
        let (status, _) = send(&app, Method::POST, "/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/latest-data", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_latest_keeps_job_results() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);
        send(&app, Method::POST, "/callback", Some(json!({"jobId": "a", "keywords": ["x"]}))).await;

        let (status, body) = send(&app, Method::DELETE, "/latest-data", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": "Latest data cleared"}));

        let (status, _) = send(&app, Method::GET, "/latest-data", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, body) = send(&app, Method::GET, "/latest-data?jobId=a", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["keywords"], json!(["x"]));
    }

    #[tokio::test]
    async fn test_reject_policy_returns_conflict() {
        let (app, _) = app_with(UnreadPolicy::Reject);
        let (status, _) = send(&app, Method::POST, "/callback", Some(json!({"keywords": ["1"]}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send(&app, Method::POST, "/callback", Some(json!({"keywords": ["2"]}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("unread"));

        // The first result is still the one served
        let (_, body) = send(&app, Method::GET, "/latest-data", None).await;
        assert_eq!(body["keywords"], json!(["1"]));
    }

    #[tokio::test]
    async fn test_take_job_is_exactly_once() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);
        send(&app, Method::POST, "/callback", Some(json!({"jobId": "j1", "keywords": ["k"]}))).await;

        let (status, body) = send(&app, Method::GET, "/jobs/j1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobId"], "j1");

        let (status, _) = send(&app, Method::DELETE, "/jobs/j1", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, "/jobs/j1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::GET, "/jobs/j1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_and_version() {
        let (app, _) = app_with(UnreadPolicy::Overwrite);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");

        let (status, body) = send(&app, Method::GET, "/api/version", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
