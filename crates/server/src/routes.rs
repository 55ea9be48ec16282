use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use propbot_slack::dispatch::{DispatchOutcome, EventDispatcher, SignedRequest};
use serde_json::{json, Value};

const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SIGNATURE_HEADER: &str = "x-slack-signature";

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<EventDispatcher>,
}

pub fn router(dispatcher: Arc<EventDispatcher>) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(AppState { dispatcher })
}

async fn slack_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let request = SignedRequest {
        timestamp: header_str(&headers, TIMESTAMP_HEADER),
        signature: header_str(&headers, SIGNATURE_HEADER),
        body: &body,
    };

    match state.dispatcher.dispatch(request, epoch_secs()).await {
        DispatchOutcome::Challenge(challenge) => {
            (StatusCode::OK, Json(json!({ "challenge": challenge })))
        }
        DispatchOutcome::Rejected(_) => {
            (StatusCode::FORBIDDEN, Json(json!({ "error": "invalid signature" })))
        }
        // Everything else is acknowledged so Slack does not re-deliver;
        // diagnostics went to the thread, not the HTTP response.
        DispatchOutcome::Ignored(_) | DispatchOutcome::Replied | DispatchOutcome::Failed(_) => {
            (StatusCode::OK, Json(json!({ "status": "ok" })))
        }
    }
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "propbot",
        "checked_at": Utc::now().to_rfc3339(),
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
