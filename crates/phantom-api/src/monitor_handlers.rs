use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use phantom_engine::monitor::MIN_CHECK_INTERVAL_SECS;

use crate::handlers::status_error;
use crate::state::AppState;

pub async fn get_subscriptions(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.monitor.subscriptions_snapshot().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSubscriptionRequest {
    #[serde(default)]
    pub plan_code: String,
    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default = "default_true")]
    pub notify_available: bool,
    #[serde(default)]
    pub notify_unavailable: bool,
}

fn default_true() -> bool {
    true
}

pub async fn add_subscription(State(st): State<AppState>, Json(req): Json<AddSubscriptionRequest>) -> Response {
    if req.plan_code.is_empty() {
        return status_error(StatusCode::BAD_REQUEST, "planCode is required");
    }

    let created = st
        .engine
        .monitor
        .add_subscription(&req.plan_code, req.datacenters, req.notify_available, req.notify_unavailable)
        .await;
    st.engine.save_monitor().await;

    if created {
        st.engine.logs.info("monitor", format!("subscription added for {}", req.plan_code)).await;
    } else {
        st.engine
            .logs
            .warning("monitor", format!("subscription for {} already existed, updated", req.plan_code))
            .await;
    }

    // A stopped monitor starts itself as soon as there is something to watch.
    if st.engine.monitor.start() {
        st.engine.logs.info("monitor", "monitor auto-started after subscription").await;
    }

    Json(json!({
        "status": "success",
        "message": format!("subscribed to {}", req.plan_code),
    }))
    .into_response()
}

pub async fn remove_subscription(State(st): State<AppState>, Path(plan_code): Path<String>) -> Response {
    if st.engine.monitor.remove_subscription(&plan_code).await {
        st.engine.save_monitor().await;
        st.engine.logs.info("monitor", format!("subscription removed for {plan_code}")).await;
        Json(json!({
            "status": "success",
            "message": format!("unsubscribed from {plan_code}"),
        }))
        .into_response()
    } else {
        status_error(StatusCode::NOT_FOUND, "subscription not found")
    }
}

pub async fn clear_subscriptions(State(st): State<AppState>) -> impl IntoResponse {
    let count = st.engine.monitor.clear_subscriptions().await;
    st.engine.save_monitor().await;
    st.engine.logs.info("monitor", format!("cleared {count} subscriptions")).await;
    Json(json!({
        "status": "success",
        "count": count,
        "message": format!("cleared {count} subscriptions"),
    }))
}

pub async fn subscription_history(State(st): State<AppState>, Path(plan_code): Path<String>) -> Response {
    match st.engine.monitor.history_of(&plan_code).await {
        Some(mut history) => {
            // newest first
            history.reverse();
            Json(json!({
                "status": "success",
                "planCode": plan_code,
                "history": history,
            }))
            .into_response()
        }
        None => status_error(StatusCode::NOT_FOUND, "subscription not found"),
    }
}

pub async fn start_monitor(State(st): State<AppState>) -> impl IntoResponse {
    if st.engine.monitor.start() {
        st.engine.logs.info("monitor", "monitor started by operator").await;
        Json(json!({ "status": "success", "message": "monitor started" }))
    } else {
        Json(json!({ "status": "info", "message": "monitor already running" }))
    }
}

pub async fn stop_monitor(State(st): State<AppState>) -> impl IntoResponse {
    if st.engine.monitor.stop() {
        st.engine.logs.info("monitor", "monitor stopped by operator").await;
        Json(json!({ "status": "success", "message": "monitor stopped" }))
    } else {
        Json(json!({ "status": "info", "message": "monitor not running" }))
    }
}

pub async fn monitor_status(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.monitor.status().await)
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub interval: Option<u64>,
}

pub async fn set_monitor_interval(State(st): State<AppState>, Json(req): Json<IntervalRequest>) -> Response {
    let Some(interval) = req.interval else {
        return status_error(StatusCode::BAD_REQUEST, "interval is required");
    };

    if st.engine.monitor.set_check_interval(interval) {
        st.engine.save_monitor().await;
        st.engine
            .logs
            .info("monitor", format!("check interval set to {interval} seconds"))
            .await;
        Json(json!({
            "status": "success",
            "message": format!("check interval set to {interval} seconds"),
        }))
        .into_response()
    } else {
        status_error(
            StatusCode::BAD_REQUEST,
            &format!("interval must be at least {MIN_CHECK_INTERVAL_SECS} seconds"),
        )
    }
}

pub async fn test_notification(State(st): State<AppState>) -> Response {
    let settings = st.engine.settings.read().await.clone();
    let message = format!(
        "Monitor test notification\nTime: {}\nTelegram delivery is working",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S")
    );

    if st.engine.notifier.send(&settings, &message).await {
        st.engine.logs.info("monitor", "test notification sent").await;
        Json(json!({
            "status": "success",
            "message": "test notification sent, check Telegram",
        }))
        .into_response()
    } else {
        st.engine.logs.warning("monitor", "test notification failed").await;
        status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "delivery failed, check the Telegram configuration and logs",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post, put};
    use axum::Router;
    use phantom_engine::SharedState;
    use phantom_store::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let engine = SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await;
        let st = AppState {
            engine,
            api_key: None,
            data_dir: "data".into(),
        };
        Router::new()
            .route("/monitor/subscriptions", get(get_subscriptions).post(add_subscription))
            .route("/monitor/status", get(monitor_status))
            .route("/monitor/interval", put(set_monitor_interval))
            .route("/monitor/start", post(start_monitor))
            .with_state(st)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_subscription_requires_plan_code() {
        let app = app().await;
        let resp = app
            .oneshot(json_request("POST", "/monitor/subscriptions", json!({ "datacenters": [] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_subscription_auto_starts_monitor() {
        let app = app().await;
        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/monitor/subscriptions",
                json!({ "planCode": "24rise01", "datacenters": ["gra"] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let status = app
            .oneshot(Request::builder().uri("/monitor/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(status.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["running"], true);
        assert_eq!(value["subscriptions_count"], 1);
    }

    #[tokio::test]
    async fn test_interval_floor_is_enforced() {
        let app = app().await;
        let resp = app
            .clone()
            .oneshot(json_request("PUT", "/monitor/interval", json!({ "interval": 30 })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(json_request("PUT", "/monitor/interval", json!({ "interval": 90 })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
