use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use phantom_common::{
    queue_item::retry_interval_in_range, QueueItem, QueueStatus, Settings, MAX_RETRY_INTERVAL_SECS,
    MIN_RETRY_INTERVAL_SECS,
};
use phantom_engine::state::{collections, PLAN_CACHE_DURATION_SECS};
use phantom_engine::{catalog, now_epoch};
use phantom_store::Store;

use crate::state::AppState;

/// The queue/monitor endpoint family reports errors as
/// `{"status": "error", "message": ...}` with a matching HTTP status.
pub fn status_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

pub fn status_success() -> Response {
    Json(json!({ "status": "success" })).into_response()
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

pub async fn get_settings(State(st): State<AppState>) -> impl IntoResponse {
    let settings = st.engine.settings.read().await.clone();
    Json(settings)
}

pub async fn save_settings(State(st): State<AppState>, Json(mut incoming): Json<Settings>) -> impl IntoResponse {
    incoming.derive_iam();

    let previous = {
        let mut settings = st.engine.settings.write().await;
        let previous = settings.clone();
        *settings = incoming.clone();
        previous
    };
    st.engine.save_settings().await;
    st.engine.logs.info("system", "API settings updated").await;

    // Confirm a changed Telegram target right away with a test message.
    let telegram_changed =
        incoming.tg_token != previous.tg_token || incoming.tg_chat_id != previous.tg_chat_id;
    if incoming.has_telegram() && telegram_changed {
        let sent = st
            .engine
            .notifier
            .send(&incoming, "Telegram notifications configured successfully")
            .await;
        if sent {
            st.engine.logs.info("system", "telegram test message sent").await;
        } else {
            st.engine
                .logs
                .warning("system", "telegram test message failed, check token and chat id")
                .await;
        }
    }

    status_success()
}

pub async fn verify_auth(State(st): State<AppState>) -> impl IntoResponse {
    let valid = match st.engine.ovh_client().await {
        Ok(client) => client.me().await.is_ok(),
        Err(_) => false,
    };
    if !valid {
        st.engine.logs.error("system", "OVH credential verification failed").await;
    }
    Json(json!({ "valid": valid }))
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

pub async fn get_logs(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.logs.flush().await;
    Json(st.engine.logs.snapshot().await)
}

pub async fn flush_logs(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.logs.flush().await;
    Json(json!({ "status": "success", "message": "logs flushed" }))
}

pub async fn clear_logs(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.logs.clear().await;
    st.engine.logs.info("system", "logs cleared").await;
    status_success()
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

pub async fn get_queue(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.queue.read().await.clone())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddQueueRequest {
    #[serde(default)]
    pub plan_code: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub retry_interval: Option<u64>,
}

pub async fn add_queue_item(State(st): State<AppState>, Json(req): Json<AddQueueRequest>) -> Response {
    if req.plan_code.is_empty() || req.datacenter.is_empty() {
        return status_error(StatusCode::BAD_REQUEST, "planCode and datacenter are required");
    }

    let retry_interval = req.retry_interval.unwrap_or(MIN_RETRY_INTERVAL_SECS);
    if !retry_interval_in_range(retry_interval) {
        return status_error(
            StatusCode::BAD_REQUEST,
            &format!(
                "retryInterval must be between {MIN_RETRY_INTERVAL_SECS} and {MAX_RETRY_INTERVAL_SECS} seconds"
            ),
        );
    }

    let item = QueueItem::new(req.plan_code, req.datacenter, req.options, retry_interval);
    let id = item.id.clone();
    st.engine
        .logs
        .info(
            "system",
            format!("task {id} added for {} in {} and started", item.plan_code, item.datacenter),
        )
        .await;
    st.engine.queue.write().await.push(item);
    st.engine.save_queue().await;

    Json(json!({ "status": "success", "id": id })).into_response()
}

pub async fn remove_queue_item(State(st): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    // Mark first so the processor drops any in-flight snapshot of the item.
    st.engine.deleted_queue_ids.insert(id.clone());

    let removed = {
        let mut queue = st.engine.queue.write().await;
        let before = queue.len();
        queue.retain(|item| item.id != id);
        queue.len() < before
    };
    if removed {
        st.engine.save_queue().await;
        st.engine.logs.info("system", format!("task {id} removed from queue")).await;
    }

    status_success()
}

pub async fn clear_queue(State(st): State<AppState>) -> impl IntoResponse {
    let count = {
        let mut queue = st.engine.queue.write().await;
        for item in queue.iter() {
            st.engine.deleted_queue_ids.insert(item.id.clone());
        }
        let count = queue.len();
        queue.clear();
        count
    };
    st.engine.save_queue().await;
    st.engine.logs.info("system", format!("queue cleared ({count} items removed)")).await;

    Json(json!({ "status": "success", "count": count }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: QueueStatus,
}

pub async fn update_queue_status(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Response {
    let updated = {
        let mut queue = st.engine.queue.write().await;
        match queue.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = req.status;
                item.updated_at = chrono::Utc::now();
                Some(item.plan_code.clone())
            }
            None => None,
        }
    };

    match updated {
        Some(plan_code) => {
            st.engine.save_queue().await;
            let status_name = serde_json::to_string(&req.status).unwrap_or_default();
            st.engine
                .logs
                .info(
                    "system",
                    format!("{plan_code} status set to {}", status_name.trim_matches('"')),
                )
                .await;
            status_success()
        }
        None => status_error(StatusCode::NOT_FOUND, "queue item not found"),
    }
}

// ---------------------------------------------------------------------------
// Purchase history / stats
// ---------------------------------------------------------------------------

pub async fn get_history(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.history.read().await.clone())
}

pub async fn clear_history(State(st): State<AppState>) -> impl IntoResponse {
    st.engine.history.write().await.clear();
    st.engine.save_history().await;
    st.engine.logs.info("system", "purchase history cleared").await;
    status_success()
}

pub async fn get_stats(State(st): State<AppState>) -> impl IntoResponse {
    Json(st.engine.stats().await)
}

// ---------------------------------------------------------------------------
// Servers & availability
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServersQuery {
    #[serde(default)]
    pub show_api_servers: Option<String>,
    #[serde(default)]
    pub force_refresh: Option<String>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

pub async fn get_servers(State(st): State<AppState>, Query(query): Query<ServersQuery>) -> impl IntoResponse {
    let show_api_servers = flag(&query.show_api_servers);
    let force_refresh = flag(&query.force_refresh);

    let now = now_epoch();
    let cache_valid = st.engine.plan_cache.read().await.is_valid(now);

    if cache_valid && !force_refresh {
        let age_minutes = st.engine.plan_cache.read().await.age(now).unwrap_or(0) / 60;
        st.engine
            .logs
            .info("system", format!("serving cached server list ({age_minutes} minutes old)"))
            .await;
    } else if show_api_servers {
        match st.engine.ovh_client().await {
            Ok(client) => {
                let settings = st.engine.settings.read().await.clone();
                st.engine.logs.info("system", "reloading server list from the OVH catalog").await;
                match catalog::load_server_plans(&client, &settings.zone, &st.engine.logs).await {
                    Ok(plans) => {
                        let count = plans.len();
                        let fresh = st.engine.install_plans(plans).await;
                        st.engine
                            .logs
                            .info("system", format!("server list refreshed: {count} plans cached"))
                            .await;
                        for plan in fresh {
                            let message = format!(
                                "New server listed\nPlan: {}\nName: {}\nCPU: {}\nMemory: {}\nStorage: {}",
                                plan.plan_code, plan.name, plan.cpu, plan.memory, plan.storage
                            );
                            st.engine.notifier.send(&settings, &message).await;
                            st.engine
                                .logs
                                .info("monitor", format!("new server alert sent for {}", plan.plan_code))
                                .await;
                        }
                    }
                    Err(e) => {
                        st.engine
                            .logs
                            .warning("system", format!("server list refresh failed: {e}"))
                            .await;
                    }
                }
            }
            Err(_) => {
                st.engine
                    .logs
                    .info("system", "cache expired but no credentials configured, serving stale data")
                    .await;
            }
        }
    }

    let cache = st.engine.plan_cache.read().await;
    Json(json!({
        "servers": &cache.plans,
        "cacheInfo": {
            "cached": cache.is_valid(now),
            "timestamp": cache.fetched_at,
            "cacheAge": cache.age(now),
            "cacheDuration": PLAN_CACHE_DURATION_SECS,
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub options: Option<String>,
}

pub async fn get_availability(
    State(st): State<AppState>,
    Path(plan_code): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Response {
    let options: Vec<String> = query
        .options
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let client = match st.engine.ovh_client().await {
        Ok(client) => client,
        Err(_) => return (StatusCode::NOT_FOUND, Json(json!({}))).into_response(),
    };

    match client.datacenter_availabilities(&plan_code, &options).await {
        Ok(entries) => {
            let mut map = serde_json::Map::new();
            for entry in entries {
                for dc in entry.datacenters {
                    let status = if dc.availability.is_empty() {
                        "unknown".to_string()
                    } else {
                        dc.availability
                    };
                    map.insert(dc.datacenter, json!(status));
                }
            }
            st.engine
                .logs
                .info("system", format!("availability checked for {plan_code}: {} datacenters", map.len()))
                .await;
            Json(serde_json::Value::Object(map)).into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error("system", format!("availability check failed for {plan_code}: {e}"))
                .await;
            (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Cache management
// ---------------------------------------------------------------------------

pub async fn cache_info(State(st): State<AppState>) -> impl IntoResponse {
    let now = now_epoch();
    let cache = st.engine.plan_cache.read().await;
    let store = &st.engine.store;

    Json(json!({
        "backend": {
            "hasCachedData": !cache.plans.is_empty(),
            "timestamp": cache.fetched_at,
            "cacheAge": cache.age(now),
            "cacheDuration": PLAN_CACHE_DURATION_SECS,
            "serverCount": cache.plans.len(),
            "cacheValid": cache.is_valid(now),
        },
        "storage": {
            "dataDir": st.data_dir,
            "files": {
                "config": store.exists(collections::CONFIG).await,
                "servers": store.exists(collections::SERVERS).await,
                "logs": store.exists(collections::LOGS).await,
                "queue": store.exists(collections::QUEUE).await,
                "history": store.exists(collections::HISTORY).await,
            },
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct ClearCacheRequest {
    #[serde(default = "default_clear_type")]
    pub r#type: String,
}

fn default_clear_type() -> String {
    "all".to_string()
}

pub async fn clear_cache(State(st): State<AppState>, body: Option<Json<ClearCacheRequest>>) -> Response {
    let clear_type = body.map(|Json(b)| b.r#type).unwrap_or_else(default_clear_type);
    let mut cleared: Vec<&str> = Vec::new();

    if clear_type == "all" || clear_type == "memory" {
        st.engine.plan_cache.write().await.clear();
        cleared.push("memory");
        st.engine.logs.info("system", "in-memory server cache cleared").await;
    }

    if clear_type == "all" || clear_type == "files" {
        match st.engine.store.remove(collections::SERVERS).await {
            Ok(()) => {
                cleared.push("servers_file");
                st.engine.logs.info("system", "persisted server list removed").await;
            }
            Err(e) => {
                st.engine.logs.error("system", format!("failed to remove server list: {e}")).await;
                return status_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
        }
    }

    Json(json!({
        "status": "success",
        "cleared": cleared,
        "message": format!("cleared: {}", cleared.join(", ")),
    }))
    .into_response()
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

    async fn app() -> (Router, Arc<SharedState>) {
        let engine = SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await;
        let st = AppState {
            engine: engine.clone(),
            api_key: None,
            data_dir: "data".into(),
        };
        let router = Router::new()
            .route("/queue", post(add_queue_item))
            .route("/queue/:id/status", put(update_queue_status))
            .route("/cache/info", get(cache_info))
            .with_state(st);
        (router, engine)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_add_queue_item_rejects_out_of_range_interval() {
        let (app, engine) = app().await;
        for interval in [29, 3601] {
            let resp = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/queue",
                    json!({ "planCode": "24rise01", "datacenter": "gra", "retryInterval": interval }),
                ))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
        assert!(engine.queue.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_add_queue_item_starts_running() {
        let (app, engine) = app().await;
        let resp = app
            .oneshot(json_request(
                "POST",
                "/queue",
                json!({ "planCode": "24rise01", "datacenter": "gra", "retryInterval": 60 }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let value = body_json(resp).await;
        assert_eq!(value["status"], "success");

        let queue = engine.queue.read().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, QueueStatus::Running);
        assert_eq!(queue[0].retry_interval, 60);
        assert_eq!(queue[0].id, value["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn test_status_toggle_round_trip() {
        let (app, engine) = app().await;
        let item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        let id = item.id.clone();
        engine.queue.write().await.push(item);

        let resp = app
            .clone()
            .oneshot(json_request("PUT", &format!("/queue/{id}/status"), json!({ "status": "paused" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(engine.queue.read().await[0].status, QueueStatus::Paused);

        let resp = app
            .clone()
            .oneshot(json_request("PUT", &format!("/queue/{id}/status"), json!({ "status": "running" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(engine.queue.read().await[0].status, QueueStatus::Running);

        let resp = app
            .oneshot(json_request("PUT", "/queue/unknown/status", json!({ "status": "paused" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cache_info_empty_state() {
        let (app, _engine) = app().await;
        let resp = app
            .oneshot(Request::builder().uri("/cache/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let value = body_json(resp).await;
        assert_eq!(value["backend"]["hasCachedData"], false);
        assert_eq!(value["backend"]["serverCount"], 0);
        assert_eq!(value["backend"]["cacheValid"], false);
        assert!(value["backend"]["timestamp"].is_null());
    }
}
