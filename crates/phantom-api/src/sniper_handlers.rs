use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use phantom_common::{BoundConfig, MatchStatus, QueueItem, SniperMode, SniperTask};
use phantom_engine::sniper;

use crate::state::AppState;

const SOURCE: &str = "config_sniper";

/// The config-sniper endpoint family reports failures inline as
/// `{"success": false, "error": ...}` with HTTP 200, matching what the
/// dashboard expects.
fn failure(error: impl std::fmt::Display) -> Response {
    Json(json!({ "success": false, "error": error.to_string() })).into_response()
}

pub async fn get_config_options(State(st): State<AppState>, Path(plan_code): Path<String>) -> Response {
    let client = match st.engine.ovh_client().await {
        Ok(client) => client,
        Err(e) => return failure(e),
    };
    let zone = st.engine.settings.read().await.zone.clone();

    match sniper::list_config_options(&client, &zone, &plan_code).await {
        Ok(configs) => Json(json!({
            "success": true,
            "planCode": plan_code,
            "total": configs.len(),
            "configs": configs,
        }))
        .into_response(),
        Err(e) if e.is_not_found() => failure(format!("plan {plan_code} has no availability data")),
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("listing config options for {plan_code} failed: {e}"))
                .await;
            failure(e)
        }
    }
}

pub async fn get_tasks(State(st): State<AppState>) -> impl IntoResponse {
    let tasks = st.engine.sniper_tasks.read().await.clone();
    Json(json!({
        "success": true,
        "total": tasks.len(),
        "tasks": tasks,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "api1_planCode")]
    pub api1_plan_code: Option<String>,
    pub bound_config: Option<BoundConfig>,
    #[serde(default)]
    pub mode: SniperMode,
}

pub async fn create_task(State(st): State<AppState>, Json(req): Json<CreateTaskRequest>) -> Response {
    let (Some(plan_code), Some(bound_config)) = (req.api1_plan_code, req.bound_config) else {
        return failure("api1_planCode and bound_config are required");
    };

    let client = match st.engine.ovh_client().await {
        Ok(client) => client,
        Err(e) => return failure(e),
    };
    let zone = st.engine.settings.read().await.zone.clone();

    let catalog = match client.eco_catalog(&zone).await {
        Ok(catalog) => catalog,
        Err(e) => {
            st.engine.logs.error(SOURCE, format!("catalog fetch failed: {e}")).await;
            return failure(e);
        }
    };

    let fp = sniper::fingerprint(&bound_config);
    let current_matches = sniper::find_matching_plans(&catalog, &fp);
    let match_count = current_matches.len();

    let task = SniperTask::new(plan_code.clone(), bound_config, req.mode, current_matches);
    let message = match (req.mode, task.match_status) {
        (SniperMode::PendingMatch, _) => format!(
            "pending-match task created ({match_count} known plan codes excluded, waiting for new ones)"
        ),
        (SniperMode::Matched, MatchStatus::Matched) => {
            format!("watch task created ({match_count} plan codes monitored)")
        }
        (SniperMode::Matched, _) => "no matches found yet, created as pending-match".to_string(),
    };

    st.engine
        .logs
        .info(SOURCE, format!("task created for {plan_code}: {message}"))
        .await;
    st.engine.sniper_tasks.write().await.push(task.clone());
    st.engine.save_sniper_tasks().await;

    Json(json!({
        "success": true,
        "task": task,
        "message": message,
    }))
    .into_response()
}

pub async fn delete_task(State(st): State<AppState>, Path(task_id): Path<String>) -> Response {
    let removed = {
        let mut tasks = st.engine.sniper_tasks.write().await;
        match tasks.iter().position(|t| t.id == task_id) {
            Some(index) => Some(tasks.remove(index)),
            None => None,
        }
    };

    match removed {
        Some(task) => {
            st.engine.save_sniper_tasks().await;
            st.engine
                .logs
                .info(SOURCE, format!("task deleted for {}", task.api1_plan_code))
                .await;
            Json(json!({ "success": true, "message": "task deleted" })).into_response()
        }
        None => failure("task not found"),
    }
}

pub async fn toggle_task(State(st): State<AppState>, Path(task_id): Path<String>) -> Response {
    let toggled = {
        let mut tasks = st.engine.sniper_tasks.write().await;
        tasks.iter_mut().find(|t| t.id == task_id).map(|task| {
            task.enabled = !task.enabled;
            (task.enabled, task.api1_plan_code.clone())
        })
    };

    match toggled {
        Some((enabled, plan_code)) => {
            st.engine.save_sniper_tasks().await;
            let verb = if enabled { "enabled" } else { "disabled" };
            st.engine.logs.info(SOURCE, format!("task for {plan_code} {verb}")).await;
            Json(json!({
                "success": true,
                "enabled": enabled,
                "message": format!("task {verb}"),
            }))
            .into_response()
        }
        None => failure("task not found"),
    }
}

pub async fn check_task(State(st): State<AppState>, Path(task_id): Path<String>) -> Response {
    match sniper::run_task_check(&st.engine, &task_id).await {
        Ok(message) => {
            let task = {
                let tasks = st.engine.sniper_tasks.read().await;
                tasks.iter().find(|t| t.id == task_id).cloned()
            };
            Json(json!({
                "success": true,
                "message": message,
                "task": task,
            }))
            .into_response()
        }
        Err(e) if e.is_not_found() => failure("task not found"),
        Err(e) => failure(e),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickOrderRequest {
    #[serde(default)]
    pub plan_code: String,
    #[serde(default)]
    pub datacenter: String,
}

/// Enqueues a purchase directly, skipping the availability pre-check; the
/// queue processor performs its own check on the first attempt anyway.
pub async fn quick_order(State(st): State<AppState>, Json(req): Json<QuickOrderRequest>) -> Response {
    if req.plan_code.is_empty() || req.datacenter.is_empty() {
        return failure("planCode and datacenter are required");
    }

    let mut item = QueueItem::new(req.plan_code.clone(), req.datacenter.clone(), Vec::new(), 30);
    item.max_retries = Some(3);
    item.quick_order = Some(true);

    st.engine.queue.write().await.push(item);
    st.engine.save_queue().await;
    st.engine
        .logs
        .info(SOURCE, format!("quick order queued: {} in {}", req.plan_code, req.datacenter))
        .await;

    Json(json!({
        "success": true,
        "message": format!("{} ({}) added to the purchase queue", req.plan_code, req.datacenter),
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{delete, post, put};
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
            .route("/config-sniper/tasks/:id", delete(delete_task))
            .route("/config-sniper/tasks/:id/toggle", put(toggle_task))
            .route("/config-sniper/quick-order", post(quick_order))
            .with_state(st);
        (router, engine)
    }

    fn seeded_task() -> SniperTask {
        SniperTask::new(
            "24rise01".into(),
            BoundConfig {
                memory: "ram-64g-ecc-2400".into(),
                storage: "softraid-2x450nvme".into(),
            },
            SniperMode::Matched,
            vec!["24sk50".into()],
        )
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_toggle_flips_enabled() {
        let (app, engine) = app().await;
        let task = seeded_task();
        let id = task.id.clone();
        engine.sniper_tasks.write().await.push(task);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/config-sniper/tasks/{id}/toggle"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let value = body_json(resp).await;
        assert_eq!(value["success"], true);
        assert_eq!(value["enabled"], false);

        let tasks = engine.sniper_tasks.read().await;
        assert!(!tasks[0].enabled);
    }

    #[tokio::test]
    async fn test_delete_unknown_task_reports_failure() {
        let (app, _engine) = app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/config-sniper/tasks/nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = body_json(resp).await;
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_quick_order_enqueues_running_item() {
        let (app, engine) = app().await;
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config-sniper/quick-order")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "planCode": "24sk50", "datacenter": "gra" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let value = body_json(resp).await;
        assert_eq!(value["success"], true);

        let queue = engine.queue.read().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].plan_code, "24sk50");
        assert_eq!(queue[0].quick_order, Some(true));
    }
}
