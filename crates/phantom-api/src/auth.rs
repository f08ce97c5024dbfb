use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::state::AppState;

/// Maximum tolerated skew of the optional X-Request-Time header.
const MAX_TIMESTAMP_SKEW_MS: i64 = 5 * 60 * 1000;

fn reject(code: &str, message: &str) -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": message,
            "code": code,
        })),
    )
        .into_response()
}

/// Shared-secret gate for the API surface. When no key is configured the
/// middleware passes everything through (local development mode).
pub async fn auth_middleware(
    State(st): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> impl IntoResponse {
    let Some(expected) = st.api_key.as_deref() else {
        return next.run(req).await;
    };

    let provided = req.headers().get("X-API-Key").and_then(|h| h.to_str().ok());
    match provided {
        None => return reject("NO_API_KEY", "Missing API key"),
        Some(key) if key != expected => return reject("INVALID_API_KEY", "Invalid API key"),
        Some(_) => {}
    }

    // Optional replay guard: reject requests stamped too far from now.
    // Malformed timestamps are ignored rather than rejected.
    if let Some(stamp) = req
        .headers()
        .get("X-Request-Time")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
    {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if (now_ms - stamp).abs() > MAX_TIMESTAMP_SKEW_MS {
            return reject("TIMESTAMP_EXPIRED", "Request expired");
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use phantom_engine::SharedState;
    use phantom_store::MemoryStore;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app(api_key: Option<&str>) -> Router {
        let engine = SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await;
        let st = AppState {
            engine,
            api_key: api_key.map(str::to_string),
            data_dir: "data".into(),
        };
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(st.clone(), auth_middleware))
            .with_state(st)
    }

    fn request(key: Option<&str>, stamp: Option<i64>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ping");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        if let Some(stamp) = stamp {
            builder = builder.header("X-Request-Time", stamp.to_string());
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_rejected() {
        let app = app(Some("secret")).await;
        let resp = app.oneshot(request(None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_key_rejected() {
        let app = app(Some("secret")).await;
        let resp = app.oneshot(request(Some("nope"), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_key_passes() {
        let app = app(Some("secret")).await;
        let resp = app.oneshot(request(Some("secret"), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_no_configured_key_passes_everything() {
        let app = app(None).await;
        let resp = app.oneshot(request(None, None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stale_timestamp_rejected() {
        let app = app(Some("secret")).await;
        let old = chrono::Utc::now().timestamp_millis() - MAX_TIMESTAMP_SKEW_MS - 1000;
        let resp = app.oneshot(request(Some("secret"), Some(old))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_fresh_timestamp_passes() {
        let app = app(Some("secret")).await;
        let now = chrono::Utc::now().timestamp_millis();
        let resp = app.oneshot(request(Some("secret"), Some(now))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
