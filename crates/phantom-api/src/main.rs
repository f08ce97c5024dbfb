mod args;
mod auth;
mod control_handlers;
mod handlers;
mod monitor_handlers;
mod sniper_handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use phantom_engine::{monitor, queue, sniper, SharedState};
use phantom_store::FileStore;

use crate::args::Args;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!(data_dir = %args.data_dir, "phantom-api starting...");

    let store = FileStore::open(&args.data_dir).await?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build reqwest client");
            std::process::exit(1);
        });

    let engine = SharedState::load(Arc::new(store), http).await;

    tokio::spawn(queue::queue_loop(engine.clone()));
    tokio::spawn(sniper::sniper_loop(engine.clone()));
    tokio::spawn(monitor::monitor_loop(engine.clone()));

    // Subscriptions that survived a restart resume their monitoring without
    // waiting for an operator to press start again.
    if !engine.monitor.subscriptions_snapshot().await.is_empty() && engine.monitor.start() {
        engine
            .logs
            .info("monitor", "monitor resumed for restored subscriptions")
            .await;
    }

    if args.api_key.is_none() {
        tracing::warn!("PHANTOM_API_KEY not set, API authentication is disabled");
    }

    let st = AppState {
        engine,
        api_key: args.api_key.clone(),
        data_dir: args.data_dir.clone(),
    };

    let protected_routes = Router::new()
        .route("/settings", get(handlers::get_settings).post(handlers::save_settings))
        .route("/verify-auth", post(handlers::verify_auth))
        .route("/logs", get(handlers::get_logs).delete(handlers::clear_logs))
        .route("/logs/flush", post(handlers::flush_logs))
        .route("/queue", get(handlers::get_queue).post(handlers::add_queue_item))
        .route("/queue/clear", delete(handlers::clear_queue))
        .route("/queue/:id", delete(handlers::remove_queue_item))
        .route("/queue/:id/status", put(handlers::update_queue_status))
        .route(
            "/purchase-history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/stats", get(handlers::get_stats))
        .route("/servers", get(handlers::get_servers))
        .route("/availability/:planCode", get(handlers::get_availability))
        .route("/cache/info", get(handlers::cache_info))
        .route("/cache/clear", post(handlers::clear_cache))
        // Availability monitor
        .route(
            "/monitor/subscriptions",
            get(monitor_handlers::get_subscriptions).post(monitor_handlers::add_subscription),
        )
        .route("/monitor/subscriptions/clear", delete(monitor_handlers::clear_subscriptions))
        .route("/monitor/subscriptions/:planCode", delete(monitor_handlers::remove_subscription))
        .route(
            "/monitor/subscriptions/:planCode/history",
            get(monitor_handlers::subscription_history),
        )
        .route("/monitor/start", post(monitor_handlers::start_monitor))
        .route("/monitor/stop", post(monitor_handlers::stop_monitor))
        .route("/monitor/status", get(monitor_handlers::monitor_status))
        .route("/monitor/interval", put(monitor_handlers::set_monitor_interval))
        .route("/monitor/test-notification", post(monitor_handlers::test_notification))
        // Config sniper
        .route("/config-sniper/options/:planCode", get(sniper_handlers::get_config_options))
        .route(
            "/config-sniper/tasks",
            get(sniper_handlers::get_tasks).post(sniper_handlers::create_task),
        )
        .route("/config-sniper/tasks/:id", delete(sniper_handlers::delete_task))
        .route("/config-sniper/tasks/:id/toggle", put(sniper_handlers::toggle_task))
        .route("/config-sniper/tasks/:id/check", post(sniper_handlers::check_task))
        .route("/config-sniper/quick-order", post(sniper_handlers::quick_order))
        // Owned-server control
        .route("/server-control/list", get(control_handlers::list_servers))
        .route("/server-control/:service/reboot", post(control_handlers::reboot_server))
        .route("/server-control/:service/templates", get(control_handlers::list_templates))
        .route("/server-control/:service/install", post(control_handlers::install_os))
        .route("/server-control/:service/install/status", get(control_handlers::install_status))
        .route("/server-control/:service/tasks", get(control_handlers::list_tasks))
        .route(
            "/server-control/:service/boot-mode",
            get(control_handlers::get_boot_mode).put(control_handlers::set_boot_mode),
        )
        .route(
            "/server-control/:service/monitoring",
            get(control_handlers::get_monitoring).put(control_handlers::set_monitoring),
        )
        .route("/server-control/:service/hardware", get(control_handlers::get_hardware))
        .route("/server-control/:service/ips", get(control_handlers::get_ips))
        .route(
            "/server-control/:service/reverse",
            get(control_handlers::get_reverse).post(control_handlers::set_reverse),
        )
        .route("/server-control/:service/serviceinfo", get(control_handlers::get_service_info))
        .route(
            "/server-control/:service/partition-schemes",
            get(control_handlers::get_partition_schemes),
        )
        .route("/server-control/:service/console", get(control_handlers::get_console))
        .layer(middleware::from_fn_with_state(st.clone(), auth::auth_middleware))
        .with_state(st.clone());

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes);

    let app = Router::new().nest("/api", api_routes);

    tracing::info!(addr = %args.listen_addr, "phantom-api listening");
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
