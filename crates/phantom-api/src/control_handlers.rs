use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use phantom_ovh::{OvhClient, OvhError};

use crate::state::AppState;

const SOURCE: &str = "server_control";

fn error_response(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "success": false, "error": error.to_string() }))).into_response()
}

fn upstream_error(e: OvhError) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
}

/// Every server-control endpoint needs signed credentials; a missing
/// configuration is the operator's problem, not the upstream's.
async fn client_or_401(st: &AppState) -> Result<OvhClient, Response> {
    st.engine.ovh_client().await.map_err(|e| match e {
        OvhError::MissingCredentials => error_response(StatusCode::UNAUTHORIZED, e),
        other => error_response(StatusCode::INTERNAL_SERVER_ERROR, other),
    })
}

pub async fn list_servers(State(st): State<AppState>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let names = match client.dedicated_servers().await {
        Ok(names) => names,
        Err(e) => {
            st.engine.logs.error(SOURCE, format!("listing servers failed: {e}")).await;
            return upstream_error(e);
        }
    };
    st.engine
        .logs
        .info(SOURCE, format!("fetched server list: {} servers", names.len()))
        .await;

    let mut servers = Vec::new();
    for name in names {
        match server_summary(&client, &name).await {
            Ok(entry) => servers.push(entry),
            Err(e) => {
                st.engine
                    .logs
                    .error(SOURCE, format!("failed to fetch details for {name}: {e}"))
                    .await;
                servers.push(json!({
                    "serviceName": &name,
                    "name": &name,
                    "error": e.to_string(),
                }));
            }
        }
    }

    Json(json!({ "success": true, "total": servers.len(), "servers": servers })).into_response()
}

async fn server_summary(client: &OvhClient, name: &str) -> Result<Value, OvhError> {
    let info = client.server_info(name).await?;
    let service = client.service_infos(name).await?;
    Ok(json!({
        "serviceName": name,
        "name": if info.name.is_empty() { name.to_string() } else { info.name },
        "commercialRange": info.commercial_range.as_deref().unwrap_or("N/A"),
        "datacenter": info.datacenter.as_deref().unwrap_or("N/A"),
        "state": info.state.as_deref().unwrap_or("unknown"),
        "monitoring": info.monitoring,
        "reverse": info.reverse.as_deref().unwrap_or(""),
        "ip": info.ip.as_deref().unwrap_or("N/A"),
        "os": info.os.as_deref().unwrap_or("N/A"),
        "bootId": info.boot_id,
        "professionalUse": info.professional_use,
        "status": service.status.as_deref().unwrap_or("unknown"),
        "renewalType": service.renew.map(|r| r.automatic).unwrap_or(false),
    }))
}

pub async fn reboot_server(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.reboot(&service).await {
        Ok(task) => {
            st.engine.logs.info(SOURCE, format!("reboot requested for {service}")).await;
            Json(json!({
                "success": true,
                "message": format!("reboot requested for {service}"),
                "taskId": task.task_id,
            }))
            .into_response()
        }
        Err(e) => {
            st.engine.logs.error(SOURCE, format!("reboot of {service} failed: {e}")).await;
            upstream_error(e)
        }
    }
}

/// Detail lookups are capped to keep one dashboard request from fanning out
/// into hundreds of upstream calls.
const TEMPLATE_DETAIL_LIMIT: usize = 20;

pub async fn list_templates(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let compatible = match client.compatible_templates(&service).await {
        Ok(templates) => templates,
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("template lookup for {service} failed: {e}"))
                .await;
            return upstream_error(e);
        }
    };

    let mut templates = Vec::new();
    for name in compatible.ovh.iter().take(TEMPLATE_DETAIL_LIMIT) {
        match client.template_detail(name).await {
            Ok(detail) => templates.push(json!({
                "templateName": name,
                "distribution": detail.distribution.as_deref().unwrap_or("N/A"),
                "family": detail.family.as_deref().unwrap_or("N/A"),
                "description": detail.description.as_deref().unwrap_or(""),
                "bitFormat": detail.bit_format.unwrap_or(64),
            })),
            Err(_) => templates.push(json!({
                "templateName": name,
                "distribution": name,
                "family": "unknown",
            })),
        }
    }

    Json(json!({ "success": true, "total": templates.len(), "templates": templates })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequest {
    pub template_name: Option<String>,
    pub custom_hostname: Option<String>,
    pub partition_scheme_name: Option<String>,
}

pub async fn install_os(
    State(st): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<InstallRequest>,
) -> Response {
    let Some(template) = req.template_name.filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "templateName is required");
    };

    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let mut body = json!({ "templateName": &template });
    if let Some(hostname) = req.custom_hostname.filter(|h| !h.is_empty()) {
        body["customHostname"] = json!(hostname);
    }
    if let Some(scheme) = req.partition_scheme_name.filter(|s| !s.is_empty()) {
        st.engine
            .logs
            .info(SOURCE, format!("using custom partition scheme {scheme}"))
            .await;
        body["partitionSchemeName"] = json!(scheme);
    }

    match client.install_start(&service, &body).await {
        Ok(task) => {
            st.engine
                .logs
                .info(SOURCE, format!("reinstall of {service} started with template {template}"))
                .await;
            Json(json!({
                "success": true,
                "message": format!("reinstall requested for {service}"),
                "taskId": task.task_id,
            }))
            .into_response()
        }
        Err(e) => {
            st.engine.logs.error(SOURCE, format!("reinstall of {service} failed: {e}")).await;
            upstream_error(e)
        }
    }
}

/// 404 passthrough: no installation in progress is a normal answer the
/// dashboard uses to decide whether to open the reinstall dialog.
pub async fn install_status(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.install_status(&service).await {
        Ok(status) => Json(json!({ "success": true, "status": status })).into_response(),
        Err(e) if e.is_not_found() => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "no installation in progress" })),
        )
            .into_response(),
        Err(e) => upstream_error(e),
    }
}

const TASK_DETAIL_LIMIT: usize = 10;

pub async fn list_tasks(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let ids = match client.server_tasks(&service).await {
        Ok(ids) => ids,
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("task list for {service} failed: {e}"))
                .await;
            return upstream_error(e);
        }
    };

    let recent = ids.iter().rev().take(TASK_DETAIL_LIMIT).rev();
    let mut tasks = Vec::new();
    for id in recent {
        if let Ok(detail) = client.server_task_detail(&service, *id).await {
            tasks.push(json!({
                "taskId": id,
                "function": detail.function.as_deref().unwrap_or("N/A"),
                "status": detail.status.as_deref().unwrap_or("unknown"),
                "comment": detail.comment.as_deref().unwrap_or(""),
                "startDate": detail.start_date.as_deref().unwrap_or(""),
                "doneDate": detail.done_date.as_deref().unwrap_or(""),
            }));
        }
    }

    Json(json!({ "success": true, "total": tasks.len(), "tasks": tasks })).into_response()
}

pub async fn get_boot_mode(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let current = match client.server_info(&service).await {
        Ok(info) => info.boot_id,
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("boot config for {service} failed: {e}"))
                .await;
            return upstream_error(e);
        }
    };

    let ids = match client.boot_ids(&service).await {
        Ok(ids) => ids,
        Err(e) => return upstream_error(e),
    };

    let mut boots = Vec::new();
    for id in ids {
        if let Ok(detail) = client.boot_detail(&service, id).await {
            boots.push(json!({
                "id": id,
                "bootType": detail.boot_type.as_deref().unwrap_or("N/A"),
                "description": detail.description.as_deref().unwrap_or(""),
                "kernel": detail.kernel.as_deref().unwrap_or(""),
                "isCurrent": Some(id) == current,
            }));
        }
    }

    Json(json!({ "success": true, "currentBootId": current, "boots": boots })).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootModeRequest {
    pub boot_id: Option<i64>,
}

pub async fn set_boot_mode(
    State(st): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<BootModeRequest>,
) -> Response {
    let Some(boot_id) = req.boot_id else {
        return error_response(StatusCode::BAD_REQUEST, "bootId is required");
    };

    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.set_boot_id(&service, boot_id).await {
        Ok(()) => {
            st.engine
                .logs
                .info(SOURCE, format!("boot mode of {service} set to {boot_id}"))
                .await;
            Json(json!({
                "success": true,
                "message": "boot mode updated, takes effect after the next reboot",
            }))
            .into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("setting boot mode of {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

pub async fn get_monitoring(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.server_info(&service).await {
        Ok(info) => Json(json!({ "success": true, "monitoring": info.monitoring })).into_response(),
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("monitoring state of {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonitoringRequest {
    #[serde(default)]
    pub enabled: bool,
}

pub async fn set_monitoring(
    State(st): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<MonitoringRequest>,
) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.set_monitoring(&service, req.enabled).await {
        Ok(()) => {
            let verb = if req.enabled { "enabled" } else { "disabled" };
            st.engine.logs.info(SOURCE, format!("monitoring {verb} for {service}")).await;
            Json(json!({ "success": true, "message": format!("monitoring {verb}") })).into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("setting monitoring of {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

pub async fn get_hardware(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.hardware_specs(&service).await {
        Ok(hardware) => {
            let field = |key: &str| hardware.get(key).cloned().unwrap_or(Value::Null);
            Json(json!({
                "success": true,
                "hardware": {
                    "diskGroups": hardware.get("diskGroups").cloned().unwrap_or_else(|| json!([])),
                    "memorySize": field("memorySize"),
                    "processorName": hardware.get("processorName").and_then(Value::as_str).unwrap_or("N/A"),
                    "processorArchitecture": hardware.get("processorArchitecture").and_then(Value::as_str).unwrap_or("N/A"),
                    "processorCores": hardware.get("processorCores").and_then(Value::as_i64).unwrap_or(0),
                    "processorThreads": hardware.get("processorThreads").and_then(Value::as_i64).unwrap_or(0),
                    "defaultHardwareRaidSize": field("defaultHardwareRaidSize"),
                    "defaultHardwareRaidType": hardware.get("defaultHardwareRaidType").and_then(Value::as_str).unwrap_or("N/A"),
                },
            }))
            .into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("hardware specs of {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

pub async fn get_ips(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let ip_list = match client.server_ips(&service).await {
        Ok(ips) => ips,
        Err(e) => {
            st.engine.logs.error(SOURCE, format!("IP list of {service} failed: {e}")).await;
            return upstream_error(e);
        }
    };

    let mut ips = Vec::new();
    for ip in ip_list {
        match client.ip_detail(&ip).await {
            Ok(detail) => ips.push(json!({
                "ip": ip,
                "type": detail.ip_type.as_deref().unwrap_or("N/A"),
                "description": detail.description.as_deref().unwrap_or(""),
                "routedTo": detail.routed_to.and_then(|r| r.service_name).unwrap_or_default(),
            })),
            Err(_) => ips.push(json!({ "ip": ip, "type": "unknown" })),
        }
    }

    Json(json!({ "success": true, "total": ips.len(), "ips": ips })).into_response()
}

pub async fn get_reverse(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let mut reverses = Vec::new();
    if let Ok(ips) = client.reverse_ips(&service).await {
        for ip in ips {
            if let Ok(detail) = client.reverse_detail(&service, &ip).await {
                reverses.push(json!({
                    "ipReverse": ip,
                    "reverse": detail.reverse.as_deref().unwrap_or(""),
                }));
            }
        }
    }

    Json(json!({ "success": true, "reverses": reverses })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ReverseRequest {
    pub ip: Option<String>,
    pub reverse: Option<String>,
}

pub async fn set_reverse(
    State(st): State<AppState>,
    Path(service): Path<String>,
    Json(req): Json<ReverseRequest>,
) -> Response {
    let (Some(ip), Some(reverse)) = (
        req.ip.filter(|v| !v.is_empty()),
        req.reverse.filter(|v| !v.is_empty()),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, "ip and reverse are required");
    };

    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.set_reverse(&service, &ip, &reverse).await {
        Ok(()) => {
            st.engine
                .logs
                .info(SOURCE, format!("reverse DNS of {ip} on {service} set to {reverse}"))
                .await;
            Json(json!({ "success": true, "message": "reverse DNS updated" })).into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("setting reverse DNS on {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

pub async fn get_service_info(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    match client.service_infos(&service).await {
        Ok(info) => {
            let renew = info.renew.unwrap_or_default();
            Json(json!({
                "success": true,
                "serviceInfo": {
                    "status": info.status.as_deref().unwrap_or("unknown"),
                    "expiration": info.expiration.as_deref().unwrap_or(""),
                    "creation": info.creation.as_deref().unwrap_or(""),
                    "renewalType": renew.automatic,
                    "renewalPeriod": renew.period.unwrap_or(0),
                },
            }))
            .into_response()
        }
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("service info of {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionSchemesQuery {
    pub template_name: Option<String>,
}

pub async fn get_partition_schemes(
    State(st): State<AppState>,
    Path(_service): Path<String>,
    Query(query): Query<PartitionSchemesQuery>,
) -> Response {
    let Some(template) = query.template_name.filter(|t| !t.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "templateName is required");
    };

    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    let scheme_names = match client.partition_schemes(&template).await {
        Ok(names) => names,
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("partition schemes of {template} failed: {e}"))
                .await;
            return upstream_error(e);
        }
    };

    let mut schemes = Vec::new();
    for scheme_name in scheme_names {
        let detail = async {
            let info = client.scheme_detail(&template, &scheme_name).await?;
            let mountpoints = client.scheme_partitions(&template, &scheme_name).await?;

            let mut partitions = Vec::new();
            for mountpoint in mountpoints {
                let p = client.partition_detail(&template, &scheme_name, &mountpoint).await?;
                partitions.push(json!({
                    "mountpoint": mountpoint,
                    "filesystem": p.filesystem.as_deref().unwrap_or(""),
                    "size": p.size.unwrap_or(0),
                    "order": p.order,
                    "raid": p.raid,
                    "type": p.partition_type.as_deref().unwrap_or("primary"),
                }));
            }
            partitions.sort_by_key(|p| p["order"].as_i64().unwrap_or(0));

            Ok::<_, OvhError>(json!({
                "name": scheme_name,
                "priority": info.priority,
                "partitions": partitions,
            }))
        }
        .await;

        if let Ok(scheme) = detail {
            schemes.push(scheme);
        }
    }

    Json(json!({ "success": true, "schemes": schemes })).into_response()
}

/// Serial-over-LAN console access via the IPMI feature API. The access URL
/// is generated asynchronously, so a fresh request may report pending.
pub async fn get_console(State(st): State<AppState>, Path(service): Path<String>) -> Response {
    const ACCESS_KIND: &str = "serialOverLanURL";
    const ACCESS_TTL_MINUTES: u32 = 15;

    let client = match client_or_401(&st).await {
        Ok(client) => client,
        Err(resp) => return resp,
    };

    if let Err(e) = client.request_ipmi_access(&service, ACCESS_KIND, ACCESS_TTL_MINUTES).await {
        st.engine
            .logs
            .error(SOURCE, format!("IPMI access request for {service} failed: {e}"))
            .await;
        return upstream_error(e);
    }

    match client.ipmi_access(&service, ACCESS_KIND).await {
        Ok(access) => {
            st.engine.logs.info(SOURCE, format!("console access issued for {service}")).await;
            Json(json!({
                "success": true,
                "console": {
                    "type": ACCESS_KIND,
                    "url": access.value,
                    "expiration": access.expiration,
                },
            }))
            .into_response()
        }
        Err(e) if e.is_not_found() => Json(json!({
            "success": true,
            "status": "pending",
            "message": "console access is being prepared, retry shortly",
        }))
        .into_response(),
        Err(e) => {
            st.engine
                .logs
                .error(SOURCE, format!("console access for {service} failed: {e}"))
                .await;
            upstream_error(e)
        }
    }
}
