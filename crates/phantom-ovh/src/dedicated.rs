use serde::Deserialize;
use serde_json::{json, Value};
use urlencoding::encode;

use crate::client::OvhClient;
use crate::error::OvhError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub commercial_range: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub monitoring: bool,
    #[serde(default)]
    pub reverse: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub boot_id: Option<i64>,
    #[serde(default)]
    pub professional_use: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Renew {
    #[serde(default)]
    pub automatic: bool,
    #[serde(default)]
    pub period: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceInfos {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub creation: Option<String>,
    #[serde(default)]
    pub renew: Option<Renew>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub done_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompatibleTemplates {
    #[serde(default)]
    pub ovh: Vec<String>,
    #[serde(default)]
    pub personal: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetail {
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bit_format: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootDetail {
    #[serde(default)]
    pub boot_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kernel: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedTo {
    #[serde(default)]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpDetail {
    #[serde(default, rename = "type")]
    pub ip_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "routedTo")]
    pub routed_to: Option<RoutedTo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseDetail {
    #[serde(default)]
    pub ip_reverse: Option<String>,
    #[serde(default)]
    pub reverse: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemeDetail {
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartitionDetail {
    #[serde(default)]
    pub filesystem: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub raid: Option<String>,
    #[serde(default, rename = "type")]
    pub partition_type: Option<String>,
}

/// Temporary IPMI access descriptor (serial-over-LAN or KVM URL).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpmiAccess {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub expiration: Option<String>,
}

impl OvhClient {
    pub async fn dedicated_servers(&self) -> Result<Vec<String>, OvhError> {
        self.get("/dedicated/server").await
    }

    pub async fn server_info(&self, service: &str) -> Result<ServerInfo, OvhError> {
        self.get(&format!("/dedicated/server/{service}")).await
    }

    pub async fn service_infos(&self, service: &str) -> Result<ServiceInfos, OvhError> {
        self.get(&format!("/dedicated/server/{service}/serviceInfos")).await
    }

    pub async fn reboot(&self, service: &str) -> Result<TaskDetail, OvhError> {
        self.post_empty(&format!("/dedicated/server/{service}/reboot")).await
    }

    pub async fn server_tasks(&self, service: &str) -> Result<Vec<i64>, OvhError> {
        self.get(&format!("/dedicated/server/{service}/task")).await
    }

    pub async fn server_task_detail(&self, service: &str, task_id: i64) -> Result<TaskDetail, OvhError> {
        self.get(&format!("/dedicated/server/{service}/task/{task_id}")).await
    }

    pub async fn compatible_templates(&self, service: &str) -> Result<CompatibleTemplates, OvhError> {
        self.get(&format!("/dedicated/server/{service}/install/compatibleTemplates"))
            .await
    }

    pub async fn template_detail(&self, template: &str) -> Result<TemplateDetail, OvhError> {
        self.get(&format!("/dedicated/installationTemplate/{}", encode(template)))
            .await
    }

    pub async fn install_start(&self, service: &str, body: &Value) -> Result<TaskDetail, OvhError> {
        self.post(&format!("/dedicated/server/{service}/install/start"), body).await
    }

    /// 404 here means no installation is in progress; callers rely on
    /// [`OvhError::NotFound`] to tell that apart from a real failure.
    pub async fn install_status(&self, service: &str) -> Result<Value, OvhError> {
        self.get(&format!("/dedicated/server/{service}/install/status")).await
    }

    pub async fn boot_ids(&self, service: &str) -> Result<Vec<i64>, OvhError> {
        self.get(&format!("/dedicated/server/{service}/boot")).await
    }

    pub async fn boot_detail(&self, service: &str, boot_id: i64) -> Result<BootDetail, OvhError> {
        self.get(&format!("/dedicated/server/{service}/boot/{boot_id}")).await
    }

    pub async fn set_boot_id(&self, service: &str, boot_id: i64) -> Result<(), OvhError> {
        self.put(&format!("/dedicated/server/{service}"), &json!({ "bootId": boot_id }))
            .await
    }

    pub async fn set_monitoring(&self, service: &str, enabled: bool) -> Result<(), OvhError> {
        self.put(&format!("/dedicated/server/{service}"), &json!({ "monitoring": enabled }))
            .await
    }

    pub async fn hardware_specs(&self, service: &str) -> Result<Value, OvhError> {
        self.get(&format!("/dedicated/server/{service}/specifications/hardware"))
            .await
    }

    pub async fn server_ips(&self, service: &str) -> Result<Vec<String>, OvhError> {
        self.get(&format!("/dedicated/server/{service}/ips")).await
    }

    /// IP blocks contain a `/` that must be percent-encoded in the path.
    pub async fn ip_detail(&self, ip: &str) -> Result<IpDetail, OvhError> {
        self.get(&format!("/ip/{}", encode(ip))).await
    }

    pub async fn reverse_ips(&self, service: &str) -> Result<Vec<String>, OvhError> {
        self.get(&format!("/dedicated/server/{service}/reverse")).await
    }

    pub async fn reverse_detail(&self, service: &str, ip: &str) -> Result<ReverseDetail, OvhError> {
        self.get(&format!("/dedicated/server/{service}/reverse/{}", encode(ip)))
            .await
    }

    pub async fn set_reverse(&self, service: &str, ip: &str, reverse: &str) -> Result<(), OvhError> {
        self.post(
            &format!("/dedicated/server/{service}/reverse"),
            &json!({ "ipReverse": ip, "reverse": reverse }),
        )
        .await
    }

    pub async fn partition_schemes(&self, template: &str) -> Result<Vec<String>, OvhError> {
        self.get(&format!(
            "/dedicated/installationTemplate/{}/partitionScheme",
            encode(template)
        ))
        .await
    }

    pub async fn scheme_detail(&self, template: &str, scheme: &str) -> Result<SchemeDetail, OvhError> {
        self.get(&format!(
            "/dedicated/installationTemplate/{}/partitionScheme/{}",
            encode(template),
            encode(scheme)
        ))
        .await
    }

    pub async fn scheme_partitions(&self, template: &str, scheme: &str) -> Result<Vec<String>, OvhError> {
        self.get(&format!(
            "/dedicated/installationTemplate/{}/partitionScheme/{}/partition",
            encode(template),
            encode(scheme)
        ))
        .await
    }

    pub async fn partition_detail(
        &self,
        template: &str,
        scheme: &str,
        mountpoint: &str,
    ) -> Result<PartitionDetail, OvhError> {
        self.get(&format!(
            "/dedicated/installationTemplate/{}/partitionScheme/{}/partition/{}",
            encode(template),
            encode(scheme),
            encode(mountpoint)
        ))
        .await
    }

    pub async fn request_ipmi_access(&self, service: &str, kind: &str, ttl_minutes: u32) -> Result<TaskDetail, OvhError> {
        self.post(
            &format!("/dedicated/server/{service}/features/ipmi/access"),
            &json!({ "type": kind, "ttl": ttl_minutes }),
        )
        .await
    }

    pub async fn ipmi_access(&self, service: &str, kind: &str) -> Result<IpmiAccess, OvhError> {
        self.get(&format!(
            "/dedicated/server/{service}/features/ipmi/access?type={}",
            encode(kind)
        ))
        .await
    }
}
