use serde::Deserialize;
use urlencoding::encode;

use crate::client::OvhClient;
use crate::error::OvhError;

/// One row of `/dedicated/server/datacenter/availabilities`: a plan (or a
/// plan+configuration variant) with per-facility stock.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityEntry {
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub datacenters: Vec<DatacenterAvailability>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatacenterAvailability {
    #[serde(default)]
    pub datacenter: String,
    #[serde(default = "unknown")]
    pub availability: String,
}

fn unknown() -> String {
    "unknown".to_string()
}

impl DatacenterAvailability {
    pub fn is_available(&self) -> bool {
        self.availability != "unavailable" && self.availability != "unknown"
    }
}

/// Public eco catalog subset the engine consumes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub plans: Vec<CatalogPlan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPlan {
    #[serde(default)]
    pub plan_code: String,
    #[serde(default)]
    pub invoice_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub addon_families: Vec<AddonFamily>,
}

/// An addon family (`memory`, `storage`, `bandwidth`, ...) with its default
/// selection and the full addon code list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddonFamily {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub addons: Vec<String>,
}

impl CatalogPlan {
    pub fn family(&self, name: &str) -> Option<&AddonFamily> {
        self.addon_families.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

impl OvhClient {
    /// Datacenter availability for a plan, optionally narrowed to specific
    /// addon families (configuration variants).
    pub async fn datacenter_availabilities(
        &self,
        plan_code: &str,
        addon_families: &[String],
    ) -> Result<Vec<AvailabilityEntry>, OvhError> {
        let mut path = format!("/dedicated/server/datacenter/availabilities?planCode={}", encode(plan_code));
        for family in addon_families {
            path.push_str("&addonFamily=");
            path.push_str(&encode(family));
        }
        self.get(&path).await
    }

    pub async fn eco_catalog(&self, subsidiary: &str) -> Result<Catalog, OvhError> {
        self.get(&format!("/order/catalog/public/eco?ovhSubsidiary={}", encode(subsidiary)))
            .await
    }
}
