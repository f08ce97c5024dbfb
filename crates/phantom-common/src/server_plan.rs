use serde::{Deserialize, Serialize};

/// Availability of one plan in one facility, enriched with display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterStatus {
    pub datacenter: String,
    /// Raw availability string (`unavailable`, `unknown`, `1H-high`, ...).
    pub availability: String,
    #[serde(default)]
    pub dc_name: String,
    #[serde(default)]
    pub region: String,
}

impl DatacenterStatus {
    pub fn new(datacenter: String, availability: String) -> Self {
        let (dc_name, region) = datacenter_display(&datacenter);
        Self {
            datacenter,
            availability,
            dc_name: dc_name.to_string(),
            region: region.to_string(),
        }
    }

    /// Anything that is not explicitly unavailable or unknown counts as
    /// orderable stock.
    pub fn is_available(&self) -> bool {
        self.availability != "unavailable" && self.availability != "unknown"
    }
}

/// A selectable hardware addon of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOption {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/// One sellable dedicated-server model, as assembled from the eco catalog
/// and the availability API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPlan {
    pub plan_code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cpu: String,
    pub memory: String,
    pub storage: String,
    pub bandwidth: String,
    pub vrack_bandwidth: String,
    #[serde(default)]
    pub datacenters: Vec<DatacenterStatus>,
    #[serde(default)]
    pub default_options: Vec<ConfigOption>,
    #[serde(default)]
    pub available_options: Vec<ConfigOption>,
}

impl ServerPlan {
    /// A plan counts as available when any facility reports stock.
    pub fn has_stock(&self) -> bool {
        self.datacenters.iter().any(DatacenterStatus::is_available)
    }
}

/// Facility name and region for a datacenter code. Codes carry a numeric
/// suffix (`gra2`, `rbx8`); only the three-letter prefix identifies the
/// facility.
pub fn datacenter_display(code: &str) -> (&'static str, &'static str) {
    let prefix = code.to_ascii_lowercase();
    let prefix = prefix.get(..3).unwrap_or_default().to_string();
    match prefix.as_str() {
        "gra" => ("Gravelines", "France"),
        "sbg" => ("Strasbourg", "France"),
        "rbx" => ("Roubaix", "France"),
        "par" => ("Paris", "France"),
        "bhs" => ("Beauharnois", "Canada"),
        "hil" => ("Hillsboro", "United States"),
        "vin" => ("Vint Hill", "United States"),
        "lim" => ("Limburg", "Germany"),
        "fra" => ("Frankfurt", "Germany"),
        "waw" => ("Warsaw", "Poland"),
        "lon" => ("London", "United Kingdom"),
        "eri" => ("Erith", "United Kingdom"),
        "sgp" => ("Singapore", "Singapore"),
        "syd" => ("Sydney", "Australia"),
        _ => ("", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datacenter_display_uses_prefix() {
        assert_eq!(datacenter_display("gra2"), ("Gravelines", "France"));
        assert_eq!(datacenter_display("RBX8"), ("Roubaix", "France"));
        assert_eq!(datacenter_display("xyz1"), ("", ""));
    }

    #[test]
    fn test_availability_classification() {
        let up = DatacenterStatus::new("gra".into(), "1H-high".into());
        assert!(up.is_available());
        let down = DatacenterStatus::new("gra".into(), "unavailable".into());
        assert!(!down.is_available());
        let unknown = DatacenterStatus::new("gra".into(), "unknown".into());
        assert!(!unknown.is_available());
    }
}
