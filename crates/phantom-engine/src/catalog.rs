use phantom_common::{ConfigOption, DatacenterStatus, ServerPlan};
use phantom_ovh::{CatalogPlan, OvhClient, OvhError};

use crate::logs::LogStore;

const CPU_KEYWORDS: &[&str] = &["i3-", "i5-", "i7-", "i9-", "xeon", "epyc", "ryzen"];

/// License/OS addon codes that must not be offered as hardware options.
fn is_license_addon(addon: &str) -> bool {
    let lower = addon.to_ascii_lowercase();
    lower.starts_with("os-")
        || lower.contains("windows-server")
        || lower.contains("sql-server")
        || lower.contains("cpanel-license")
        || lower.contains("plesk-")
        || lower.contains("-license-")
        || lower.contains("control-panel")
        || lower.contains("panel")
}

/// Pulls a CPU model out of a display string. Catalog names carry the CPU
/// after a `|` separator ("KS-A | Intel i7-6700k") or inline as a keyword.
pub fn extract_cpu(names: &[&str]) -> Option<String> {
    for name in names {
        if name.is_empty() {
            continue;
        }

        if let Some((_, cpu_part)) = name.split_once('|') {
            let cpu_part = cpu_part.trim();
            let lower = cpu_part.to_ascii_lowercase();
            if ["intel", "amd", "xeon", "i7"].iter().any(|kw| lower.contains(kw)) {
                return Some(cpu_part.to_string());
            }
        }

        let lower = name.to_ascii_lowercase();
        for keyword in CPU_KEYWORDS {
            if let Some(pos) = lower.find(keyword) {
                let end = (pos + 30).min(name.len());
                // stay on a char boundary for the slice
                let end = (end..name.len()).find(|i| name.is_char_boundary(*i)).unwrap_or(name.len());
                let fragment = name[pos..end].split(',').next().unwrap_or_default().trim();
                if !fragment.is_empty() {
                    return Some(fragment.to_string());
                }
            }
        }
    }
    None
}

/// Series fallback when no CPU model can be extracted.
fn cpu_fallback(plan_code: &str) -> &'static str {
    let lower = plan_code.to_ascii_lowercase();
    if lower.contains("sysle") {
        "SYS LE series CPU"
    } else if lower.contains("rise") {
        "RISE series CPU"
    } else if lower.contains("game") {
        "GAME series CPU"
    } else {
        "Dedicated server CPU"
    }
}

/// Builds the hardware summary and option lists from a plan's addon
/// families. The family default describes the base configuration.
pub fn extract_options(plan: &CatalogPlan) -> (Vec<ConfigOption>, Vec<ConfigOption>, PlanHardware) {
    let mut defaults = Vec::new();
    let mut available = Vec::new();
    let mut hardware = PlanHardware::default();

    for family in &plan.addon_families {
        let family_name = family.name.to_ascii_lowercase();

        for addon in &family.addons {
            if is_license_addon(addon) {
                continue;
            }
            let is_default = family.default.as_deref() == Some(addon.as_str());
            available.push(ConfigOption {
                label: addon.clone(),
                value: addon.clone(),
                family: Some(family_name.clone()),
                is_default: Some(is_default),
            });
            if is_default {
                defaults.push(ConfigOption {
                    label: addon.clone(),
                    value: addon.clone(),
                    family: None,
                    is_default: None,
                });
            }
        }

        let default_value = family.default.clone().or_else(|| family.addons.first().cloned());
        let Some(value) = default_value else { continue };
        if family_name.contains("vrack") {
            hardware.vrack_bandwidth.get_or_insert(value);
        } else if family_name.contains("memory") || family_name.contains("ram") {
            hardware.memory.get_or_insert(value);
        } else if family_name.contains("storage") || family_name.contains("disk") {
            hardware.storage.get_or_insert(value);
        } else if family_name.contains("bandwidth") || family_name.contains("traffic") {
            hardware.bandwidth.get_or_insert(value);
        }
    }

    (defaults, available, hardware)
}

#[derive(Debug, Default)]
pub struct PlanHardware {
    pub memory: Option<String>,
    pub storage: Option<String>,
    pub bandwidth: Option<String>,
    pub vrack_bandwidth: Option<String>,
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| "N/A".to_string())
}

/// Assembles one [`ServerPlan`] from its catalog entry plus an availability
/// lookup.
pub fn build_plan(plan: &CatalogPlan, datacenters: Vec<DatacenterStatus>) -> ServerPlan {
    let (default_options, available_options, hardware) = extract_options(plan);

    let display_name = plan.display_name.as_deref().unwrap_or_default();
    let name = if plan.invoice_name.is_empty() {
        display_name.to_string()
    } else {
        plan.invoice_name.clone()
    };
    let description = if plan.description.is_empty() {
        display_name.to_string()
    } else {
        plan.description.clone()
    };

    let cpu = extract_cpu(&[display_name, &plan.invoice_name, &plan.description])
        .unwrap_or_else(|| cpu_fallback(&plan.plan_code).to_string());

    ServerPlan {
        plan_code: plan.plan_code.clone(),
        name,
        description,
        cpu,
        memory: or_na(hardware.memory),
        storage: or_na(hardware.storage),
        bandwidth: or_na(hardware.bandwidth),
        vrack_bandwidth: or_na(hardware.vrack_bandwidth),
        datacenters,
        default_options,
        available_options,
    }
}

/// Loads the full sellable plan list: one catalog query plus one
/// availability query per plan. A failed availability lookup degrades to an
/// empty datacenter list rather than aborting the whole refresh.
pub async fn load_server_plans(
    client: &OvhClient,
    subsidiary: &str,
    logs: &LogStore,
) -> Result<Vec<ServerPlan>, OvhError> {
    let catalog = client.eco_catalog(subsidiary).await?;
    let mut plans = Vec::new();

    for entry in &catalog.plans {
        if entry.plan_code.is_empty() {
            continue;
        }

        let datacenters = match client.datacenter_availabilities(&entry.plan_code, &[]).await {
            Ok(availabilities) => availabilities
                .into_iter()
                .flat_map(|a| a.datacenters)
                .map(|dc| DatacenterStatus::new(dc.datacenter, dc.availability))
                .collect(),
            Err(e) => {
                logs.warning(
                    "servers",
                    format!("availability lookup failed for {}: {e}", entry.plan_code),
                )
                .await;
                Vec::new()
            }
        };

        plans.push(build_plan(entry, datacenters));
    }

    logs.info("servers", format!("loaded {} plans from the catalog", plans.len())).await;
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantom_ovh::AddonFamily;

    #[test]
    fn test_cpu_from_pipe_separator() {
        let cpu = extract_cpu(&["KS-A | Intel i7-6700k"]).unwrap();
        assert_eq!(cpu, "Intel i7-6700k");
    }

    #[test]
    fn test_cpu_from_keyword() {
        let cpu = extract_cpu(&["Advance-1 with Ryzen 5 3600 processor, 64GB"]).unwrap();
        assert!(cpu.to_lowercase().starts_with("ryzen"));
        assert!(!cpu.contains(','));
    }

    #[test]
    fn test_cpu_not_found() {
        assert!(extract_cpu(&["Plain server", ""]).is_none());
        assert_eq!(cpu_fallback("25sysle012"), "SYS LE series CPU");
        assert_eq!(cpu_fallback("24rise01"), "RISE series CPU");
        assert_eq!(cpu_fallback("abc"), "Dedicated server CPU");
    }

    fn plan_with_families(families: Vec<AddonFamily>) -> CatalogPlan {
        CatalogPlan {
            plan_code: "24rise01".into(),
            invoice_name: "Rise-1".into(),
            display_name: None,
            description: String::new(),
            addon_families: families,
        }
    }

    #[test]
    fn test_extract_options_marks_defaults_and_skips_licenses() {
        let plan = plan_with_families(vec![
            AddonFamily {
                name: "memory".into(),
                default: Some("ram-64g-ecc-2400".into()),
                addons: vec!["ram-32g-ecc-2400".into(), "ram-64g-ecc-2400".into()],
            },
            AddonFamily {
                name: "os".into(),
                default: None,
                addons: vec!["os-debian12".into(), "windows-server-2022-license".into()],
            },
        ]);

        let (defaults, available, hardware) = extract_options(&plan);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].value, "ram-64g-ecc-2400");
        assert_eq!(available.len(), 2, "license addons are dropped");
        assert_eq!(hardware.memory.as_deref(), Some("ram-64g-ecc-2400"));
    }

    #[test]
    fn test_build_plan_fills_na() {
        let plan = plan_with_families(vec![]);
        let built = build_plan(&plan, vec![]);
        assert_eq!(built.memory, "N/A");
        assert_eq!(built.storage, "N/A");
        assert_eq!(built.name, "Rise-1");
        assert_eq!(built.cpu, "RISE series CPU");
    }
}
