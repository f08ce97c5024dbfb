use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::Utc;
use phantom_common::{BoundConfig, MatchStatus, QueueItem, Settings, SniperTask};
use phantom_ovh::{Catalog, CatalogPlan, OvhClient, OvhError};
use regex::Regex;
use serde::Serialize;

use crate::state::SharedState;

/// Sniper poll period.
pub const SNIPER_LOOP_SECS: u64 = 60;
/// Retry policy applied to orders the sniper enqueues.
const SNIPER_RETRY_INTERVAL_SECS: u64 = 30;
const SNIPER_MAX_RETRIES: u64 = 3;

const SOURCE: &str = "config_sniper";

/// Model-suffix patterns stripped from addon codes before comparison.
/// Catalog addon codes embed the server series they belong to
/// (`ram-64g-ecc-2400-24sk50`); two configurations are "the same" when they
/// agree after these are removed.
fn model_suffix_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"-\d+skl[a-e]\d{2}(-v\d+)?",
            r"-\d+sk\d+",
            r"-\d+rise\d*",
            r"-\d+sys\w*",
            r"-\d+risegame\d*",
            r"-\d+risestor",
            r"-\d+skgame\d*",
            r"-\d+ska\d*",
            r"-\d+skstor\d*",
            r"-\d+sysstor",
            r"game\d*",
            r"stor\d*",
            r"-ks\d+",
            r"-rise",
            r"-\d+sysle\d+",
            r"-\d+skb\d+",
            r"-\d+skc\d+",
            r"-\d+sk\d+b",
            r"-v\d+",
            r"-[a-z]{3}$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

fn memory_freq_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(no)?ecc-\d+").expect("static pattern"))
}

fn storage_medium_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-(sas|sa|ssd|nvme)$").expect("static pattern"))
}

fn spec_tail_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\d{4,5}$").expect("static pattern"))
}

/// Reduces an addon code to its core parameters: series suffixes, memory
/// frequency, storage medium and trailing spec numbers are all noise for
/// matching purposes.
pub fn standardize_config(code: &str) -> String {
    if code.is_empty() {
        return String::new();
    }

    let mut normalized = code.trim().to_ascii_lowercase();
    for pattern in model_suffix_patterns() {
        normalized = pattern.replace_all(&normalized, "").into_owned();
    }
    normalized = memory_freq_pattern().replace_all(&normalized, "").into_owned();
    normalized = storage_medium_pattern().replace_all(&normalized, "").into_owned();
    normalized = spec_tail_pattern().replace_all(&normalized, "").into_owned();
    normalized
}

/// Standardized (memory, storage) pair identifying a configuration.
pub type Fingerprint = (String, String);

pub fn fingerprint(bound: &BoundConfig) -> Fingerprint {
    (standardize_config(&bound.memory), standardize_config(&bound.storage))
}

pub fn format_memory_display(code: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)(\d+)g").expect("static pattern"));
    match re.captures(code) {
        Some(caps) => format!("{}GB RAM", &caps[1]),
        None => code.to_string(),
    }
}

pub fn format_storage_display(code: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)(\d+)x(\d+)(ssd|nvme|hdd)").expect("static pattern"));
    match re.captures(code) {
        Some(caps) => format!("{}x {}GB {}", &caps[1], &caps[2], caps[3].to_uppercase()),
        None => code.to_string(),
    }
}

/// Every plan in the catalog offering a memory and a storage addon that
/// standardize to the fingerprint.
pub fn find_matching_plans(catalog: &Catalog, fp: &Fingerprint) -> Vec<String> {
    let mut matched = Vec::new();
    for plan in &catalog.plans {
        if plan.plan_code.is_empty() {
            continue;
        }
        let Some(memory_family) = plan.family("memory") else { continue };
        let Some(storage_family) = plan.family("storage") else { continue };

        let memory_ok = memory_family.addons.iter().any(|a| standardize_config(a) == fp.0);
        let storage_ok = storage_family.addons.iter().any(|a| standardize_config(a) == fp.1);
        if memory_ok && storage_ok && !matched.contains(&plan.plan_code) {
            matched.push(plan.plan_code.clone());
        }
    }
    matched
}

/// Maps a bound configuration onto a target plan's own addon codes: the
/// addons that standardize to the same core parameters.
pub fn resolve_bound_options(plan: &CatalogPlan, bound: &BoundConfig) -> Vec<String> {
    let fp = fingerprint(bound);
    let mut options = Vec::new();

    if let Some(family) = plan.family("memory") {
        if let Some(addon) = family.addons.iter().find(|a| standardize_config(a) == fp.0) {
            options.push(addon.clone());
        }
    }
    if let Some(family) = plan.family("storage") {
        if let Some(addon) = family.addons.iter().find(|a| standardize_config(a) == fp.1) {
            options.push(addon.clone());
        }
    }
    options
}

#[derive(Debug, Serialize)]
pub struct DisplayCode {
    pub code: String,
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct MatchedPlan {
    #[serde(rename = "planCode")]
    pub plan_code: String,
    pub datacenters: Vec<String>,
}

/// One configuration variant of a plan, with its matched counterparts.
#[derive(Debug, Serialize)]
pub struct ConfigVariant {
    pub memory: DisplayCode,
    pub storage: DisplayCode,
    pub matched_api2: Vec<MatchedPlan>,
    pub match_count: usize,
}

/// Lists the distinct memory+storage variants a plan is sold with, and for
/// each the counterpart plans (with datacenters) sharing that fingerprint.
pub async fn list_config_options(
    client: &OvhClient,
    zone: &str,
    plan_code: &str,
) -> Result<Vec<ConfigVariant>, OvhError> {
    let availabilities = client.datacenter_availabilities(plan_code, &[]).await?;
    if availabilities.is_empty() {
        return Err(OvhError::NotFound);
    }
    let catalog = client.eco_catalog(zone).await?;

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut variants = Vec::new();

    for entry in availabilities {
        let (Some(memory), Some(storage)) = (entry.memory, entry.storage) else {
            continue;
        };
        if !seen.insert((memory.clone(), storage.clone())) {
            continue;
        }

        let fp = (standardize_config(&memory), standardize_config(&storage));
        let matched_codes = find_matching_plans(&catalog, &fp);

        let mut matched = Vec::new();
        for code in matched_codes {
            let datacenters = match client.datacenter_availabilities(&code, &[]).await {
                Ok(entries) => {
                    let mut dcs: Vec<String> = entries
                        .into_iter()
                        .flat_map(|e| e.datacenters)
                        .map(|dc| dc.datacenter)
                        .collect::<HashSet<_>>()
                        .into_iter()
                        .collect();
                    dcs.sort();
                    dcs
                }
                Err(_) => continue,
            };
            if !datacenters.is_empty() {
                matched.push(MatchedPlan {
                    plan_code: code,
                    datacenters,
                });
            }
        }

        variants.push(ConfigVariant {
            memory: DisplayCode {
                display: format_memory_display(&memory),
                code: memory,
            },
            storage: DisplayCode {
                display: format_storage_display(&storage),
                code: storage,
            },
            match_count: matched.len(),
            matched_api2: matched,
        });
    }

    Ok(variants)
}

async fn update_task(state: &SharedState, id: &str, apply: impl FnOnce(&mut SniperTask)) -> bool {
    let mut tasks = state.sniper_tasks.write().await;
    match tasks.iter_mut().find(|t| t.id == id) {
        Some(task) => {
            apply(task);
            true
        }
        None => false,
    }
}

/// Checks one counterpart plan's availability and enqueues an order for
/// every datacenter with stock that this task has not already queued.
/// Returns whether anything new entered the queue.
pub async fn check_and_queue(
    state: &SharedState,
    client: &OvhClient,
    settings: &Settings,
    catalog: &Catalog,
    api2_plan_code: &str,
    task: &SniperTask,
) -> Result<bool, OvhError> {
    let availabilities = client.datacenter_availabilities(api2_plan_code, &[]).await?;
    let mut queued = false;

    for entry in availabilities {
        for dc in entry.datacenters {
            if !dc.is_available() {
                continue;
            }

            let already_queued = state.queue.read().await.iter().any(|q| {
                q.plan_code == api2_plan_code
                    && q.datacenter == dc.datacenter
                    && q.config_sniper_task_id.as_deref() == Some(task.id.as_str())
            });
            if already_queued {
                continue;
            }

            state
                .logs
                .info(
                    SOURCE,
                    format!(
                        "stock found: {api2_plan_code} in {} ({})",
                        dc.datacenter, dc.availability
                    ),
                )
                .await;

            let options = catalog
                .plans
                .iter()
                .find(|p| p.plan_code == api2_plan_code)
                .map(|p| resolve_bound_options(p, &task.bound_config))
                .unwrap_or_default();

            let mut item = QueueItem::new(
                api2_plan_code.to_string(),
                dc.datacenter.clone(),
                options,
                SNIPER_RETRY_INTERVAL_SECS,
            );
            item.max_retries = Some(SNIPER_MAX_RETRIES);
            item.config_sniper_task_id = Some(task.id.clone());
            let item_id = item.id.clone();

            state.queue.write().await.push(item);
            state.save_queue().await;
            queued = true;

            state
                .logs
                .info(
                    SOURCE,
                    format!("queued {api2_plan_code} in {} as task {item_id}", dc.datacenter),
                )
                .await;

            let message = format!(
                "Config sniper triggered\nSource plan: {}\nConfiguration: {} + {}\nOrdering plan: {api2_plan_code}\nDatacenter: {} ({})\nAdded to the purchase queue",
                task.api1_plan_code,
                format_memory_display(&task.bound_config.memory),
                format_storage_display(&task.bound_config.storage),
                dc.datacenter,
                dc.availability,
            );
            state.notifier.send(settings, &message).await;
        }
    }

    Ok(queued)
}

/// Pending-match pass: look for plan codes that appeared since the task was
/// created, order them everywhere they have stock, and complete the task on
/// the first queued order.
pub async fn handle_pending_match(
    state: &SharedState,
    client: &OvhClient,
    settings: &Settings,
    catalog: &Catalog,
    task: &SniperTask,
) -> Result<(), OvhError> {
    let fp = fingerprint(&task.bound_config);
    let current = find_matching_plans(catalog, &fp);

    let known: HashSet<&String> = task.known_plancodes.iter().chain(task.matched_api2.iter()).collect();
    let fresh: Vec<String> = current.into_iter().filter(|code| !known.contains(code)).collect();

    if fresh.is_empty() {
        state
            .logs
            .debug(SOURCE, format!("no new plan codes for {}", task.api1_plan_code))
            .await;
        return Ok(());
    }

    state
        .logs
        .info(
            SOURCE,
            format!(
                "{} new plan code(s) for {}: {}",
                fresh.len(),
                task.api1_plan_code,
                fresh.join(", ")
            ),
        )
        .await;

    update_task(state, &task.id, |t| {
        t.matched_api2.extend(fresh.iter().cloned());
    })
    .await;
    state.save_sniper_tasks().await;

    let total = task.matched_api2.len() + fresh.len();
    let message = format!(
        "New configuration match\nPlan: {}\nConfiguration: {} + {}\nNew plan codes: {}\nTotal: {total}",
        task.api1_plan_code,
        format_memory_display(&task.bound_config.memory),
        format_storage_display(&task.bound_config.storage),
        fresh.join(", "),
    );
    state.notifier.send(settings, &message).await;

    let mut queued_any = false;
    for code in &fresh {
        match check_and_queue(state, client, settings, catalog, code, task).await {
            Ok(queued) => queued_any |= queued,
            Err(e) => {
                state
                    .logs
                    .warning(SOURCE, format!("availability check failed for new code {code}: {e}"))
                    .await;
            }
        }
    }

    if queued_any {
        complete_task(state, settings, task, "new plan code ordered").await;
    }

    Ok(())
}

/// Matched pass: one-shot snipe across the known counterpart plan codes.
pub async fn handle_matched(
    state: &SharedState,
    client: &OvhClient,
    settings: &Settings,
    catalog: &Catalog,
    task: &SniperTask,
) -> Result<(), OvhError> {
    let mut queued_any = false;
    for code in &task.matched_api2 {
        match check_and_queue(state, client, settings, catalog, code, task).await {
            Ok(queued) => queued_any |= queued,
            Err(e) => {
                state
                    .logs
                    .warning(SOURCE, format!("availability check failed for {code}: {e}"))
                    .await;
            }
        }
    }

    if queued_any {
        complete_task(state, settings, task, "order queued").await;
    }

    Ok(())
}

async fn complete_task(state: &SharedState, settings: &Settings, task: &SniperTask, reason: &str) {
    update_task(state, &task.id, |t| t.match_status = MatchStatus::Completed).await;
    state.save_sniper_tasks().await;

    state
        .logs
        .info(SOURCE, format!("task for {} completed: {reason}", task.api1_plan_code))
        .await;

    let message = format!(
        "Config sniper task completed\nPlan: {}\nConfiguration: {} + {}\nOrders are in the purchase queue",
        task.api1_plan_code,
        format_memory_display(&task.bound_config.memory),
        format_storage_display(&task.bound_config.storage),
    );
    state.notifier.send(settings, &message).await;
}

/// Runs a single task's check immediately (the manual check endpoint).
/// Returns a short status message for the API response.
pub async fn run_task_check(state: &SharedState, task_id: &str) -> Result<String, OvhError> {
    let task = {
        let tasks = state.sniper_tasks.read().await;
        tasks.iter().find(|t| t.id == task_id).cloned()
    };
    let Some(task) = task else {
        return Err(OvhError::NotFound);
    };

    if task.match_status == MatchStatus::Completed {
        return Ok("task already completed, nothing to check".to_string());
    }

    let settings = state.settings.read().await.clone();
    let client = state.ovh(&settings)?;
    let catalog = client.eco_catalog(&settings.zone).await?;

    match task.match_status {
        MatchStatus::PendingMatch => handle_pending_match(state, &client, &settings, &catalog, &task).await?,
        MatchStatus::Matched => handle_matched(state, &client, &settings, &catalog, &task).await?,
        MatchStatus::Completed => unreachable!("handled above"),
    }

    update_task(state, task_id, |t| t.last_check = Some(Utc::now())).await;
    state.save_sniper_tasks().await;

    Ok("check finished".to_string())
}

async fn run_cycle(state: &SharedState) {
    let tasks = state.sniper_tasks.read().await.clone();
    let runnable: Vec<SniperTask> = tasks
        .into_iter()
        .filter(|t| t.enabled && t.match_status != MatchStatus::Completed)
        .collect();
    if runnable.is_empty() {
        return;
    }

    let settings = state.settings.read().await.clone();
    let client = match state.ovh(&settings) {
        Ok(client) => client,
        Err(e) => {
            state.logs.warning(SOURCE, format!("sniper pass skipped: {e}")).await;
            return;
        }
    };
    let catalog = match client.eco_catalog(&settings.zone).await {
        Ok(catalog) => catalog,
        Err(e) => {
            state.logs.warning(SOURCE, format!("catalog fetch failed: {e}")).await;
            return;
        }
    };

    for task in runnable {
        // the task may have been deleted while this pass was running
        let still_exists = state.sniper_tasks.read().await.iter().any(|t| t.id == task.id);
        if !still_exists {
            continue;
        }

        let result = match task.match_status {
            MatchStatus::PendingMatch => handle_pending_match(state, &client, &settings, &catalog, &task).await,
            MatchStatus::Matched => handle_matched(state, &client, &settings, &catalog, &task).await,
            MatchStatus::Completed => continue,
        };
        if let Err(e) = result {
            state
                .logs
                .error(SOURCE, format!("check failed for task {}: {e}", task.api1_plan_code))
                .await;
        }

        update_task(state, &task.id, |t| t.last_check = Some(Utc::now())).await;
    }

    state.save_sniper_tasks().await;
}

/// Config-sniper poll loop.
pub async fn sniper_loop(state: Arc<SharedState>) {
    state.logs.info(SOURCE, "config sniper loop started").await;
    loop {
        run_cycle(&state).await;
        tokio::time::sleep(Duration::from_secs(SNIPER_LOOP_SECS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phantom_ovh::AddonFamily;

    #[test]
    fn test_standardize_strips_series_suffix() {
        assert_eq!(standardize_config("ram-64g-ecc-2400-24sk50"), "ram-64g");
        assert_eq!(standardize_config("ram-64g-ecc-2400"), "ram-64g");
        assert_eq!(standardize_config("RAM-64G-NOECC-2133"), "ram-64g");
    }

    #[test]
    fn test_standardize_strips_storage_medium() {
        assert_eq!(standardize_config("softraid-2x450nvme-24rise012"), "softraid-2x450nvme");
        assert_eq!(standardize_config("softraid-2x480ssd-25sysle012"), "softraid-2x480ssd");
        assert_eq!(standardize_config("hybridsoftraid-2x6000sa-24ska01"), "hybridsoftraid-2x6000sa");
        assert_eq!(standardize_config("raid-2x1920-ssd"), "raid-2x1920");
    }

    #[test]
    fn test_standardize_strips_datacenter_suffix() {
        assert_eq!(standardize_config("ram-32g-rise"), "ram-32g");
        assert_eq!(standardize_config("bandwidth-500-gra"), "bandwidth-500");
    }

    #[test]
    fn test_standardize_equivalence_across_series() {
        // the same physical configuration advertised under two series
        let a = standardize_config("ram-64g-ecc-2400-24sk50");
        let b = standardize_config("ram-64g-ecc-2133-24rise01");
        assert_eq!(a, b);
    }

    #[test]
    fn test_standardize_empty() {
        assert_eq!(standardize_config(""), "");
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(format_memory_display("ram-64g-ecc-2400"), "64GB RAM");
        assert_eq!(format_storage_display("softraid-2x450nvme"), "2x 450GB NVME");
        assert_eq!(format_storage_display("softraid-4x2000hdd"), "4x 2000GB HDD");
        // unparsable codes fall through unchanged
        assert_eq!(format_memory_display("weird"), "weird");
        assert_eq!(format_storage_display("weird"), "weird");
    }

    fn catalog_plan(code: &str, memory: &[&str], storage: &[&str]) -> CatalogPlan {
        CatalogPlan {
            plan_code: code.to_string(),
            invoice_name: code.to_string(),
            display_name: None,
            description: String::new(),
            addon_families: vec![
                AddonFamily {
                    name: "memory".into(),
                    default: memory.first().map(|s| s.to_string()),
                    addons: memory.iter().map(|s| s.to_string()).collect(),
                },
                AddonFamily {
                    name: "storage".into(),
                    default: storage.first().map(|s| s.to_string()),
                    addons: storage.iter().map(|s| s.to_string()).collect(),
                },
            ],
        }
    }

    fn test_catalog() -> Catalog {
        Catalog {
            plans: vec![
                catalog_plan(
                    "24sk50",
                    &["ram-64g-ecc-2400-24sk50", "ram-32g-ecc-2400-24sk50"],
                    &["softraid-2x450nvme-24sk50"],
                ),
                catalog_plan(
                    "24rise01",
                    &["ram-64g-ecc-2133-24rise01"],
                    &["softraid-2x450nvme-24rise01", "softraid-2x4000sa-24rise01"],
                ),
                catalog_plan("25sysle012", &["ram-16g-noecc-2133-25sysle012"], &["softraid-2x480ssd-25sysle012"]),
            ],
        }
    }

    #[test]
    fn test_find_matching_plans() {
        let catalog = test_catalog();
        let fp = ("ram-64g".to_string(), "softraid-2x450nvme".to_string());
        let matched = find_matching_plans(&catalog, &fp);
        assert_eq!(matched, vec!["24sk50".to_string(), "24rise01".to_string()]);

        let fp = ("ram-16g".to_string(), "softraid-2x480ssd".to_string());
        assert_eq!(find_matching_plans(&catalog, &fp), vec!["25sysle012".to_string()]);

        let fp = ("ram-128g".to_string(), "softraid-2x450nvme".to_string());
        assert!(find_matching_plans(&catalog, &fp).is_empty());
    }

    #[test]
    fn test_resolve_bound_options_maps_to_target_series() {
        let catalog = test_catalog();
        let bound = BoundConfig {
            memory: "ram-64g-ecc-2400-24sk50".into(),
            storage: "softraid-2x450nvme-24sk50".into(),
        };
        let target = &catalog.plans[1]; // 24rise01
        let options = resolve_bound_options(target, &bound);
        assert_eq!(
            options,
            vec![
                "ram-64g-ecc-2133-24rise01".to_string(),
                "softraid-2x450nvme-24rise01".to_string(),
            ]
        );
    }

    #[test]
    fn test_resolve_bound_options_partial_when_no_match() {
        let catalog = test_catalog();
        let bound = BoundConfig {
            memory: "ram-64g-ecc-2400".into(),
            storage: "softraid-9x9000sa".into(),
        };
        let target = &catalog.plans[1];
        let options = resolve_bound_options(target, &bound);
        assert_eq!(options, vec!["ram-64g-ecc-2133-24rise01".to_string()]);
    }
}
