use chrono::Utc;
use phantom_common::{PurchaseRecord, PurchaseStatus, QueueItem, Settings};
use phantom_ovh::order::EcoOptionPayload;
use phantom_ovh::{OvhClient, OvhError};

use crate::state::SharedState;

/// Result of a single purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Ordered { order_id: String, order_url: String },
    OutOfStock,
}

/// Region configuration value required by the cart, inferred from the
/// datacenter code prefix.
pub fn region_for_datacenter(datacenter: &str) -> Option<&'static str> {
    const EU: &[&str] = &["gra", "rbx", "sbg", "eri", "lim", "waw", "par", "fra", "lon"];
    const CANADA: &[&str] = &["bhs"];
    const US: &[&str] = &["vin", "hil"];
    const APAC: &[&str] = &["syd", "sgp"];

    let dc = datacenter.to_ascii_lowercase();
    if EU.iter().any(|p| dc.starts_with(p)) {
        Some("europe")
    } else if CANADA.iter().any(|p| dc.starts_with(p)) {
        Some("canada")
    } else if US.iter().any(|p| dc.starts_with(p)) {
        Some("usa")
    } else if APAC.iter().any(|p| dc.starts_with(p)) {
        Some("apac")
    } else {
        None
    }
}

/// Drops license, OS and control-panel addons from a requested option list;
/// only hardware options are ever attached to an order.
pub fn filter_hardware_options(options: &[String]) -> Vec<String> {
    const SKIP_TERMS: &[&str] = &[
        "windows-server",
        "sql-server",
        "cpanel-license",
        "plesk-",
        "-license-",
        "control-panel",
        "panel",
        "license",
        "security",
    ];

    options
        .iter()
        .filter(|option| !option.is_empty())
        .filter(|option| {
            let lower = option.to_ascii_lowercase();
            !lower.starts_with("os-") && !SKIP_TERMS.iter().any(|term| lower.contains(term))
        })
        .cloned()
        .collect()
}

/// Runs the full order flow for one queue item: availability pre-check,
/// cart assembly, hardware options, assignment and checkout.
pub async fn attempt_purchase(
    state: &SharedState,
    client: &OvhClient,
    settings: &Settings,
    item: &QueueItem,
) -> Result<PurchaseOutcome, OvhError> {
    let logs = &state.logs;

    logs.info(
        "purchase",
        format!(
            "starting order flow for {} in {} (options: {:?})",
            item.plan_code, item.datacenter, item.options
        ),
    )
    .await;

    let availabilities = client.datacenter_availabilities(&item.plan_code, &[]).await?;
    let in_stock = availabilities.iter().any(|entry| {
        entry
            .datacenters
            .iter()
            .any(|dc| dc.datacenter == item.datacenter && dc.is_available())
    });
    if !in_stock {
        logs.info(
            "purchase",
            format!("{} has no stock in {}", item.plan_code, item.datacenter),
        )
        .await;
        return Ok(PurchaseOutcome::OutOfStock);
    }

    let cart = client.create_cart(&settings.zone).await?;
    logs.info("purchase", format!("cart {} created for zone {}", cart.cart_id, settings.zone)).await;

    let cart_item = client.add_eco_item(&cart.cart_id, &item.plan_code).await?;
    logs.info(
        "purchase",
        format!("base item {} added to cart {}", cart_item.item_id, cart.cart_id),
    )
    .await;

    client
        .set_item_configuration(&cart.cart_id, cart_item.item_id, "dedicated_datacenter", &item.datacenter)
        .await?;
    client
        .set_item_configuration(&cart.cart_id, cart_item.item_id, "dedicated_os", "none_64.en")
        .await?;
    match region_for_datacenter(&item.datacenter) {
        Some(region) => {
            client
                .set_item_configuration(&cart.cart_id, cart_item.item_id, "region", region)
                .await?;
        }
        None => {
            logs.warning(
                "purchase",
                format!("no region mapping for datacenter {}, order may fail", item.datacenter),
            )
            .await;
        }
    }

    let wanted = filter_hardware_options(&item.options);
    if !wanted.is_empty() {
        match client.eco_options(&cart.cart_id, &item.plan_code).await {
            Ok(compatible) => {
                let mut added = 0;
                for option_code in &wanted {
                    let Some(found) = compatible
                        .iter()
                        .find(|opt| opt.plan_code.as_deref() == Some(option_code.as_str()))
                    else {
                        logs.warning(
                            "purchase",
                            format!("requested option {option_code} is not compatible, skipping"),
                        )
                        .await;
                        continue;
                    };

                    let payload = EcoOptionPayload {
                        item_id: cart_item.item_id,
                        plan_code: option_code.clone(),
                        duration: found.duration.clone().unwrap_or_else(|| "P1M".to_string()),
                        pricing_mode: found.pricing_mode.clone().unwrap_or_else(|| "default".to_string()),
                        quantity: 1,
                    };
                    match client.add_eco_option(&cart.cart_id, &payload).await {
                        Ok(_) => added += 1,
                        Err(e) => {
                            logs.warning("purchase", format!("failed to add option {option_code}: {e}")).await;
                        }
                    }
                }
                logs.info("purchase", format!("attached {added} hardware options")).await;
            }
            Err(e) => {
                logs.warning("purchase", format!("failed to list compatible options: {e}")).await;
            }
        }
    }

    client.assign_cart(&cart.cart_id).await?;
    let checkout = client.checkout(&cart.cart_id).await?;

    let order_id = checkout.order_id_string();
    let order_url = checkout.url.clone().unwrap_or_default();
    logs.info(
        "purchase",
        format!(
            "order placed for {} in {} (order {order_id})",
            item.plan_code, item.datacenter
        ),
    )
    .await;

    Ok(PurchaseOutcome::Ordered { order_id, order_url })
}

/// Upserts the per-task purchase record with a success and notifies.
pub async fn record_success(state: &SharedState, settings: &Settings, item: &QueueItem, order_id: &str, order_url: &str) {
    upsert_record(state, item, |record| {
        record.status = PurchaseStatus::Success;
        record.order_id = Some(order_id.to_string());
        record.order_url = Some(order_url.to_string());
        record.error_message = None;
    })
    .await;

    let mut message = format!(
        "Server order placed\nPlan: {}\nDatacenter: {}\nOrder id: {order_id}\nOrder url: {order_url}",
        item.plan_code, item.datacenter
    );
    if !item.options.is_empty() {
        message.push_str(&format!("\nOptions: {}", item.options.join(", ")));
    }
    message.push_str(&format!("\nTask: {}", item.id));

    if state.notifier.send(settings, &message).await {
        state.logs.info("purchase", format!("order notification sent for {}", item.id)).await;
    }
}

/// Upserts the per-task purchase record with a failure.
pub async fn record_failure(state: &SharedState, item: &QueueItem, error: &str) {
    upsert_record(state, item, |record| {
        record.status = PurchaseStatus::Failed;
        record.order_id = None;
        record.order_url = None;
        record.error_message = Some(error.to_string());
    })
    .await;
}

async fn upsert_record(state: &SharedState, item: &QueueItem, apply: impl FnOnce(&mut PurchaseRecord)) {
    {
        let mut history = state.history.write().await;
        let index = match history.iter().position(|h| h.task_id == item.id) {
            Some(index) => index,
            None => {
                history.push(PurchaseRecord::new(&item.id, &item.plan_code, &item.datacenter, item.options.clone()));
                history.len() - 1
            }
        };
        let record = &mut history[index];
        record.options = item.options.clone();
        record.purchase_time = Utc::now();
        record.attempt_count = item.retry_count;
        apply(record);
    }
    state.save_history().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_inference() {
        assert_eq!(region_for_datacenter("gra2"), Some("europe"));
        assert_eq!(region_for_datacenter("LON1"), Some("europe"));
        assert_eq!(region_for_datacenter("bhs8"), Some("canada"));
        assert_eq!(region_for_datacenter("vin"), Some("usa"));
        assert_eq!(region_for_datacenter("sgp"), Some("apac"));
        assert_eq!(region_for_datacenter("mum"), None);
    }

    #[test]
    fn test_option_filter_drops_licenses() {
        let options = vec![
            "ram-64g-ecc-2400".to_string(),
            "windows-server-2022-license".to_string(),
            "os-debian12".to_string(),
            "softraid-2x450nvme".to_string(),
            "cpanel-license-monthly".to_string(),
            String::new(),
        ];
        let filtered = filter_hardware_options(&options);
        assert_eq!(filtered, vec!["ram-64g-ecc-2400".to_string(), "softraid-2x450nvme".to_string()]);
    }

    #[tokio::test]
    async fn test_record_upsert_overwrites() {
        use phantom_store::MemoryStore;
        use std::sync::Arc;

        let state = crate::state::SharedState::load(Arc::new(MemoryStore::new()), reqwest::Client::new()).await;
        let mut item = QueueItem::new("24rise01".into(), "gra".into(), vec![], 60);
        item.retry_count = 1;

        record_failure(&state, &item, "no stock").await;
        {
            let history = state.history.read().await;
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].status, PurchaseStatus::Failed);
            assert_eq!(history[0].error_message.as_deref(), Some("no stock"));
        }

        item.retry_count = 2;
        let settings = Settings::default();
        record_success(&state, &settings, &item, "123", "https://ovh.example/order/123").await;
        let history = state.history.read().await;
        assert_eq!(history.len(), 1, "record is upserted, not appended");
        assert_eq!(history[0].status, PurchaseStatus::Success);
        assert_eq!(history[0].attempt_count, 2);
        assert!(history[0].error_message.is_none());
    }
}
