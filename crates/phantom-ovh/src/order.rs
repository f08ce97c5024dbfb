use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::OvhClient;
use crate::error::OvhError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartCreated {
    pub cart_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub item_id: u64,
}

/// An eco addon compatible with a cart's base item.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoOption {
    #[serde(default)]
    pub plan_code: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub pricing_mode: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResult {
    #[serde(default)]
    pub order_id: Option<serde_json::Value>,
    #[serde(default)]
    pub url: Option<String>,
}

impl CheckoutResult {
    /// The order id rendered as text; the API reports it as a number.
    pub fn order_id_string(&self) -> String {
        match &self.order_id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => String::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EcoOptionPayload {
    pub item_id: u64,
    pub plan_code: String,
    pub duration: String,
    pub pricing_mode: String,
    pub quantity: u32,
}

impl OvhClient {
    pub async fn create_cart(&self, subsidiary: &str) -> Result<CartCreated, OvhError> {
        self.post("/order/cart", &json!({ "ovhSubsidiary": subsidiary })).await
    }

    /// Adds the base server to the cart: default pricing, one month, qty 1.
    pub async fn add_eco_item(&self, cart_id: &str, plan_code: &str) -> Result<CartItem, OvhError> {
        self.post(
            &format!("/order/cart/{cart_id}/eco"),
            &json!({
                "planCode": plan_code,
                "pricingMode": "default",
                "duration": "P1M",
                "quantity": 1,
            }),
        )
        .await
    }

    pub async fn set_item_configuration(
        &self,
        cart_id: &str,
        item_id: u64,
        label: &str,
        value: &str,
    ) -> Result<serde_json::Value, OvhError> {
        self.post(
            &format!("/order/cart/{cart_id}/item/{item_id}/configuration"),
            &json!({ "label": label, "value": value }),
        )
        .await
    }

    pub async fn eco_options(&self, cart_id: &str, plan_code: &str) -> Result<Vec<EcoOption>, OvhError> {
        self.get(&format!(
            "/order/cart/{cart_id}/eco/options?planCode={}",
            urlencoding::encode(plan_code)
        ))
        .await
    }

    pub async fn add_eco_option(&self, cart_id: &str, payload: &EcoOptionPayload) -> Result<serde_json::Value, OvhError> {
        self.post(&format!("/order/cart/{cart_id}/eco/options"), payload).await
    }

    /// Binds the cart to the authenticated account; required before checkout.
    pub async fn assign_cart(&self, cart_id: &str) -> Result<(), OvhError> {
        self.post_empty(&format!("/order/cart/{cart_id}/assign")).await
    }

    /// Checks out without auto-payment so the operator confirms the order,
    /// waiving the retraction period to keep the slot.
    pub async fn checkout(&self, cart_id: &str) -> Result<CheckoutResult, OvhError> {
        self.post(
            &format!("/order/cart/{cart_id}/checkout"),
            &json!({
                "autoPayWithPreferredPaymentMethod": false,
                "waiveRetractationPeriod": true,
            }),
        )
        .await
    }
}
