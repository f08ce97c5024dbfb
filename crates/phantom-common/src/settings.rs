use serde::{Deserialize, Serialize};

/// Mutable runtime configuration: OVH credentials, subsidiary zone and
/// Telegram notification target. Persisted as the `config` collection and
/// editable through the settings API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub app_key: String,
    pub app_secret: String,
    pub consumer_key: String,
    /// OVH API endpoint alias (`ovh-eu`, `ovh-ca`, `ovh-us`).
    pub endpoint: String,
    pub tg_token: String,
    pub tg_chat_id: String,
    /// IAM identity label; derived from the zone when left empty.
    pub iam: String,
    /// OVH subsidiary used for carts and catalog queries.
    pub zone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            consumer_key: String::new(),
            endpoint: "ovh-eu".to_string(),
            tg_token: String::new(),
            tg_chat_id: String::new(),
            iam: "go-ovh-ie".to_string(),
            zone: "IE".to_string(),
        }
    }
}

impl Settings {
    pub fn has_ovh_credentials(&self) -> bool {
        !self.app_key.is_empty() && !self.app_secret.is_empty() && !self.consumer_key.is_empty()
    }

    pub fn has_telegram(&self) -> bool {
        !self.tg_token.is_empty() && !self.tg_chat_id.is_empty()
    }

    /// Fills in the IAM label from the zone when the operator left it blank.
    pub fn derive_iam(&mut self) {
        if self.iam.is_empty() {
            self.iam = format!("go-ovh-{}", self.zone.to_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iam_derivation() {
        let mut settings = Settings {
            iam: String::new(),
            zone: "FR".to_string(),
            ..Default::default()
        };
        settings.derive_iam();
        assert_eq!(settings.iam, "go-ovh-fr");

        let mut explicit = Settings {
            iam: "custom".to_string(),
            ..Default::default()
        };
        explicit.derive_iam();
        assert_eq!(explicit.iam, "custom");
    }

    #[test]
    fn test_partial_document_loads_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"appKey":"k"}"#).unwrap();
        assert_eq!(settings.app_key, "k");
        assert_eq!(settings.endpoint, "ovh-eu");
        assert!(!settings.has_ovh_credentials());
    }
}
