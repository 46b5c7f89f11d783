use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The subset of the Prometheus operator `AlertmanagerConfig` needed to check
/// receiver email configuration.
#[derive(
    CustomResource, Serialize, Deserialize, Default, Clone, Debug, JsonSchema, PartialEq, Eq,
)]
#[kube(
    group = "monitoring.coreos.com",
    version = "v1alpha1",
    kind = "AlertmanagerConfig",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerConfigSpec {
    #[serde(default)]
    pub receivers: Vec<Receiver>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receiver {
    pub name: String,

    #[serde(default)]
    pub email_configs: Vec<EmailConfig>,
}

#[derive(Serialize, Deserialize, Default, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    /// Comma separated list of recipient addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl AlertmanagerConfigSpec {
    /// Returns the recipients of the first email config of the receiver named
    /// `receiver_name`.
    ///
    /// Returns an empty string if there is no such receiver or it has no email
    /// config.
    pub fn email_recipients(&self, receiver_name: &str) -> String {
        self.receivers
            .iter()
            .find(|receiver| receiver.name == receiver_name)
            .and_then(|receiver| receiver.email_configs.first())
            .and_then(|email_config| email_config.to.clone())
            .unwrap_or_default()
    }
}
