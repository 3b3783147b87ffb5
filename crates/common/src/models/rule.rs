use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_EVENT_TYPES;

/// An event notification rule on a B2 bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRule {
    /// Event type patterns, e.g. "b2:ObjectCreated:*"
    pub event_types: Vec<String>,

    pub is_enabled: bool,

    /// Unique within the bucket
    pub name: String,

    /// Only objects whose names start with this prefix trigger the rule
    #[serde(default)]
    pub object_name_prefix: String,

    pub target_configuration: TargetConfiguration,

    /// Set by B2 when it stops delivering to the target; never written back
    #[serde(default, skip_serializing)]
    pub is_suspended: Option<bool>,

    #[serde(default, skip_serializing)]
    pub suspension_reason: Option<String>,
}

impl NotificationRule {
    /// Create an enabled webhook rule
    pub fn new(name: impl Into<String>, url: impl Into<String>, spec: &RuleSpec) -> Self {
        Self {
            event_types: spec.event_types.clone(),
            is_enabled: true,
            name: name.into(),
            object_name_prefix: spec.object_name_prefix.clone(),
            target_configuration: TargetConfiguration {
                target_type: TargetType::Webhook,
                url: url.into(),
                custom_headers: spec.custom_headers.clone(),
                hmac_sha256_signing_secret: spec.signing_secret.clone(),
            },
            is_suspended: None,
            suspension_reason: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.target_configuration.url
    }
}

/// Where a rule delivers its events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfiguration {
    pub target_type: TargetType,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_headers: Option<Vec<CustomHeader>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_sha256_signing_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Webhook,
}

/// A header B2 adds to every webhook invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

impl CustomHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// User-supplied configuration for a temporary rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSpec {
    pub event_types: Vec<String>,
    pub object_name_prefix: String,
    pub custom_headers: Option<Vec<CustomHeader>>,
    pub signing_secret: Option<String>,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            event_types: DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect(),
            object_name_prefix: String::new(),
            custom_headers: None,
            signing_secret: None,
        }
    }
}
