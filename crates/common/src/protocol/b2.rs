use serde::{Deserialize, Serialize};

use crate::models::NotificationRule;

/// `b2_authorize_account` response (v3), reduced to what we use
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub account_id: String,
    pub authorization_token: String,
    pub api_info: ApiInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfo {
    pub storage_api: StorageApi,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageApi {
    pub api_url: String,
    #[serde(default)]
    pub allowed: Option<Allowed>,
}

/// Restrictions attached to the application key
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allowed {
    /// `None` means the key may access every bucket
    #[serde(default)]
    pub buckets: Option<Vec<AllowedBucket>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedBucket {
    #[serde(default)]
    pub name: Option<String>,
}

impl AuthorizeResponse {
    pub fn api_url(&self) -> &str {
        &self.api_info.storage_api.api_url
    }

    /// Buckets the key is restricted to, or `None` for an unrestricted key
    pub fn allowed_buckets(&self) -> Option<&[AllowedBucket]> {
        self.api_info
            .storage_api
            .allowed
            .as_ref()
            .and_then(|a| a.buckets.as_deref())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBucketsRequest {
    pub account_id: String,
    pub bucket_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBucketsResponse {
    pub buckets: Vec<BucketInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInfo {
    pub bucket_id: String,
    pub bucket_name: String,
}

/// Response of both the get and set notification rule calls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRulesResponse {
    pub event_notification_rules: Vec<NotificationRule>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetNotificationRulesRequest<'a> {
    pub bucket_id: &'a str,
    pub event_notification_rules: &'a [NotificationRule],
}

/// Error body returned by every B2 call
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub status: u16,
    pub code: String,
    pub message: String,
}
