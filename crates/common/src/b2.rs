//! Minimal B2 native API client
//!
//! Only the calls needed to find a bucket and read or replace its event
//! notification rules. The authorization token is treated as opaque.

use async_trait::async_trait;
use reqwest::{Client, Response, header::AUTHORIZATION};
use tracing::debug;

use crate::constants::{B2_API_VERSION, B2_AUTHORIZE_URL};
use crate::error::{ListenError, Result};
use crate::models::NotificationRule;
use crate::protocol::{
    ApiErrorBody, AuthorizeResponse, ListBucketsRequest, ListBucketsResponse,
    NotificationRulesResponse, SetNotificationRulesRequest,
};
use crate::rules::RuleStore;

/// An authorized B2 account
#[derive(Debug, Clone)]
pub struct B2Api {
    client: Client,
    key_id: String,
    auth: AuthorizeResponse,
}

impl B2Api {
    /// Authorize against the production B2 endpoint
    pub async fn authorize(key_id: &str, key: &str) -> Result<Self> {
        Self::authorize_at(B2_AUTHORIZE_URL, key_id, key).await
    }

    /// Authorize against an explicit `b2_authorize_account` URL
    pub async fn authorize_at(authorize_url: &str, key_id: &str, key: &str) -> Result<Self> {
        debug!("Application Key ID = {}", key_id);
        // The first 4 chars identify the cluster and are not secret
        debug!(
            "Application Key = {}{}",
            key.chars().take(4).collect::<String>(),
            "*".repeat(27)
        );

        let client = Client::new();
        let res = client
            .get(authorize_url)
            .basic_auth(key_id, Some(key))
            .send()
            .await?;
        let auth: AuthorizeResponse = check(res).await?.json().await?;

        Ok(Self {
            client,
            key_id: key_id.to_string(),
            auth,
        })
    }

    /// Fail if the application key is restricted to other buckets
    pub fn check_bucket_allowed(&self, bucket_name: &str) -> Result<()> {
        match self.auth.allowed_buckets() {
            None => {
                debug!("Authorized for access to all buckets");
                Ok(())
            }
            Some(buckets) => {
                let names: Vec<_> = buckets.iter().filter_map(|b| b.name.as_deref()).collect();
                debug!("Authorized for access to {}", names.join(", "));
                if names.contains(&bucket_name) {
                    Ok(())
                } else {
                    Err(ListenError::BucketNotAllowed {
                        key_id: self.key_id.clone(),
                        bucket: bucket_name.to_string(),
                    })
                }
            }
        }
    }

    /// Look a bucket up by name
    pub async fn bucket(&self, name: &str) -> Result<B2Bucket> {
        let res = self
            .client
            .post(self.endpoint("b2_list_buckets"))
            .header(AUTHORIZATION, &self.auth.authorization_token)
            .json(&ListBucketsRequest {
                account_id: self.auth.account_id.clone(),
                bucket_name: name.to_string(),
            })
            .send()
            .await?;
        let list: ListBucketsResponse = check(res).await?.json().await?;

        let info = list
            .buckets
            .into_iter()
            .find(|b| b.bucket_name == name)
            .ok_or_else(|| ListenError::BucketNotFound(name.to_string()))?;

        Ok(B2Bucket {
            client: self.client.clone(),
            api_url: self.auth.api_url().to_string(),
            token: self.auth.authorization_token.clone(),
            bucket_id: info.bucket_id,
            bucket_name: info.bucket_name,
        })
    }

    fn endpoint(&self, call: &str) -> String {
        endpoint(self.auth.api_url(), call)
    }
}

/// One bucket's notification rules
#[derive(Debug, Clone)]
pub struct B2Bucket {
    client: Client,
    api_url: String,
    token: String,
    bucket_id: String,
    bucket_name: String,
}

impl B2Bucket {
    pub fn id(&self) -> &str {
        &self.bucket_id
    }

    pub fn name(&self) -> &str {
        &self.bucket_name
    }
}

#[async_trait]
impl RuleStore for B2Bucket {
    async fn get_rules(&self) -> Result<Vec<NotificationRule>> {
        let res = self
            .client
            .get(endpoint(&self.api_url, "b2_get_bucket_notification_rules"))
            .header(AUTHORIZATION, &self.token)
            .query(&[("bucketId", &self.bucket_id)])
            .send()
            .await?;
        let body: NotificationRulesResponse = check(res).await?.json().await?;
        Ok(body.event_notification_rules)
    }

    async fn set_rules(&self, rules: &[NotificationRule]) -> Result<()> {
        let res = self
            .client
            .post(endpoint(&self.api_url, "b2_set_bucket_notification_rules"))
            .header(AUTHORIZATION, &self.token)
            .json(&SetNotificationRulesRequest {
                bucket_id: &self.bucket_id,
                event_notification_rules: rules,
            })
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }
}

fn endpoint(api_url: &str, call: &str) -> String {
    format!(
        "{}/b2api/{}/{}",
        api_url.trim_end_matches('/'),
        B2_API_VERSION,
        call
    )
}

/// Turn a non-2xx response into `ListenError::Api`
async fn check(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let text = res.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => ListenError::Api {
            status: body.status,
            code: body.code,
            message: body.message,
        },
        Err(_) => ListenError::Api {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_lowercase()
                .replace(' ', "_"),
            message: text,
        },
    })
}
