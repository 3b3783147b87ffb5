//! Event broker client
//!
//! The broker fans a rule's events out to subscribed URLs and drops a
//! subscription after repeated failed deliveries. Every request is signed
//! with the rule's signing secret.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::constants::SIGNATURE_HEADER;
use crate::error::{ListenError, Result};
use crate::protocol::{EventBatch, SubscribeRequest, SubscribeResponse};
use crate::signer::Signer;

/// Operations the subscription monitor needs from the delivery path
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Subscribe `url`, returning the broker-assigned id
    async fn subscribe(&self, url: &str) -> Result<String>;

    /// Whether the broker still holds subscription `id`
    async fn is_subscribed(&self, id: &str) -> Result<bool>;

    async fn unsubscribe(&self, id: &str) -> Result<()>;

    /// Send an empty event batch to `url`; true if the client answered 2xx
    async fn probe(&self, url: &str) -> Result<bool>;
}

/// Broker reached over HTTP at `{base_url}/@subscriptions/{bucket}/{rule}`
#[derive(Debug, Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
    bucket: String,
    rule: String,
    signer: Signer,
}

impl HttpBroker {
    pub fn new(base_url: &str, bucket: &str, rule: &str, signer: Signer) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            rule: rule.to_string(),
            signer,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/@subscriptions/{}/{}", self.base_url, self.bucket, self.rule)
    }

    fn subscription_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn subscribe(&self, url: &str) -> Result<String> {
        let body = serde_json::to_vec(&SubscribeRequest {
            url: url.to_string(),
        })?;

        let res = self
            .client
            .post(self.collection_url())
            .header(SIGNATURE_HEADER, self.signer.sign(&body))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ListenError::Broker(format!(
                "subscribe to {}/{} failed with {}",
                self.bucket, self.rule, status
            )));
        }

        let SubscribeResponse { id } = res.json().await?;
        Ok(id)
    }

    async fn is_subscribed(&self, id: &str) -> Result<bool> {
        let res = self
            .client
            .head(self.subscription_url(id))
            .header(SIGNATURE_HEADER, self.signer.sign(&[]))
            .send()
            .await?;
        debug!(
            "Received {} for {}/{}/{}",
            res.status().as_u16(),
            self.bucket,
            self.rule,
            id
        );
        Ok(res.status().is_success())
    }

    async fn unsubscribe(&self, id: &str) -> Result<()> {
        let res = self
            .client
            .delete(self.subscription_url(id))
            .header(SIGNATURE_HEADER, self.signer.sign(&[]))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ListenError::Broker(format!(
                "unsubscribe {}/{}/{} failed with {}",
                self.bucket, self.rule, id, status
            )));
        }
        Ok(())
    }

    async fn probe(&self, url: &str) -> Result<bool> {
        let body = serde_json::to_vec(&EventBatch::empty())?;
        let res = self
            .client
            .post(url)
            .header(SIGNATURE_HEADER, self.signer.sign(&body))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        debug!("Received {} for {}", res.status().as_u16(), url);
        Ok(res.status().is_success())
    }
}
