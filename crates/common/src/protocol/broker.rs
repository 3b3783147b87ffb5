use serde::{Deserialize, Serialize};

/// Body of `POST /@subscriptions/{bucket}/{rule}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub url: String,
}

/// Broker reply to a subscribe call; `id` is opaque
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub id: String,
}

/// Webhook payload as delivered by B2
///
/// An empty batch is what the monitor sends to check the client is up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventBatch {
    pub event: Vec<serde_json::Value>,
}

impl EventBatch {
    /// Probe payload carrying no events
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_serialization() {
        let req = SubscribeRequest {
            url: "https://abc123.example.com".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"url":"https://abc123.example.com"}"#);
    }

    #[test]
    fn test_subscribe_response_ignores_extra_fields() {
        let res: SubscribeResponse =
            serde_json::from_str(r#"{"id":"4f1c","url":"https://x.example.com"}"#).unwrap();
        assert_eq!(res.id, "4f1c");
    }

    #[test]
    fn test_empty_batch() {
        let json = serde_json::to_string(&EventBatch::empty()).unwrap();
        assert_eq!(json, r#"{"event":[]}"#);
    }
}
