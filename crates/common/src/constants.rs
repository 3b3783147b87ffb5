/// Reserved prefix for every resource this tool creates (rule names, tunnel labels)
pub const RULE_NAME_PREFIX: &str = "--autocreated-b2listen-";

/// Required length of a webhook signing secret
pub const SIGNING_SECRET_LENGTH: usize = 32;

/// Header carrying the HMAC signature on broker and webhook requests
pub const SIGNATURE_HEADER: &str = "x-bz-event-notification-signature";

/// Version tag prepended to every signature
pub const SIGNATURE_VERSION: &str = "v1=";

/// Default event types for a temporary rule
pub const DEFAULT_EVENT_TYPES: [&str; 3] = [
    "b2:ObjectCreated:*",
    "b2:ObjectDeleted:*",
    "b2:HideMarkerCreated:*",
];

/// Message prefix B2 uses when two rules match overlapping object names
pub const OVERLAPPING_RULE_MESSAGE: &str =
    "More than one event notification rule has overlapping prefixes";

/// Default tunnel executable
pub const DEFAULT_CLOUDFLARED_COMMAND: &str = "cloudflared";

/// B2 authorization endpoint
pub const B2_AUTHORIZE_URL: &str = "https://api.backblazeb2.com/b2api/v3/b2_authorize_account";

/// B2 API version path segment
pub const B2_API_VERSION: &str = "v3";

/// Number of consecutive failed deliveries after which the broker drops a subscription
pub const BROKER_FAILED_DELIVERY_LIMIT: u32 = 5;

/// Subscription liveness polling interval (30 seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
