use thiserror::Error;

/// Error types for a b2listen session
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("Bad custom header: {0}")]
    InvalidHeader(String),

    #[error("Signing secret must be 32 alphanumeric characters")]
    InvalidSigningSecret,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    MissingEnv(String),

    #[error(
        "Error creating event notification rule - an overlapping rule already exists.\n\n\
         Either another instance of this app is running, or the app was terminated and \
         failed to clean up. You can run the app again with the \"cleanup\" command and \
         your bucket name."
    )]
    LeakedRule,

    #[error("Error setting event notification rule: {0}")]
    RuleRejected(String),

    #[error("Cannot find rule \"{0}\"")]
    RuleNotFound(String),

    #[error("Bucket \"{0}\" does not exist")]
    BucketNotFound(String),

    #[error("Application key {key_id} is not authorized for {bucket}")]
    BucketNotAllowed { key_id: String, bucket: String },

    #[error("B2 API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to start tunnel: {0}")]
    TunnelSpawn(String),

    #[error("Tunnel exited before reporting a public URL")]
    TunnelClosed,

    #[error("Event broker error: {0}")]
    Broker(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results using ListenError
pub type Result<T> = std::result::Result<T, ListenError>;
