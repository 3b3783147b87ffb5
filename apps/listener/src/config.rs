use std::time::Duration;

use b2listen_common::{
    ListenError, Result, RuleSpec,
    constants::{DEFAULT_CLOUDFLARED_COMMAND, DEFAULT_EVENT_TYPES, DEFAULT_POLL_INTERVAL_SECS},
    parse_custom_headers,
    validation::{validate_service_url, validate_signing_secret},
};
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand, ValueEnum};

pub const KEY_ID_VAR: &str = "B2_APPLICATION_KEY_ID";
pub const KEY_VAR: &str = "B2_APPLICATION_KEY";

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "b2listen")]
#[command(about = "Deliver Backblaze B2 event notifications to a local service", long_about = None)]
#[command(version)]
pub struct Args {
    /// Log level for b2listen itself
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub loglevel: LogLevel,

    /// Path to the cloudflared executable
    #[arg(long, default_value = DEFAULT_CLOUDFLARED_COMMAND, global = true)]
    pub cloudflared_command: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay event notifications for a bucket to a local URL
    Listen(ListenArgs),

    /// Remove rules and tunnel processes left behind by a crashed session
    Cleanup(CleanupArgs),

    /// Print the version and exit
    Version,
}

#[derive(ClapArgs, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["url", "run_server"])))]
pub struct ListenArgs {
    /// Bucket to listen to
    pub bucket_name: String,

    /// Local URL that receives the events, e.g. http://localhost:8080
    #[arg(long)]
    pub url: Option<String>,

    /// Run a receiver that logs every request instead of forwarding to --url
    #[arg(long)]
    pub run_server: bool,

    /// Repoint this existing rule instead of creating a temporary one
    #[arg(long)]
    pub rule_name: Option<String>,

    /// Event types for the temporary rule
    #[arg(long, num_args = 1..)]
    pub event_types: Option<Vec<String>>,

    /// Object name prefix for the temporary rule
    #[arg(long)]
    pub prefix: Option<String>,

    /// Custom headers for the temporary rule, as "Name: value"
    #[arg(long, num_args = 1..)]
    pub custom_headers: Option<Vec<String>>,

    /// Signing secret for the temporary rule (32 alphanumeric characters)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Log level passed to cloudflared
    #[arg(long, value_enum, default_value = "info")]
    pub cloudflared_loglevel: CloudflaredLogLevel,

    /// Event broker to keep a subscription with
    #[arg(long, env = "B2LISTEN_BROKER_URL")]
    pub broker_url: Option<String>,

    /// Secret used to sign broker requests (defaults to --signing-secret)
    #[arg(long, env = "B2LISTEN_BROKER_SECRET", hide_env_values = true)]
    pub broker_secret: Option<String>,

    /// Seconds between subscription liveness checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval: u64,
}

#[derive(ClapArgs, Debug)]
pub struct CleanupArgs {
    /// Bucket to clean up
    pub bucket_name: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Level name for our own crates; tracing has no level above error
    pub fn as_level(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }

    /// `EnvFilter` directives: the chosen level for b2listen, warnings and up for dependencies
    pub fn as_filter(&self) -> String {
        let own = self.as_level();
        let deps = match self {
            LogLevel::Error | LogLevel::Critical => "error",
            _ => "warn",
        };
        format!("{},b2listen={},b2listen_common={}", deps, own, own)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloudflaredLogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl CloudflaredLogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudflaredLogLevel::Debug => "debug",
            CloudflaredLogLevel::Info => "info",
            CloudflaredLogLevel::Warn => "warn",
            CloudflaredLogLevel::Error => "error",
            CloudflaredLogLevel::Fatal => "fatal",
        }
    }
}

/// Where the tunnel forwards to
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceTarget {
    Url(String),
    EmbeddedServer,
}

/// Which rule the session points at the tunnel
#[derive(Debug, Clone, PartialEq)]
pub enum RuleMode {
    /// Create a rule named after the session label, delete it on exit
    Temporary(RuleSpec),

    /// Repoint an existing rule, restore its URL on exit
    Existing(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub url: String,
    pub secret: String,
    pub poll_interval: Duration,
}

/// Validated configuration for a listen session
#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub bucket_name: String,
    pub service: ServiceTarget,
    pub rule: RuleMode,
    pub cloudflared_command: String,
    pub cloudflared_loglevel: String,
    pub broker: Option<BrokerConfig>,
}

impl ListenConfig {
    /// Check every option before anything external is touched
    pub fn from_args(cloudflared_command: String, args: ListenArgs) -> Result<Self> {
        let service = match (args.url, args.run_server) {
            (Some(url), false) => {
                validate_service_url(&url)?;
                ServiceTarget::Url(url)
            }
            (None, true) => ServiceTarget::EmbeddedServer,
            _ => {
                return Err(ListenError::InvalidConfig(
                    "Exactly one of --url or --run-server is required".to_string(),
                ));
            }
        };

        if let Some(secret) = &args.signing_secret {
            validate_signing_secret(secret)?;
        }

        let rule = match args.rule_name {
            Some(name) => {
                if args.event_types.is_some()
                    || args.prefix.is_some()
                    || args.custom_headers.is_some()
                    || args.signing_secret.is_some()
                {
                    return Err(ListenError::InvalidConfig(
                        "You cannot specify --rule-name with any of --event-types, --prefix, \
                         --custom-headers or --signing-secret"
                            .to_string(),
                    ));
                }
                RuleMode::Existing(name)
            }
            None => RuleMode::Temporary(RuleSpec {
                event_types: args
                    .event_types
                    .unwrap_or_else(|| DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect()),
                object_name_prefix: args.prefix.unwrap_or_default(),
                custom_headers: parse_custom_headers(
                    args.custom_headers.as_deref().unwrap_or_default(),
                )?,
                signing_secret: args.signing_secret.clone(),
            }),
        };

        let broker = match args.broker_url {
            Some(url) => {
                let secret = args.broker_secret.or(args.signing_secret).ok_or_else(|| {
                    ListenError::InvalidConfig(
                        "--broker-url requires --broker-secret or --signing-secret".to_string(),
                    )
                })?;
                validate_signing_secret(&secret)?;
                if args.poll_interval == 0 {
                    return Err(ListenError::InvalidConfig(
                        "--poll-interval must be at least 1 second".to_string(),
                    ));
                }
                Some(BrokerConfig {
                    url,
                    secret,
                    poll_interval: Duration::from_secs(args.poll_interval),
                })
            }
            None => None,
        };

        Ok(Self {
            bucket_name: args.bucket_name,
            service,
            rule,
            cloudflared_command,
            cloudflared_loglevel: args.cloudflared_loglevel.as_str().to_string(),
            broker,
        })
    }
}

/// B2 application key from the environment
#[derive(Clone)]
pub struct Credentials {
    pub key_id: String,
    pub key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read both variables through `lookup`, naming every one that is missing
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let key_id = lookup(KEY_ID_VAR).filter(|v| !v.is_empty());
        let key = lookup(KEY_VAR).filter(|v| !v.is_empty());

        match (key_id, key) {
            (Some(key_id), Some(key)) => Ok(Self { key_id, key }),
            (None, None) => Err(ListenError::MissingEnv(format!(
                "You must set the {} and {} environment variables",
                KEY_ID_VAR, KEY_VAR
            ))),
            (None, Some(_)) => Err(ListenError::MissingEnv(format!(
                "You must set the {} environment variable",
                KEY_ID_VAR
            ))),
            (Some(_), None) => Err(ListenError::MissingEnv(format!(
                "You must set the {} environment variable",
                KEY_VAR
            ))),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}
