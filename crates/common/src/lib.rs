//! Core of b2listen: deliver B2 event notifications to a local service
//!
//! This crate provides the pieces a listen session is built from: the
//! cloudflared tunnel supervisor, the notification rule lifecycle, the
//! broker subscription monitor and the crash recovery sweep.

pub mod b2;
pub mod broker;
pub mod constants;
pub mod error;
pub mod models;
pub mod monitor;
pub mod protocol;
pub mod rules;
pub mod signer;
pub mod sweep;
pub mod tunnel;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use b2::{B2Api, B2Bucket};
pub use broker::{Broker, HttpBroker};
pub use error::{ListenError, Result};
pub use models::{CustomHeader, NotificationRule, RuleSpec, SubscriptionState};
pub use monitor::{MonitorHandle, SubscriptionMonitor};
pub use rules::{RuleManager, RuleStore};
#[cfg(any(test, feature = "test-util"))]
pub use rules::MemoryRuleStore;
pub use signer::{Signer, sign};
pub use sweep::{ProcessSweeper, SweepReport, is_orphan_tunnel, sweep};
pub use tunnel::{OutputParser, Tunnel, TunnelConfig, TunnelLine};
pub use utils::{SessionLabel, is_session_label, parse_custom_headers};
