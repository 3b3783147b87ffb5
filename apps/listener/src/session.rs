//! One listen session: tunnel up, rule pointed at it, optional broker
//! subscription, then everything undone in reverse order on the way out.

use std::time::Duration;

use b2listen_common::{
    Broker, HttpBroker, ListenError, MonitorHandle, Result, RuleManager, RuleStore,
    SubscriptionMonitor, Tunnel, TunnelConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RuleMode;

/// How to undo what the session did to the bucket
#[derive(Debug, Clone, PartialEq)]
enum Restore {
    DeleteRule(String),
    RestoreUrl { name: String, url: String },
}

pub struct Session<S, B = HttpBroker> {
    rules: RuleManager<S>,
    tunnel: TunnelConfig,
    mode: RuleMode,
    monitor: Option<(B, Duration)>,
}

impl<S: RuleStore> Session<S, HttpBroker> {
    pub fn new(rules: RuleManager<S>, tunnel: TunnelConfig, mode: RuleMode) -> Self {
        Self {
            rules,
            tunnel,
            mode,
            monitor: None,
        }
    }
}

impl<S: RuleStore, B: Broker> Session<S, B> {
    /// Keep a broker subscription for the tunnel URL alive while the session runs
    pub fn with_monitor<B2: Broker>(self, broker: B2, poll_interval: Duration) -> Session<S, B2> {
        Session {
            rules: self.rules,
            tunnel: self.tunnel,
            mode: self.mode,
            monitor: Some((broker, poll_interval)),
        }
    }

    /// Name the rule will have on the bucket
    pub fn rule_name(&self) -> &str {
        match &self.mode {
            RuleMode::Temporary(_) => &self.tunnel.label,
            RuleMode::Existing(name) => name,
        }
    }

    /// Run until `shutdown` fires or the tunnel dies, then clean up
    ///
    /// Cleanup runs whatever happened before it; its failures are logged
    /// and never replace the session's own result.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Session {
            rules,
            tunnel: tunnel_config,
            mode,
            monitor,
        } = self;

        let mut tunnel = Tunnel::spawn(&tunnel_config, shutdown.child_token())?;

        let Some(url) = tunnel.url().await else {
            tunnel.wait().await;
            if shutdown.is_cancelled() {
                return Ok(());
            }
            return Err(ListenError::TunnelClosed);
        };

        let restore = match &mode {
            RuleMode::Temporary(spec) => rules
                .create_rule(&url, &tunnel_config.label, spec)
                .await
                .map(|()| Restore::DeleteRule(tunnel_config.label.clone())),
            RuleMode::Existing(name) => rules
                .modify_rule(&url, name)
                .await
                .map(|old| Restore::RestoreUrl {
                    name: name.clone(),
                    url: old,
                }),
        };
        let restore = match restore {
            Ok(restore) => restore,
            Err(e) => {
                // Nothing was written, only the tunnel needs stopping
                tunnel.stop();
                tunnel.wait().await;
                return Err(e);
            }
        };

        let (handle, result) = match monitor {
            Some((broker, interval)) => {
                match SubscriptionMonitor::start(broker, &url, interval, shutdown.child_token())
                    .await
                {
                    Ok(handle) => (Some(handle), Ok(())),
                    Err(e) => (None, Err(e)),
                }
            }
            None => (None, Ok(())),
        };

        if result.is_ok() {
            info!("Listening for events; press Ctrl-C to stop");
        } else {
            tunnel.stop();
        }
        tunnel.wait().await;

        teardown(&rules, handle, restore).await;
        result
    }
}

async fn teardown<S: RuleStore, B: Broker>(
    rules: &RuleManager<S>,
    monitor: Option<MonitorHandle<B>>,
    restore: Restore,
) {
    if let Some(monitor) = monitor {
        let state = monitor.stop().await;
        info!("Subscription ended in state {:?}", state);
    }

    let outcome = match &restore {
        Restore::DeleteRule(name) => rules.delete_rule(name).await,
        Restore::RestoreUrl { name, url } => rules.modify_rule(url, name).await.map(|_| ()),
    };
    if let Err(e) = outcome {
        warn!("Failed to clean up rule ({:?}): {}", restore, e);
    }
}
