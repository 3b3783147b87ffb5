//! Subscription health monitor
//!
//! Keeps a broker subscription for the tunnel URL alive. On every tick the
//! monitor asks the broker whether the subscription still exists; if it
//! has lapsed, the client is probed directly and resubscribed once it
//! answers. A lapsed subscription with an unresponsive client is simply
//! rechecked on the next tick, forever.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::error::Result;
use crate::models::SubscriptionState;

/// Entry point for starting a monitor
pub struct SubscriptionMonitor;

impl SubscriptionMonitor {
    /// Subscribe `tunnel_url` and start polling every `interval`
    ///
    /// The initial subscribe happens before this returns; if it fails the
    /// error is returned and nothing is spawned.
    pub async fn start<B: Broker>(
        broker: B,
        tunnel_url: &str,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<MonitorHandle<B>> {
        info!(
            interval_secs = interval.as_secs_f64(),
            "Creating subscription for {}", tunnel_url
        );

        let broker = Arc::new(broker);
        let id = broker.subscribe(tunnel_url).await?;
        info!("Subscribed with id {}", id);

        let state = Arc::new(Mutex::new(SubscriptionState::Subscribed { id }));
        let task = tokio::spawn(poll_loop(
            broker.clone(),
            tunnel_url.to_string(),
            interval,
            state.clone(),
            cancel.clone(),
        ));

        Ok(MonitorHandle {
            broker,
            state,
            cancel,
            task,
        })
    }
}

/// A running monitor; call [`MonitorHandle::stop`] to unsubscribe
pub struct MonitorHandle<B> {
    broker: Arc<B>,
    state: Arc<Mutex<SubscriptionState>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<B: Broker> MonitorHandle<B> {
    pub fn state(&self) -> SubscriptionState {
        read_state(&self.state)
    }

    /// Stop polling and unsubscribe, even if the subscription had lapsed
    ///
    /// Unsubscribe failures are logged, not returned.
    pub async fn stop(self) -> SubscriptionState {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Subscription monitor task failed: {}", e);
        }

        if let Some(id) = read_state(&self.state).id() {
            match self.broker.unsubscribe(id).await {
                Ok(()) => info!("Unsubscribed {}", id),
                Err(e) => warn!("Failed to unsubscribe {}: {}", id, e),
            }
        }

        write_state(&self.state, SubscriptionState::Unsubscribed);
        info!("Stopped subscription monitor");
        SubscriptionState::Unsubscribed
    }
}

fn read_state(state: &Mutex<SubscriptionState>) -> SubscriptionState {
    match state.lock() {
        Ok(s) => s.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn write_state(state: &Mutex<SubscriptionState>, new_state: SubscriptionState) {
    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if *guard != new_state {
        debug!("Subscription state: {:?} -> {:?}", *guard, new_state);
    }
    *guard = new_state;
}

async fn poll_loop<B: Broker>(
    broker: Arc<B>,
    tunnel_url: String,
    interval: Duration,
    state: Arc<Mutex<SubscriptionState>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        // A check stuck on an unresponsive broker is dropped on cancel
        let current = read_state(&state);
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = check_once(broker.as_ref(), &tunnel_url, interval, current) => {
                write_state(&state, next);
            }
        }
    }
    debug!("Subscription monitor loop exiting");
}

/// One liveness check and, if needed, one recovery attempt
async fn check_once<B: Broker>(
    broker: &B,
    tunnel_url: &str,
    interval: Duration,
    current: SubscriptionState,
) -> SubscriptionState {
    let id = match current.id() {
        Some(id) => id.to_string(),
        None => return current,
    };

    match broker.is_subscribed(&id).await {
        Ok(true) => return SubscriptionState::Subscribed { id },
        Ok(false) => {}
        Err(e) => {
            // Broker unreachable: we can't tell, so leave the state alone
            warn!("Could not check subscription {}: {}", id, e);
            return current;
        }
    }

    let client_awake = match broker.probe(tunnel_url).await {
        Ok(ok) => ok,
        Err(e) => {
            debug!("Probe of {} failed: {}", tunnel_url, e);
            false
        }
    };

    if !client_awake {
        warn!(
            "Subscription is no longer active, and client is not responding. Will try again in {} seconds",
            interval.as_secs_f64()
        );
        return SubscriptionState::Lapsed { id };
    }

    info!("Subscription is no longer active, but client is awake. Resubscribing.");
    match broker.subscribe(tunnel_url).await {
        Ok(new_id) => {
            info!("Subscribed with id {}", new_id);
            SubscriptionState::Subscribed { id: new_id }
        }
        Err(e) => {
            warn!("Resubscribe failed, will retry: {}", e);
            SubscriptionState::Lapsed { id }
        }
    }
}
