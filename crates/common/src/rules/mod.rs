//! Notification rule lifecycle
//!
//! The remote side only offers "read all rules" and "replace all rules", so
//! every operation here is a read-modify-write of the whole list. Nothing
//! guards against someone else editing the bucket between our read and our
//! write; a concurrent external change can be lost.

#[cfg(any(test, feature = "test-util"))]
mod memory;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::constants::{OVERLAPPING_RULE_MESSAGE, RULE_NAME_PREFIX};
use crate::error::{ListenError, Result};
use crate::models::{NotificationRule, RuleSpec};
use crate::utils::is_session_label;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryRuleStore;

/// Full-list access to one bucket's notification rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_rules(&self) -> Result<Vec<NotificationRule>>;

    /// Replace every rule on the bucket with `rules`
    async fn set_rules(&self, rules: &[NotificationRule]) -> Result<()>;
}

#[async_trait]
impl<T: RuleStore + ?Sized> RuleStore for std::sync::Arc<T> {
    async fn get_rules(&self) -> Result<Vec<NotificationRule>> {
        (**self).get_rules().await
    }

    async fn set_rules(&self, rules: &[NotificationRule]) -> Result<()> {
        (**self).set_rules(rules).await
    }
}

/// Creates, repoints and removes this session's rule on one bucket
pub struct RuleManager<S> {
    store: S,
}

impl<S: RuleStore> RuleManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append a new enabled webhook rule targeting `url`
    pub async fn create_rule(&self, url: &str, name: &str, spec: &RuleSpec) -> Result<()> {
        let new_rule = NotificationRule::new(name, url, spec);
        let old_rules = self.store.get_rules().await?;

        let mut new_rules = old_rules.clone();
        new_rules.push(new_rule.clone());

        info!("Creating rule with name \"{}\"", name);
        debug!(
            "Rule is {}",
            serde_json::to_string_pretty(&new_rule).unwrap_or_default()
        );

        match self.store.set_rules(&new_rules).await {
            Ok(()) => Ok(()),
            Err(ListenError::Api {
                status: 400,
                message,
                ..
            }) => {
                if message.starts_with(OVERLAPPING_RULE_MESSAGE)
                    && old_rules.iter().any(|r| is_session_label(&r.name))
                {
                    Err(ListenError::LeakedRule)
                } else {
                    Err(ListenError::RuleRejected(message))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Point the rule called `name` at `url`, returning the URL it had before
    pub async fn modify_rule(&self, url: &str, name: &str) -> Result<String> {
        let mut rules = self.store.get_rules().await?;
        let rule = rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| ListenError::RuleNotFound(name.to_string()))?;

        let old_url = std::mem::replace(&mut rule.target_configuration.url, url.to_string());
        let modified = rule.clone();

        self.store
            .set_rules(&rules)
            .await
            .map_err(|e| match e {
                ListenError::Api {
                    status: 400,
                    message,
                    ..
                } => ListenError::RuleRejected(message),
                e => e,
            })?;

        info!("Modified rule with name \"{}\"", name);
        info!("Old URL was {}; new URL is {}", old_url, url);
        debug!(
            "Rule is {}",
            serde_json::to_string_pretty(&modified).unwrap_or_default()
        );

        Ok(old_url)
    }

    /// Remove the rule called `name`; a missing rule only warrants a warning
    pub async fn delete_rule(&self, name: &str) -> Result<()> {
        info!("Deleting rule with name \"{}\"", name);

        let old_rules = self.store.get_rules().await?;
        let old_len = old_rules.len();
        let new_rules: Vec<_> = old_rules.into_iter().filter(|r| r.name != name).collect();

        if new_rules.len() == old_len {
            warn!("Could not find rule \"{}\" - did you delete it manually?", name);
            return Ok(());
        }

        self.store.set_rules(&new_rules).await
    }

    /// Remove every rule carrying the reserved prefix, whichever session made it
    ///
    /// Returns the names of the removed rules.
    pub async fn cleanup_rules(&self) -> Result<Vec<String>> {
        let old_rules = self.store.get_rules().await?;

        let (removed, kept): (Vec<_>, Vec<_>) = old_rules
            .into_iter()
            .partition(|r| is_session_label(&r.name));

        if removed.is_empty() {
            info!(
                "No rules to cleanup (prefix is \"{}\").",
                RULE_NAME_PREFIX
            );
            return Ok(Vec::new());
        }

        let names: Vec<String> = removed.into_iter().map(|r| r.name).collect();
        for name in &names {
            info!("Deleting rule \"{}\"", name);
        }

        self.store.set_rules(&kept).await?;
        Ok(names)
    }
}
