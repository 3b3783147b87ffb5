use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::RuleStore;
use crate::constants::OVERLAPPING_RULE_MESSAGE;
use crate::error::{ListenError, Result};
use crate::models::NotificationRule;

/// Rule store held in memory, mimicking the B2 validations we depend on
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<NotificationRule>>,
    writes: AtomicUsize,
    check_overlap: bool,
    write_failure: Option<(u16, String)>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<NotificationRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
            ..Self::default()
        }
    }

    /// Reject writes where one rule's prefix overlaps another's, as B2 does
    pub fn reject_overlapping_prefixes(mut self) -> Self {
        self.check_overlap = true;
        self
    }

    /// Fail every write with the given status and message
    pub fn fail_writes_with(mut self, status: u16, message: &str) -> Self {
        self.write_failure = Some((status, message.to_string()));
        self
    }

    /// Snapshot of the current rules
    pub fn rules(&self) -> Vec<NotificationRule> {
        self.rules.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn overlapping(rules: &[NotificationRule]) -> bool {
        rules.iter().enumerate().any(|(i, a)| {
            rules[i + 1..].iter().any(|b| {
                a.object_name_prefix.starts_with(&b.object_name_prefix)
                    || b.object_name_prefix.starts_with(&a.object_name_prefix)
            })
        })
    }
}

fn rejected(status: u16, message: &str) -> ListenError {
    ListenError::Api {
        status,
        code: "bad_request".to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn get_rules(&self) -> Result<Vec<NotificationRule>> {
        Ok(self.rules())
    }

    async fn set_rules(&self, rules: &[NotificationRule]) -> Result<()> {
        if let Some((status, message)) = &self.write_failure {
            return Err(rejected(*status, message));
        }
        if self.check_overlap && Self::overlapping(rules) {
            return Err(rejected(
                400,
                &format!(
                    "{}: {}",
                    OVERLAPPING_RULE_MESSAGE,
                    rules
                        .iter()
                        .map(|r| r.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            ));
        }

        let mut current = self
            .rules
            .lock()
            .map_err(|_| ListenError::InvalidConfig("rule store poisoned".to_string()))?;
        *current = rules.to_vec();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
