use chrono::{DateTime, Local};

use crate::constants::RULE_NAME_PREFIX;

/// Name shared by a session's temporary rule and its tunnel process
///
/// Format: `--autocreated-b2listen-2020-03-20-14-28-23-382748--`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionLabel(String);

impl SessionLabel {
    /// Label for a session starting now
    pub fn generate() -> Self {
        Self::at(Local::now())
    }

    /// Label for a session starting at `time`
    pub fn at(time: DateTime<Local>) -> Self {
        Self(format!(
            "{}{}--",
            RULE_NAME_PREFIX,
            time.format("%Y-%m-%d-%H-%M-%S-%6f")
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `name` belongs to a resource created by this tool
pub fn is_session_label(name: &str) -> bool {
    name.starts_with(RULE_NAME_PREFIX)
}
