mod rule;
mod subscription;

pub use rule::{CustomHeader, NotificationRule, RuleSpec, TargetConfiguration, TargetType};
pub use subscription::SubscriptionState;
