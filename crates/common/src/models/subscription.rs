/// Where a broker subscription stands from the client's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No subscription held; also the terminal state after shutdown
    Unsubscribed,

    /// Broker confirmed the subscription on the last check
    Subscribed { id: String },

    /// Broker no longer knows `id` and the client has not answered a probe yet
    Lapsed { id: String },
}

impl SubscriptionState {
    /// Broker id, if one is held
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Unsubscribed => None,
            Self::Subscribed { id } | Self::Lapsed { id } => Some(id),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed { .. })
    }
}
