#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberStatus {
    PendingConfirmation,
}

impl SubscriberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingConfirmation => "pending_confirmation",
        }
    }
}
