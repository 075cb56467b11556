use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SessionStatus::Pending),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A wallet top-up waiting on the payment provider.
///
/// The wallet is only credited when the provider confirms the session, and
/// the reference guarantees it is credited once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupSession {
    pub reference: String,
    pub account_id: AccountId,
    pub amount_cents: Cents,
    pub status: SessionStatus,
    pub payment_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl TopupSession {
    pub fn new(account_id: AccountId, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Top-up amount must be positive");
        Self {
            reference: new_reference(),
            account_id,
            amount_cents,
            status: SessionStatus::Pending,
            payment_url: None,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SessionStatus::Pending
    }
}

fn new_reference() -> String {
    format!("TOPUP-{}", Uuid::new_v4().simple()).to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_pending() {
        let session = TopupSession::new(Uuid::new_v4(), 2000);
        assert!(session.is_pending());
        assert!(session.reference.starts_with("TOPUP-"));
        assert_eq!(session.payment_url, None);
    }

    #[test]
    fn test_references_are_unique() {
        let account = Uuid::new_v4();
        let a = TopupSession::new(account, 100);
        let b = TopupSession::new(account, 100);
        assert_ne!(a.reference, b.reference);
    }
}
