use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type EntryId = Uuid;

/// Kinds of wallet mutation that may be recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Operator adds funds to a wallet
    AdminCredit,
    /// Operator removes funds from a wallet
    AdminDebit,
    /// Wallet pays for an order
    PurchaseDebit,
    /// Confirmed payment-provider top-up
    TopupCredit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::AdminCredit => "admin_credit",
            EntryKind::AdminDebit => "admin_debit",
            EntryKind::PurchaseDebit => "purchase_debit",
            EntryKind::TopupCredit => "topup_credit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "admin_credit" | "operator_credit" => Some(EntryKind::AdminCredit),
            "admin_debit" | "operator_debit" => Some(EntryKind::AdminDebit),
            "purchase_debit" => Some(EntryKind::PurchaseDebit),
            "topup_credit" => Some(EntryKind::TopupCredit),
            _ => None,
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, EntryKind::AdminCredit | EntryKind::TopupCredit)
    }

    /// Operator kinds may only be recorded by an admin actor; the others are
    /// self-service and must be recorded by the account owner.
    pub fn is_operator(&self) -> bool {
        matches!(self, EntryKind::AdminCredit | EntryKind::AdminDebit)
    }

    /// Signed effect of `amount` under this kind.
    pub fn signed(&self, amount_cents: Cents) -> Cents {
        if self.is_credit() {
            amount_cents
        } else {
            -amount_cents
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kinds accepted by a credit. Keeps debits from being recorded as credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditKind {
    Admin,
    Topup,
}

impl From<CreditKind> for EntryKind {
    fn from(kind: CreditKind) -> Self {
        match kind {
            CreditKind::Admin => EntryKind::AdminCredit,
            CreditKind::Topup => EntryKind::TopupCredit,
        }
    }
}

/// Kinds accepted by a debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitKind {
    Admin,
    Purchase,
}

impl From<DebitKind> for EntryKind {
    fn from(kind: DebitKind) -> Self {
        match kind {
            DebitKind::Admin => EntryKind::AdminDebit,
            DebitKind::Purchase => EntryKind::PurchaseDebit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Completed,
    Failed,
    Pending,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
            EntryStatus::Pending => "pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "completed" => Some(EntryStatus::Completed),
            "failed" => Some(EntryStatus::Failed),
            "pending" => Some(EntryStatus::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One wallet mutation. Entries are append-only; a mistaken credit is undone
/// by an operator debit, never by editing the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Monotonically increasing sequence number, assigned by the repository
    pub sequence: i64,
    /// Wallet whose balance changed
    pub account_id: AccountId,
    /// Account that performed the mutation (the owner or an admin)
    pub actor_id: AccountId,
    /// Always positive; direction comes from `kind`
    pub amount_cents: Cents,
    pub kind: EntryKind,
    pub status: EntryStatus,
    /// Wallet balance right after this entry was applied
    pub balance_after: Cents,
    pub description: Option<String>,
    /// Order id or top-up reference that caused the entry
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Build a completed entry. Sequence and balance_after are filled in when
    /// the entry is written together with the balance change.
    pub fn completed(
        account_id: AccountId,
        actor_id: AccountId,
        amount_cents: Cents,
        kind: EntryKind,
    ) -> Self {
        assert!(amount_cents > 0, "Ledger entry amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            actor_id,
            amount_cents,
            kind,
            status: EntryStatus::Completed,
            balance_after: 0,
            description: None,
            external_ref: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_external_ref(mut self, external_ref: impl Into<String>) -> Self {
        self.external_ref = Some(external_ref.into());
        self
    }

    /// True when someone other than the owner made this change.
    pub fn is_operator_initiated(&self) -> bool {
        self.actor_id != self.account_id
    }

    pub fn signed_amount(&self) -> Cents {
        self.kind.signed(self.amount_cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_kind_roundtrip() {
        for kind in [
            EntryKind::AdminCredit,
            EntryKind::AdminDebit,
            EntryKind::PurchaseDebit,
            EntryKind::TopupCredit,
        ] {
            assert_eq!(EntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(
            EntryKind::from_str("operator-credit"),
            Some(EntryKind::AdminCredit)
        );
    }

    #[test]
    fn test_typed_kinds_map_to_direction() {
        assert!(EntryKind::from(CreditKind::Admin).is_credit());
        assert!(EntryKind::from(CreditKind::Topup).is_credit());
        assert!(!EntryKind::from(DebitKind::Admin).is_credit());
        assert!(!EntryKind::from(DebitKind::Purchase).is_credit());
    }

    #[test]
    fn test_operator_kinds() {
        assert!(EntryKind::AdminCredit.is_operator());
        assert!(EntryKind::AdminDebit.is_operator());
        assert!(!EntryKind::TopupCredit.is_operator());
        assert!(!EntryKind::PurchaseDebit.is_operator());
    }

    #[test]
    fn test_signed_amount() {
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let credit = LedgerEntry::completed(owner, admin, 5000, EntryKind::AdminCredit);
        assert_eq!(credit.signed_amount(), 5000);
        assert!(credit.is_operator_initiated());

        let purchase = LedgerEntry::completed(owner, owner, 1200, EntryKind::PurchaseDebit);
        assert_eq!(purchase.signed_amount(), -1200);
        assert!(!purchase.is_operator_initiated());
        assert_eq!(purchase.status, EntryStatus::Completed);
    }

    #[test]
    #[should_panic(expected = "Ledger entry amount must be positive")]
    fn test_entry_requires_positive_amount() {
        let id = Uuid::new_v4();
        LedgerEntry::completed(id, id, 0, EntryKind::TopupCredit);
    }
}
