use std::collections::HashMap;

use super::{Account, AccountId, Cents, EntryStatus, LedgerEntry};

/// Rebuild every account's balance from the full ledger.
pub fn replay_all_balances(entries: &[LedgerEntry]) -> HashMap<AccountId, Cents> {
    let mut balances: HashMap<AccountId, Cents> = HashMap::new();
    for entry in entries.iter().filter(|e| e.status == EntryStatus::Completed) {
        *balances.entry(entry.account_id).or_insert(0) += entry.signed_amount();
    }
    balances
}

/// An account whose stored balance disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub account_name: String,
    pub stored: Cents,
    pub replayed: Cents,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub entry_count: usize,
    pub mismatches: Vec<BalanceMismatch>,
    pub negative_balances: Vec<String>,
    pub has_sequence_gaps: bool,
    /// Entries whose recorded balance_after does not follow from the previous entry
    pub broken_chains: Vec<AccountId>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.mismatches.is_empty()
            && self.negative_balances.is_empty()
            && !self.has_sequence_gaps
            && self.broken_chains.is_empty()
    }
}

/// Compare stored balances against a replay of the ledger.
/// `entries` must be in sequence order.
pub fn build_integrity_report(accounts: &[Account], entries: &[LedgerEntry]) -> IntegrityReport {
    let replayed = replay_all_balances(entries);

    let mismatches = accounts
        .iter()
        .filter_map(|account| {
            let expected = replayed.get(&account.id).copied().unwrap_or(0);
            (expected != account.balance_cents).then(|| BalanceMismatch {
                account_id: account.id,
                account_name: account.name.clone(),
                stored: account.balance_cents,
                replayed: expected,
            })
        })
        .collect();

    let negative_balances = accounts
        .iter()
        .filter(|a| a.balance_cents < 0)
        .map(|a| a.name.clone())
        .collect();

    let has_sequence_gaps = entries
        .windows(2)
        .any(|pair| pair[1].sequence != pair[0].sequence + 1)
        || entries.first().is_some_and(|e| e.sequence != 1);

    IntegrityReport {
        account_count: accounts.len(),
        entry_count: entries.len(),
        mismatches,
        negative_balances,
        has_sequence_gaps,
        broken_chains: find_broken_chains(entries),
    }
}

fn find_broken_chains(entries: &[LedgerEntry]) -> Vec<AccountId> {
    let mut running: HashMap<AccountId, Cents> = HashMap::new();
    let mut broken = Vec::new();

    for entry in entries.iter().filter(|e| e.status == EntryStatus::Completed) {
        let balance = running.entry(entry.account_id).or_insert(0);
        *balance += entry.signed_amount();
        if *balance != entry.balance_after && !broken.contains(&entry.account_id) {
            broken.push(entry.account_id);
        }
    }

    broken
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::{EntryKind, Role};

    fn entry(account: AccountId, kind: EntryKind, amount: Cents, seq: i64, after: Cents) -> LedgerEntry {
        let mut e = LedgerEntry::completed(account, account, amount, kind);
        e.sequence = seq;
        e.balance_after = after;
        e
    }

    #[test]
    fn test_replay_all_balances() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let entries = vec![
            entry(a, EntryKind::TopupCredit, 10000, 1, 10000),
            entry(b, EntryKind::AdminCredit, 2000, 2, 2000),
            entry(a, EntryKind::PurchaseDebit, 2500, 3, 7500),
        ];

        let balances = replay_all_balances(&entries);
        assert_eq!(balances.get(&a), Some(&7500));
        assert_eq!(balances.get(&b), Some(&2000));
        assert_eq!(balances.len(), 2);
    }

    #[test]
    fn test_replay_ignores_non_completed() {
        let a = Uuid::new_v4();
        let mut pending = entry(a, EntryKind::TopupCredit, 9000, 1, 9000);
        pending.status = EntryStatus::Pending;

        assert!(replay_all_balances(&[pending]).is_empty());
    }

    #[test]
    fn test_integrity_report_detects_mismatch() {
        let mut account = Account::new("ama".into(), Role::Customer);
        let entries = vec![entry(account.id, EntryKind::AdminCredit, 5000, 1, 5000)];

        account.balance_cents = 5000;
        let report = build_integrity_report(std::slice::from_ref(&account), &entries);
        assert!(report.is_healthy());

        account.balance_cents = 9000;
        let report = build_integrity_report(&[account], &entries);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].replayed, 5000);
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_integrity_report_detects_gaps_and_chains() {
        let a = Uuid::new_v4();
        let entries = vec![
            entry(a, EntryKind::AdminCredit, 5000, 1, 5000),
            entry(a, EntryKind::AdminDebit, 1000, 3, 3000),
        ];

        let report = build_integrity_report(&[], &entries);
        assert!(report.has_sequence_gaps);
        assert_eq!(report.broken_chains, vec![a]);
    }
}
