use serde::Serialize;
use shared::Credits;

use crate::domain::{Account, LedgerEntry};
use crate::errors::Result;
use crate::repository::LedgerStore;

/// A break in an account's entry chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainViolation {
    SequenceGap { expected: i64, found: i64 },
    BrokenLink { sequence: i64, expected_before: Credits, found_before: Credits },
    BadArithmetic { sequence: i64 },
    BalanceMismatch { stored: Credits, replayed: Credits },
    SequenceCursorMismatch { stored: i64, last_entry: i64 },
}

/// Replay `entries` (oldest first) from the opening balance and compare with the stored account
pub fn verify_chain(account: &Account, entries: &[LedgerEntry]) -> Vec<ChainViolation> {
    let mut violations = Vec::new();
    let mut running = account.initial_balance;
    let mut expected_sequence = 1;

    for entry in entries {
        if entry.sequence != expected_sequence {
            violations.push(ChainViolation::SequenceGap {
                expected: expected_sequence,
                found: entry.sequence,
            });
        }
        if entry.balance_before != running {
            violations.push(ChainViolation::BrokenLink {
                sequence: entry.sequence,
                expected_before: running,
                found_before: entry.balance_before,
            });
        }
        match entry.balance_before.checked_add(entry.amount) {
            Ok(after) if after == entry.balance_after => {}
            _ => violations.push(ChainViolation::BadArithmetic { sequence: entry.sequence }),
        }

        running = entry.balance_after;
        expected_sequence = entry.sequence + 1;
    }

    if running != account.balance {
        violations.push(ChainViolation::BalanceMismatch {
            stored: account.balance,
            replayed: running,
        });
    }
    let last_entry = entries.last().map_or(0, |entry| entry.sequence);
    if last_entry != account.last_sequence {
        violations.push(ChainViolation::SequenceCursorMismatch {
            stored: account.last_sequence,
            last_entry,
        });
    }

    violations
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub accounts_checked: usize,
    pub accounts_with_violations: usize,
    pub violations: usize,
}

/// Check every account's chain; violations are logged and counted, never repaired
pub async fn reconcile_accounts(store: &dyn LedgerStore) -> Result<ReconciliationReport> {
    let mut report = ReconciliationReport::default();

    for account_id in store.account_ids().await? {
        let Some(account) = store.find_account(&account_id).await? else {
            continue;
        };
        let entries = store.entry_chain(&account_id).await?;
        let violations = verify_chain(&account, &entries);
        report.accounts_checked += 1;

        if violations.is_empty() {
            continue;
        }
        report.accounts_with_violations += 1;
        report.violations += violations.len();
        metrics::counter!("ledger_chain_violations_total").increment(violations.len() as u64);
        for violation in &violations {
            tracing::error!(account_id = %account_id, violation = ?violation, "Ledger chain violation");
        }
    }

    tracing::info!(
        accounts = report.accounts_checked,
        broken = report.accounts_with_violations,
        "Ledger reconciliation complete"
    );
    Ok(report)
}
