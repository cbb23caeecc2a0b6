use serde::Serialize;

use super::{Cents, User, UserId};

/// Outcome of checking a user's balance against their charge history.
///
/// Every charge ever committed is counted, including records the owner has
/// since deleted, so the opening balance minus everything charged must equal
/// the current balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub user_id: UserId,
    pub opening_balance_cents: Cents,
    pub charged_total_cents: Cents,
    pub expected_balance_cents: Cents,
    pub actual_balance_cents: Cents,
    pub record_count: i64,
    pub deleted_record_count: i64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.expected_balance_cents == self.actual_balance_cents && self.actual_balance_cents >= 0
    }

    pub fn discrepancy_cents(&self) -> Cents {
        self.actual_balance_cents - self.expected_balance_cents
    }
}

/// Charge totals for one user as aggregated by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChargeTotals {
    pub charged_total_cents: Cents,
    pub record_count: i64,
    pub deleted_record_count: i64,
}

pub fn reconcile(user: &User, totals: ChargeTotals) -> Reconciliation {
    let expected = user.opening_balance_cents - totals.charged_total_cents;
    Reconciliation {
        user_id: user.id,
        opening_balance_cents: user.opening_balance_cents,
        charged_total_cents: totals.charged_total_cents,
        expected_balance_cents: expected,
        actual_balance_cents: user.balance_cents,
        record_count: totals.record_count,
        deleted_record_count: totals.deleted_record_count,
    }
}
