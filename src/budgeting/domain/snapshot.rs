//! The budget snapshot calculator.
//!
//! Every expense and budget addition is stamped with the running budget
//! balance at the moment it was recorded (`budget_before`/`budget_after`).
//! The calculation is a pure reduction over the records persisted so far;
//! summation is commutative, so the stored order of siblings is irrelevant.
//! Once stamped, a snapshot is never recomputed.

use rust_decimal::Decimal;

use super::additions::AdditionKind;

/// Per-kind sums over a period's persisted budget additions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AdditionTotals {
    pub income: Decimal,
    pub adjustments: Decimal,
    pub deductions: Decimal,
}

impl AdditionTotals {
    pub fn from_additions<I>(additions: I) -> Self
    where
        I: IntoIterator<Item = (AdditionKind, Decimal)>,
    {
        let mut totals = Self::default();
        for (kind, amount) in additions {
            match kind {
                AdditionKind::Income => totals.income += amount,
                AdditionKind::Adjustment => totals.adjustments += amount,
                AdditionKind::Deduction => totals.deductions += amount,
            }
        }

        totals
    }

    /// Incomes and adjustments add to the budget, deductions subtract.
    pub fn total_budget(&self) -> Decimal {
        self.income + self.adjustments - self.deductions
    }
}

/// The budget state of a period at a point in time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PeriodTotals {
    pub total_budget: Decimal,
    pub total_spent: Decimal,
}

impl PeriodTotals {
    pub fn new(additions: AdditionTotals, total_spent: Decimal) -> Self {
        Self {
            total_budget: additions.total_budget(),
            total_spent,
        }
    }

    /// The running balance: what a newly recorded transaction sees as its
    /// `budget_before`.
    pub fn budget_before(&self) -> Decimal {
        self.total_budget - self.total_spent
    }
}

/// A transaction that is about to be recorded and needs a snapshot.
#[derive(Clone, Copy, Debug)]
pub enum PendingEntry {
    Expense(Decimal),
    Addition(AdditionKind, Decimal),
}

/// The frozen before/after pair stamped onto a transaction at creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BudgetSnapshot {
    pub budget_before: Decimal,
    pub budget_after: Decimal,
}

/// Compute the snapshot for a pending transaction given the period's totals
/// over everything persisted so far (excluding the pending transaction).
pub fn snapshot(totals: PeriodTotals, pending: PendingEntry) -> BudgetSnapshot {
    let budget_before = totals.budget_before();

    let budget_after = match pending {
        PendingEntry::Expense(amount) => budget_before - amount,
        PendingEntry::Addition(AdditionKind::Income, amount)
        | PendingEntry::Addition(AdditionKind::Adjustment, amount) => budget_before + amount,
        PendingEntry::Addition(AdditionKind::Deduction, amount) => budget_before - amount,
    };

    BudgetSnapshot {
        budget_before,
        budget_after,
    }
}

/// The share of the budget consumed, as a percentage rounded to two decimal
/// places. Returns zero for a non-positive budget so displays never divide
/// by zero.
pub fn percentage_used(total_spent: Decimal, total_budget: Decimal) -> Decimal {
    if total_budget <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (total_spent / total_budget * Decimal::from(100)).round_dp(2)
}
