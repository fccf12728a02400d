//! The closing summary aggregator.
//!
//! When a period closes, everything it owns is reduced into a single
//! self-contained JSON document that is stored verbatim on the period row.
//! The stored string is the permanent historical record; it is never
//! regenerated, even if the aggregation logic changes later.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::additions::{AdditionKind, BudgetAddition};
use super::expenses::Expense;
use super::periods::{duration_days, Period};
use super::snapshot::{percentage_used, AdditionTotals};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosingSummary {
    pub period: SummaryWindow,
    pub budget: BudgetBreakdown,
    pub expenses: ExpenseBreakdown,
    pub result: SummaryResult,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryWindow {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_days: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetBreakdown {
    pub total_income: Decimal,
    pub total_adjustments: Decimal,
    pub total_deductions: Decimal,
    pub total_budget: Decimal,
    pub items: Vec<BudgetItem>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: AdditionKind,
    pub amount: Decimal,
    pub source: String,
    pub comments: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseBreakdown {
    pub total: Decimal,
    pub count: usize,
    pub average: Decimal,
    pub by_category: Vec<CategoryGroup>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryGroup {
    pub category: String,
    pub icon: String,
    pub total: Decimal,
    pub count: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub remaining_budget: Decimal,
    pub over_budget: bool,
    pub percentage_used: Decimal,
}

impl ClosingSummary {
    /// Reduce a period's records into its closing summary.
    ///
    /// # Arguments
    ///
    /// * `period` - The period being closed.
    /// * `additions` - Every budget addition the period owns.
    /// * `expenses` - Every expense the period owns.
    /// * `closed_at` - The close timestamp, which becomes the period's end.
    pub fn aggregate(
        period: &Period,
        additions: &[BudgetAddition],
        expenses: &[Expense],
        closed_at: DateTime<Utc>,
    ) -> Self {
        let totals = AdditionTotals::from_additions(
            additions.iter().map(|addition| (addition.kind, addition.amount)),
        );
        let total_budget = totals.total_budget();

        let total_expenses: Decimal = expenses.iter().map(|expense| expense.amount).sum();
        let remaining_budget = total_budget - total_expenses;

        let average = if expenses.is_empty() {
            Decimal::ZERO
        } else {
            (total_expenses / Decimal::from(expenses.len() as u64)).round_dp(2)
        };

        Self {
            period: SummaryWindow {
                start_date: period.start_date,
                end_date: closed_at,
                duration_days: duration_days(period.start_date, closed_at),
            },
            budget: BudgetBreakdown {
                total_income: totals.income,
                total_adjustments: totals.adjustments,
                total_deductions: totals.deductions,
                total_budget,
                items: additions
                    .iter()
                    .map(|addition| BudgetItem {
                        id: addition.id,
                        kind: addition.kind,
                        amount: addition.amount,
                        source: addition.source.clone(),
                        comments: addition.comments.clone(),
                        date: addition.date,
                    })
                    .collect(),
            },
            expenses: ExpenseBreakdown {
                total: total_expenses,
                count: expenses.len(),
                average,
                by_category: group_by_category(expenses),
            },
            result: SummaryResult {
                remaining_budget,
                over_budget: remaining_budget < Decimal::ZERO,
                percentage_used: percentage_used(total_expenses, total_budget),
            },
        }
    }
}

/// How much headroom an active period has left.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStatus {
    Safe,
    Caution,
    Warning,
    Danger,
    Over,
}

/// A live, non-persisted summary of a period's budget position.
///
/// Unlike [`ClosingSummary`], this is recomputed on every read and reflects
/// the current record set. For active periods the duration runs up to `now`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodOverview {
    pub total_income: Decimal,
    pub total_adjustments: Decimal,
    pub total_deductions: Decimal,
    pub total_budget: Decimal,
    pub total_expenses: Decimal,
    pub remaining_budget: Decimal,
    pub duration_days: i32,
    pub percentage_used: Decimal,
    pub budget_status: BudgetStatus,
}

impl PeriodOverview {
    pub fn compute(
        period: &Period,
        additions: &[BudgetAddition],
        expenses: &[Expense],
        now: DateTime<Utc>,
    ) -> Self {
        let totals = AdditionTotals::from_additions(
            additions.iter().map(|addition| (addition.kind, addition.amount)),
        );
        let total_budget = totals.total_budget();
        let total_expenses: Decimal = expenses.iter().map(|expense| expense.amount).sum();
        let remaining_budget = total_budget - total_expenses;

        let window_end = period.end_date.unwrap_or(now);

        Self {
            total_income: totals.income,
            total_adjustments: totals.adjustments,
            total_deductions: totals.deductions,
            total_budget,
            total_expenses,
            remaining_budget,
            duration_days: duration_days(period.start_date, window_end),
            percentage_used: percentage_used(total_expenses, total_budget),
            budget_status: budget_status(remaining_budget, total_budget),
        }
    }
}

fn budget_status(remaining: Decimal, total_budget: Decimal) -> BudgetStatus {
    if remaining < Decimal::ZERO {
        return BudgetStatus::Over;
    }
    if remaining == Decimal::ZERO {
        return BudgetStatus::Danger;
    }

    // remaining > 0 implies total_budget > 0, so the division is safe.
    let percentage_remaining = remaining / total_budget * Decimal::from(100);

    if percentage_remaining < Decimal::from(10) {
        BudgetStatus::Danger
    } else if percentage_remaining < Decimal::from(25) {
        BudgetStatus::Warning
    } else if percentage_remaining < Decimal::from(50) {
        BudgetStatus::Caution
    } else {
        BudgetStatus::Safe
    }
}

/// Group expenses by category name, ordered by descending total. Ties keep
/// the order in which the categories first appeared.
fn group_by_category(expenses: &[Expense]) -> Vec<CategoryGroup> {
    let mut groups: Vec<CategoryGroup> = Vec::new();
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();

    for expense in expenses {
        match index_by_name.get(expense.category.name.as_str()) {
            Some(&index) => {
                groups[index].total += expense.amount;
                groups[index].count += 1;
            }
            None => {
                index_by_name.insert(&expense.category.name, groups.len());
                groups.push(CategoryGroup {
                    category: expense.category.name.clone(),
                    icon: expense.category.icon.clone(),
                    total: expense.amount,
                    count: 1,
                });
            }
        }
    }

    // Vec::sort_by is stable, preserving first-appearance order on ties.
    groups.sort_by(|a, b| b.total.cmp(&a.total));

    groups
}
