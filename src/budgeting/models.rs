//! Row models mapping the database schema onto the domain types.

use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::domain::additions::BudgetAddition;
use super::domain::categories::Category;
use super::domain::expenses::{CategoryRef, Expense};
use super::domain::periods::Period;

#[derive(Debug, sqlx::FromRow)]
pub struct PeriodRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: String,
    pub duration_days: Option<i32>,
    pub closed_at: Option<DateTime<Utc>>,
    pub summary_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PeriodRow> for Period {
    type Error = anyhow::Error;

    fn try_from(row: PeriodRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status.parse()?,
            duration_days: row.duration_days,
            closed_at: row.closed_at,
            summary_json: row.summary_json,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct BudgetAdditionRow {
    pub id: Uuid,
    pub period_id: Uuid,
    pub kind: String,
    pub amount: Decimal,
    pub source: String,
    pub date: DateTime<Utc>,
    pub comments: Option<String>,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<BudgetAdditionRow> for BudgetAddition {
    type Error = anyhow::Error;

    fn try_from(row: BudgetAdditionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            period_id: row.period_id,
            kind: row.kind.parse()?,
            amount: row.amount,
            source: row.source,
            date: row.date,
            comments: row.comments,
            budget_before: row.budget_before,
            budget_after: row.budget_after,
            created_at: row.created_at,
        })
    }
}

/// An expense row joined with the display fields of its category.
#[derive(Debug, sqlx::FromRow)]
pub struct ExpenseRow {
    pub id: Uuid,
    pub period_id: Uuid,
    pub category_id: Uuid,
    pub expense_name: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub comments: Option<String>,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub snapshot_at: DateTime<Utc>,
    pub original_amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category_name: String,
    pub category_icon: String,
    pub category_color: Option<String>,
}

impl From<ExpenseRow> for Expense {
    fn from(row: ExpenseRow) -> Self {
        Self {
            id: row.id,
            period_id: row.period_id,
            category: CategoryRef {
                id: row.category_id,
                name: row.category_name,
                icon: row.category_icon,
                color: row.category_color,
            },
            expense_name: row.expense_name,
            amount: row.amount,
            date: row.date,
            comments: row.comments,
            budget_before: row.budget_before,
            budget_after: row.budget_after,
            snapshot_at: row.snapshot_at,
            original_amount: row.original_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A category row joined with the number of expenses that reference it.
#[derive(Debug, sqlx::FromRow)]
pub struct CategoryWithCountRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expense_count: i64,
}

impl From<CategoryWithCountRow> for (Category, i64) {
    fn from(row: CategoryWithCountRow) -> Self {
        (
            Category {
                id: row.id,
                user_id: row.user_id,
                name: row.name,
                icon: row.icon,
                color: row.color,
                is_default: row.is_default,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            row.expense_count,
        )
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            icon: row.icon,
            color: row.color,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
