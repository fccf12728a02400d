use std::convert::TryInto;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::budgeting::domain::additions::{BudgetAddition, NewBudgetAddition};
use crate::budgeting::domain::categories::{Category, CategoryChanges, NewCategory};
use crate::budgeting::domain::expenses::{Expense, NewExpense};
use crate::budgeting::domain::periods::Period;
use crate::budgeting::domain::snapshot::{
    self, AdditionTotals, PendingEntry, PeriodTotals,
};
use crate::budgeting::models;
use crate::database::PostgresConnection;

const ONE_ACTIVE_PERIOD_CONSTRAINT: &str = "period_one_active_per_user";
const CATEGORY_NAME_CONSTRAINT: &str = "category_name_unique_per_user";

const EXPENSE_COLUMNS: &str = r#"
    e.id, e.period_id, e.category_id, e.expense_name, e.amount, e.date,
    e.comments, e.budget_before, e.budget_after, e.snapshot_at,
    e.original_amount, e.created_at, e.updated_at,
    c.name AS category_name, c.icon AS category_icon, c.color AS category_color
"#;

#[derive(Debug, Error)]
pub enum CreatePeriodError {
    /// The user already has an `ACTIVE` period.
    #[error("an active period already exists")]
    ActivePeriodExists,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CreateCategoryError {
    /// The user already has a category with the given name.
    #[error("duplicate category name: {0}")]
    DuplicateName(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// The close-time values written onto a period row in a single atomic
/// update.
#[derive(Clone, Debug)]
pub struct PeriodClose {
    pub period_id: Uuid,
    pub closed_at: DateTime<Utc>,
    pub duration_days: i32,
    pub summary_json: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PeriodRecordCounts {
    pub budget_additions: i64,
    pub expenses: i64,
}

impl PeriodRecordCounts {
    pub fn is_empty(&self) -> bool {
        self.budget_additions == 0 && self.expenses == 0
    }
}

/// A partial update to an expense row. Absent fields are left untouched;
/// `comments: Some(None)` clears the column. The budget snapshot columns are
/// deliberately not representable here.
#[derive(Clone, Debug, Default)]
pub struct ExpenseUpdate {
    pub expense_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub original_amount: Option<Decimal>,
    pub date: Option<DateTime<Utc>>,
    pub comments: Option<Option<String>>,
}

pub type DynLedgerRepo = Arc<dyn LedgerRepo + Send + Sync>;

/// Persistence operations required by the budget accounting engine.
#[async_trait]
pub trait LedgerRepo {
    async fn find_active_period(&self, user_id: Uuid) -> anyhow::Result<Option<Period>>;

    /// Fetch a period only if it is owned by `user_id`. A period owned by
    /// another user is indistinguishable from a missing one.
    async fn get_period(&self, user_id: Uuid, period_id: Uuid) -> anyhow::Result<Option<Period>>;

    /// List the user's periods, active first, then most recently started.
    async fn list_periods(&self, user_id: Uuid) -> anyhow::Result<Vec<Period>>;

    async fn create_period(
        &self,
        user_id: Uuid,
        start_date: DateTime<Utc>,
    ) -> Result<Period, CreatePeriodError>;

    async fn delete_period(&self, period_id: Uuid) -> anyhow::Result<()>;

    async fn period_record_counts(&self, period_id: Uuid) -> anyhow::Result<PeriodRecordCounts>;

    /// Transition a period to `CLOSED`, stamping the close fields in one
    /// atomic write. Returns `None` if the period is missing or not
    /// `ACTIVE`, in which case nothing was modified.
    async fn close_period(&self, close: &PeriodClose) -> anyhow::Result<Option<Period>>;

    async fn list_budget_additions(&self, period_id: Uuid)
        -> anyhow::Result<Vec<BudgetAddition>>;

    async fn get_budget_addition(
        &self,
        user_id: Uuid,
        addition_id: Uuid,
    ) -> anyhow::Result<Option<BudgetAddition>>;

    /// Persist a budget addition, computing its budget snapshot from the
    /// period's current records. The snapshot computation and the insert are
    /// serialized per period so concurrent writers observe each other.
    async fn create_budget_addition(
        &self,
        addition: &NewBudgetAddition,
    ) -> anyhow::Result<BudgetAddition>;

    async fn delete_budget_addition(&self, addition_id: Uuid) -> anyhow::Result<()>;

    async fn list_expenses(&self, period_id: Uuid) -> anyhow::Result<Vec<Expense>>;

    async fn get_expense(
        &self,
        user_id: Uuid,
        expense_id: Uuid,
    ) -> anyhow::Result<Option<Expense>>;

    /// Persist an expense, computing its budget snapshot from the period's
    /// current records (serialized per period, as for budget additions).
    /// Also returns the period totals observed before the insert so callers
    /// can report them without a second read.
    async fn create_expense(
        &self,
        expense: &NewExpense,
    ) -> anyhow::Result<(Expense, PeriodTotals)>;

    /// Apply a partial update. Returns `None` if the expense does not exist.
    async fn update_expense(
        &self,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> anyhow::Result<Option<Expense>>;

    async fn delete_expense(&self, expense_id: Uuid) -> anyhow::Result<()>;

    /// List the user's categories with their expense counts, defaults first,
    /// then alphabetically.
    async fn list_categories(&self, user_id: Uuid) -> anyhow::Result<Vec<(Category, i64)>>;

    async fn get_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
    ) -> anyhow::Result<Option<Category>>;

    async fn create_category(
        &self,
        user_id: Uuid,
        category: &NewCategory,
    ) -> Result<Category, CreateCategoryError>;

    async fn update_category(
        &self,
        category_id: Uuid,
        changes: &CategoryChanges,
    ) -> Result<Option<Category>, CreateCategoryError>;

    async fn count_expenses_for_category(&self, category_id: Uuid) -> anyhow::Result<i64>;

    /// Delete a category that has no dependent expenses.
    async fn delete_category(&self, category_id: Uuid) -> anyhow::Result<()>;

    /// Repoint every dependent expense at `reassign_to` and delete the
    /// category, in a single transaction. Returns the number of reassigned
    /// expenses.
    async fn reassign_and_delete_category(
        &self,
        category_id: Uuid,
        reassign_to: Uuid,
    ) -> anyhow::Result<u64>;
}

/// Serialize snapshot computation per period.
///
/// Two concurrent inserts into the same period must not both read the same
/// "prior totals"; the later one has to observe the earlier one's row. An
/// advisory transaction lock keyed on the period ID provides that ordering
/// without locking unrelated periods.
async fn lock_period(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    period_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(period_id.to_string())
        .execute(tx)
        .await
        .context("Failed to acquire period advisory lock.")?;

    Ok(())
}

/// Compute the period's current totals inside an open transaction.
async fn period_totals(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    period_id: Uuid,
) -> anyhow::Result<PeriodTotals> {
    let addition_rows: Vec<(String, Decimal)> =
        sqlx::query_as("SELECT kind, amount FROM budget_addition WHERE period_id = $1")
            .bind(period_id)
            .fetch_all(&mut *tx)
            .await?;

    let additions = AdditionTotals::from_additions(
        addition_rows
            .into_iter()
            .map(|(kind, amount)| Ok((kind.parse()?, amount)))
            .collect::<anyhow::Result<Vec<_>>>()?,
    );

    let total_spent: Option<Decimal> =
        sqlx::query_scalar("SELECT SUM(amount) FROM expense WHERE period_id = $1")
            .bind(period_id)
            .fetch_one(&mut *tx)
            .await?;

    Ok(PeriodTotals::new(additions, total_spent.unwrap_or_default()))
}

fn is_constraint_violation(error: &sqlx::Error, constraint: &str) -> bool {
    error
        .as_database_error()
        .and_then(|db_error| db_error.constraint())
        == Some(constraint)
}

#[async_trait]
impl LedgerRepo for PostgresConnection {
    async fn find_active_period(&self, user_id: Uuid) -> anyhow::Result<Option<Period>> {
        let row: Option<models::PeriodRow> = sqlx::query_as(
            "SELECT * FROM period WHERE user_id = $1 AND status = 'ACTIVE'",
        )
        .bind(user_id)
        .fetch_optional(&**self)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn get_period(&self, user_id: Uuid, period_id: Uuid) -> anyhow::Result<Option<Period>> {
        let row: Option<models::PeriodRow> =
            sqlx::query_as("SELECT * FROM period WHERE id = $1 AND user_id = $2")
                .bind(period_id)
                .bind(user_id)
                .fetch_optional(&**self)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_periods(&self, user_id: Uuid) -> anyhow::Result<Vec<Period>> {
        let rows: Vec<models::PeriodRow> = sqlx::query_as(
            r#"
            SELECT * FROM period
            WHERE user_id = $1
            ORDER BY (status = 'ACTIVE') DESC, start_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&**self)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_period(
        &self,
        user_id: Uuid,
        start_date: DateTime<Utc>,
    ) -> Result<Period, CreatePeriodError> {
        let row: models::PeriodRow = sqlx::query_as(
            r#"
            INSERT INTO period (user_id, start_date)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(start_date)
        .fetch_one(&**self)
        .await
        .map_err(|error| {
            if is_constraint_violation(&error, ONE_ACTIVE_PERIOD_CONSTRAINT) {
                CreatePeriodError::ActivePeriodExists
            } else {
                CreatePeriodError::Other(error.into())
            }
        })?;

        info!(id = %row.id, %user_id, "Created new period.");

        Ok(row.try_into()?)
    }

    async fn delete_period(&self, period_id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM period WHERE id = $1")
            .bind(period_id)
            .execute(&**self)
            .await?;

        info!(%period_id, rows = result.rows_affected(), "Deleted period.");

        Ok(())
    }

    async fn period_record_counts(&self, period_id: Uuid) -> anyhow::Result<PeriodRecordCounts> {
        let (budget_additions, expenses): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM budget_addition WHERE period_id = $1),
                (SELECT COUNT(*) FROM expense WHERE period_id = $1)
            "#,
        )
        .bind(period_id)
        .fetch_one(&**self)
        .await?;

        Ok(PeriodRecordCounts {
            budget_additions,
            expenses,
        })
    }

    async fn close_period(&self, close: &PeriodClose) -> anyhow::Result<Option<Period>> {
        let row: Option<models::PeriodRow> = sqlx::query_as(
            r#"
            UPDATE period
            SET status = 'CLOSED',
                end_date = $2,
                closed_at = $2,
                duration_days = $3,
                summary_json = $4,
                updated_at = now()
            WHERE id = $1 AND status = 'ACTIVE'
            RETURNING *
            "#,
        )
        .bind(close.period_id)
        .bind(close.closed_at)
        .bind(close.duration_days)
        .bind(&close.summary_json)
        .fetch_optional(&**self)
        .await?;

        if row.is_some() {
            info!(period_id = %close.period_id, duration_days = close.duration_days, "Closed period.");
        }

        row.map(TryInto::try_into).transpose()
    }

    async fn list_budget_additions(
        &self,
        period_id: Uuid,
    ) -> anyhow::Result<Vec<BudgetAddition>> {
        let rows: Vec<models::BudgetAdditionRow> = sqlx::query_as(
            r#"
            SELECT * FROM budget_addition
            WHERE period_id = $1
            ORDER BY date DESC, created_at DESC
            "#,
        )
        .bind(period_id)
        .fetch_all(&**self)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_budget_addition(
        &self,
        user_id: Uuid,
        addition_id: Uuid,
    ) -> anyhow::Result<Option<BudgetAddition>> {
        let row: Option<models::BudgetAdditionRow> = sqlx::query_as(
            r#"
            SELECT b.* FROM budget_addition b
                JOIN period p ON p.id = b.period_id
            WHERE b.id = $1 AND p.user_id = $2
            "#,
        )
        .bind(addition_id)
        .bind(user_id)
        .fetch_optional(&**self)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn create_budget_addition(
        &self,
        addition: &NewBudgetAddition,
    ) -> anyhow::Result<BudgetAddition> {
        let mut tx = self.begin().await?;

        lock_period(&mut tx, addition.period_id()).await?;

        let totals = period_totals(&mut tx, addition.period_id()).await?;
        let snap = snapshot::snapshot(
            totals,
            PendingEntry::Addition(addition.kind(), addition.amount()),
        );

        let row: models::BudgetAdditionRow = sqlx::query_as(
            r#"
            INSERT INTO budget_addition
                (period_id, kind, amount, source, date, comments,
                 budget_before, budget_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(addition.period_id())
        .bind(addition.kind().to_string())
        .bind(addition.amount())
        .bind(addition.source())
        .bind(addition.date())
        .bind(addition.comments())
        .bind(snap.budget_before)
        .bind(snap.budget_after)
        .fetch_one(&mut tx)
        .await?;

        tx.commit().await?;

        info!(id = %row.id, period_id = %row.period_id, kind = %row.kind, "Persisted budget addition.");

        row.try_into()
    }

    async fn delete_budget_addition(&self, addition_id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM budget_addition WHERE id = $1")
            .bind(addition_id)
            .execute(&**self)
            .await?;

        info!(%addition_id, rows = result.rows_affected(), "Deleted budget addition.");

        Ok(())
    }

    async fn list_expenses(&self, period_id: Uuid) -> anyhow::Result<Vec<Expense>> {
        let query = format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expense e
                JOIN category c ON c.id = e.category_id
            WHERE e.period_id = $1
            ORDER BY e.date DESC, e.created_at DESC
            "#,
        );

        let rows: Vec<models::ExpenseRow> = sqlx::query_as(&query)
            .bind(period_id)
            .fetch_all(&**self)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_expense(
        &self,
        user_id: Uuid,
        expense_id: Uuid,
    ) -> anyhow::Result<Option<Expense>> {
        let query = format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expense e
                JOIN category c ON c.id = e.category_id
                JOIN period p ON p.id = e.period_id
            WHERE e.id = $1 AND p.user_id = $2
            "#,
        );

        let row: Option<models::ExpenseRow> = sqlx::query_as(&query)
            .bind(expense_id)
            .bind(user_id)
            .fetch_optional(&**self)
            .await?;

        Ok(row.map(Into::into))
    }

    async fn create_expense(
        &self,
        expense: &NewExpense,
    ) -> anyhow::Result<(Expense, PeriodTotals)> {
        let mut tx = self.begin().await?;

        lock_period(&mut tx, expense.period_id()).await?;

        let totals = period_totals(&mut tx, expense.period_id()).await?;
        let snap = snapshot::snapshot(totals, PendingEntry::Expense(expense.amount()));

        let inserted_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO expense
                (period_id, category_id, expense_name, amount, date, comments,
                 budget_before, budget_after, snapshot_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            RETURNING id
            "#,
        )
        .bind(expense.period_id())
        .bind(expense.category_id())
        .bind(expense.expense_name())
        .bind(expense.amount())
        .bind(expense.date())
        .bind(expense.comments())
        .bind(snap.budget_before)
        .bind(snap.budget_after)
        .fetch_one(&mut tx)
        .await?;

        let query = format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expense e
                JOIN category c ON c.id = e.category_id
            WHERE e.id = $1
            "#,
        );

        let row: models::ExpenseRow = sqlx::query_as(&query)
            .bind(inserted_id)
            .fetch_one(&mut tx)
            .await?;

        tx.commit().await?;

        info!(id = %inserted_id, period_id = %expense.period_id(), "Persisted expense.");

        Ok((row.into(), totals))
    }

    async fn update_expense(
        &self,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> anyhow::Result<Option<Expense>> {
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
            sqlx::QueryBuilder::new("UPDATE expense SET updated_at = now()");

        if let Some(name) = &update.expense_name {
            builder.push(", expense_name = ").push_bind(name);
        }
        if let Some(category_id) = update.category_id {
            builder.push(", category_id = ").push_bind(category_id);
        }
        if let Some(amount) = update.amount {
            builder.push(", amount = ").push_bind(amount);
        }
        if let Some(original_amount) = update.original_amount {
            builder.push(", original_amount = ").push_bind(original_amount);
        }
        if let Some(date) = update.date {
            builder.push(", date = ").push_bind(date);
        }
        if let Some(comments) = &update.comments {
            // Binding `None` clears the column.
            builder.push(", comments = ").push_bind(comments.clone());
        }

        builder
            .push(" WHERE id = ")
            .push_bind(expense_id)
            .push(" RETURNING id");

        let updated: Option<(Uuid,)> = builder
            .build_query_as()
            .fetch_optional(&**self)
            .await?;

        if updated.is_none() {
            debug!(%expense_id, "Expense to update does not exist.");

            return Ok(None);
        }

        let query = format!(
            r#"
            SELECT {EXPENSE_COLUMNS}
            FROM expense e
                JOIN category c ON c.id = e.category_id
            WHERE e.id = $1
            "#,
        );

        let row: models::ExpenseRow = sqlx::query_as(&query)
            .bind(expense_id)
            .fetch_one(&**self)
            .await?;

        info!(%expense_id, "Updated expense.");

        Ok(Some(row.into()))
    }

    async fn delete_expense(&self, expense_id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM expense WHERE id = $1")
            .bind(expense_id)
            .execute(&**self)
            .await?;

        info!(%expense_id, rows = result.rows_affected(), "Deleted expense.");

        Ok(())
    }

    async fn list_categories(&self, user_id: Uuid) -> anyhow::Result<Vec<(Category, i64)>> {
        let rows: Vec<models::CategoryWithCountRow> = sqlx::query_as(
            r#"
            SELECT c.*, COUNT(e.id) AS expense_count
            FROM category c
                LEFT JOIN expense e ON e.category_id = c.id
            WHERE c.user_id = $1
            GROUP BY c.id
            ORDER BY c.is_default DESC, c.name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&**self)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
    ) -> anyhow::Result<Option<Category>> {
        let row: Option<models::CategoryRow> =
            sqlx::query_as("SELECT * FROM category WHERE id = $1 AND user_id = $2")
                .bind(category_id)
                .bind(user_id)
                .fetch_optional(&**self)
                .await?;

        Ok(row.map(Into::into))
    }

    async fn create_category(
        &self,
        user_id: Uuid,
        category: &NewCategory,
    ) -> Result<Category, CreateCategoryError> {
        let row: models::CategoryRow = sqlx::query_as(
            r#"
            INSERT INTO category (user_id, name, icon, color, is_default)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(category.name())
        .bind(category.icon())
        .bind(category.color())
        .bind(category.is_default())
        .fetch_one(&**self)
        .await
        .map_err(|error| {
            if is_constraint_violation(&error, CATEGORY_NAME_CONSTRAINT) {
                CreateCategoryError::DuplicateName(category.name().to_owned())
            } else {
                CreateCategoryError::Other(error.into())
            }
        })?;

        info!(id = %row.id, %user_id, "Created category.");

        Ok(row.into())
    }

    async fn update_category(
        &self,
        category_id: Uuid,
        changes: &CategoryChanges,
    ) -> Result<Option<Category>, CreateCategoryError> {
        let mut builder: sqlx::QueryBuilder<'_, sqlx::Postgres> =
            sqlx::QueryBuilder::new("UPDATE category SET updated_at = now()");

        if let Some(name) = changes.name() {
            builder.push(", name = ").push_bind(name.to_owned());
        }
        if let Some(icon) = changes.icon() {
            builder.push(", icon = ").push_bind(icon.to_owned());
        }
        if let Some(color) = changes.color() {
            builder
                .push(", color = ")
                .push_bind(color.map(str::to_owned));
        }

        builder
            .push(" WHERE id = ")
            .push_bind(category_id)
            .push(" RETURNING *");

        let row: Option<models::CategoryRow> = builder
            .build_query_as()
            .fetch_optional(&**self)
            .await
            .map_err(|error| {
                if is_constraint_violation(&error, CATEGORY_NAME_CONSTRAINT) {
                    CreateCategoryError::DuplicateName(
                        changes.name().unwrap_or_default().to_owned(),
                    )
                } else {
                    CreateCategoryError::Other(error.into())
                }
            })?;

        Ok(row.map(Into::into))
    }

    async fn count_expenses_for_category(&self, category_id: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expense WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(&**self)
            .await?;

        Ok(count)
    }

    async fn delete_category(&self, category_id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM category WHERE id = $1")
            .bind(category_id)
            .execute(&**self)
            .await?;

        info!(%category_id, rows = result.rows_affected(), "Deleted category.");

        Ok(())
    }

    async fn reassign_and_delete_category(
        &self,
        category_id: Uuid,
        reassign_to: Uuid,
    ) -> anyhow::Result<u64> {
        let mut tx = self.begin().await?;

        let reassigned = sqlx::query(
            "UPDATE expense SET category_id = $2, updated_at = now() WHERE category_id = $1",
        )
        .bind(category_id)
        .bind(reassign_to)
        .execute(&mut tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM category WHERE id = $1")
            .bind(category_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;

        info!(%category_id, %reassign_to, reassigned, "Reassigned expenses and deleted category.");

        Ok(reassigned)
    }
}
