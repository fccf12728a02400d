use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use semval::ValidatedFrom;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::repos::{CreateCategoryError, CreatePeriodError, DynLedgerRepo, ExpenseUpdate};

use super::domain::additions::{
    BudgetAddition, NewBudgetAddition, NewBudgetAdditionData, NewBudgetAdditionInvalidity,
};
use super::domain::categories::{
    Category, CategoryChanges, CategoryChangesData, CategoryInvalidity, NewCategory,
    NewCategoryData,
};
use super::domain::expenses::{
    Expense, ExpenseChanges, ExpenseChangesData, NewExpense, NewExpenseData, NewExpenseInvalidity,
};
use super::domain::periods::{duration_days, Period};
use super::domain::snapshot::percentage_used;
use super::domain::summary::{ClosingSummary, PeriodOverview};

/// A period together with everything needed to display it.
#[derive(Debug)]
pub struct PeriodDetail {
    pub period: Period,
    pub additions: Vec<BudgetAddition>,
    pub expenses: Vec<Expense>,
    pub overview: PeriodOverview,
}

/// The ephemeral feedback block returned when an expense is recorded. It
/// reflects the period's state including the new expense and is never
/// persisted.
#[derive(Clone, Copy, Debug)]
pub struct SpendingSnapshot {
    pub total_budget: Decimal,
    pub total_spent: Decimal,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub percentage_used: Decimal,
}

/// The outcome of a category deletion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeletedCategory {
    /// The category had no expenses and was deleted directly.
    Deleted,
    /// The category's expenses were moved to another category first. The
    /// count is the number of reassigned expenses.
    Reassigned(u64),
}

#[derive(Debug, Error)]
pub enum ClosePeriodError {
    /// The period does not exist, is not owned by the caller, or is already
    /// closed. The cases are deliberately indistinguishable.
    #[error("period not found or already closed")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeletePeriodError {
    #[error("period not found")]
    NotFound,

    /// The period still owns records and cannot be deleted.
    #[error("period is not empty")]
    NotEmpty {
        budget_additions: i64,
        expenses: i64,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum RecordsQueryError {
    /// Either the named period does not belong to the caller, or no period
    /// was named and the caller has no active one.
    #[error("period not found")]
    PeriodNotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CreateAdditionError {
    #[error("invalid budget addition: {0:?}")]
    InvalidAddition(semval::context::Context<NewBudgetAdditionInvalidity>),

    #[error("period not found")]
    PeriodNotFound,

    /// Budget additions may only be recorded in an active period.
    #[error("period is closed")]
    PeriodClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeleteAdditionError {
    #[error("budget addition not found")]
    NotFound,

    #[error("period is closed")]
    PeriodClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CreateExpenseError {
    #[error("invalid expense: {0:?}")]
    InvalidExpense(semval::context::Context<NewExpenseInvalidity>),

    #[error("category not found")]
    CategoryNotFound,

    #[error("period not found")]
    PeriodNotFound,

    /// The period is closed and the expense's date falls outside the
    /// period's window, so the backfill exception does not apply.
    #[error("period is closed")]
    PeriodClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum UpdateExpenseError {
    #[error("invalid expense changes: {0:?}")]
    InvalidChanges(semval::context::Context<NewExpenseInvalidity>),

    /// The changes reference a category that does not belong to the caller.
    #[error("unknown category")]
    UnknownCategory,

    #[error("expense not found")]
    NotFound,

    #[error("period is closed")]
    PeriodClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeleteExpenseError {
    #[error("expense not found")]
    NotFound,

    #[error("period is closed")]
    PeriodClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum NewCategoryError {
    #[error("invalid category: {0:?}")]
    InvalidCategory(semval::context::Context<CategoryInvalidity>),

    #[error("duplicate category name: {0}")]
    DuplicateName(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum UpdateCategoryError {
    #[error("invalid category changes: {0:?}")]
    InvalidChanges(semval::context::Context<CategoryInvalidity>),

    #[error("duplicate category name: {0}")]
    DuplicateName(String),

    #[error("category not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeleteCategoryError {
    #[error("category not found")]
    NotFound,

    /// The category has expenses, so a reassignment target is required.
    #[error("category has {expense_count} expenses and needs a reassignment target")]
    ReassignmentRequired { expense_count: i64 },

    /// The reassignment target does not exist or is not owned by the caller.
    #[error("reassignment target not found")]
    ReassignmentTargetMissing,

    /// The reassignment target is the category being deleted.
    #[error("cannot reassign a category's expenses to itself")]
    ReassignmentTargetSame,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A service object providing the budget accounting operations.
///
/// Every operation takes the calling user's id and treats records owned by
/// other users as nonexistent.
#[derive(Clone)]
pub struct BudgetService {
    ledger: DynLedgerRepo,
}

impl BudgetService {
    pub fn new(ledger: DynLedgerRepo) -> Self {
        Self { ledger }
    }

    /// Start a new period for the user.
    ///
    /// A user may only have one active period; starting a second one fails
    /// with [`CreatePeriodError::ActivePeriodExists`].
    pub async fn create_period(
        &self,
        user_id: Uuid,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<Period, CreatePeriodError> {
        self.ledger
            .create_period(user_id, start_date.unwrap_or_else(Utc::now))
            .await
    }

    pub async fn list_periods(&self, user_id: Uuid) -> anyhow::Result<Vec<PeriodDetail>> {
        let periods = self.ledger.list_periods(user_id).await?;

        let mut listings = Vec::with_capacity(periods.len());
        for period in periods {
            listings.push(self.detail_for(period).await?);
        }

        Ok(listings)
    }

    /// The user's active period with its current overview, if one exists.
    pub async fn current_period(&self, user_id: Uuid) -> anyhow::Result<Option<PeriodDetail>> {
        match self.ledger.find_active_period(user_id).await? {
            Some(period) => Ok(Some(self.detail_for(period).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_period(
        &self,
        user_id: Uuid,
        period_id: Uuid,
    ) -> anyhow::Result<Option<PeriodDetail>> {
        match self.ledger.get_period(user_id, period_id).await? {
            Some(period) => Ok(Some(self.detail_for(period).await?)),
            None => Ok(None),
        }
    }

    /// Delete a period that owns no records. A period with budget additions
    /// or expenses is never deleted, regardless of its status.
    pub async fn delete_period(
        &self,
        user_id: Uuid,
        period_id: Uuid,
    ) -> Result<(), DeletePeriodError> {
        let period = self
            .ledger
            .get_period(user_id, period_id)
            .await?
            .ok_or(DeletePeriodError::NotFound)?;

        let counts = self.ledger.period_record_counts(period.id).await?;
        if !counts.is_empty() {
            return Err(DeletePeriodError::NotEmpty {
                budget_additions: counts.budget_additions,
                expenses: counts.expenses,
            });
        }

        self.ledger.delete_period(period.id).await?;

        Ok(())
    }

    /// Close an active period.
    ///
    /// The closing summary is aggregated from the period's records and
    /// written together with the status transition in one atomic update. The
    /// stored summary is permanent; it is never regenerated.
    pub async fn close_period(
        &self,
        user_id: Uuid,
        period_id: Uuid,
    ) -> Result<(Period, ClosingSummary), ClosePeriodError> {
        let period = self
            .ledger
            .get_period(user_id, period_id)
            .await?
            .ok_or(ClosePeriodError::NotFound)?;

        if !period.is_active() {
            return Err(ClosePeriodError::NotFound);
        }

        let additions = self.ledger.list_budget_additions(period.id).await?;
        let expenses = self.ledger.list_expenses(period.id).await?;

        let closed_at = Utc::now();
        let summary = ClosingSummary::aggregate(&period, &additions, &expenses, closed_at);
        let summary_json =
            serde_json::to_string(&summary).context("Failed to serialize closing summary.")?;

        let close = crate::repos::PeriodClose {
            period_id: period.id,
            closed_at,
            duration_days: duration_days(period.start_date, closed_at),
            summary_json,
        };

        // A concurrent close can win the race between the read above and
        // this write; the atomic status check makes the loser a no-op.
        let closed = self
            .ledger
            .close_period(&close)
            .await?
            .ok_or(ClosePeriodError::NotFound)?;

        info!(period_id = %closed.id, %user_id, "Closed budget period.");

        Ok((closed, summary))
    }

    pub async fn list_budget_additions(
        &self,
        user_id: Uuid,
        period_id: Option<Uuid>,
    ) -> Result<Vec<BudgetAddition>, RecordsQueryError> {
        let period = self.resolve_period(user_id, period_id).await?;

        Ok(self.ledger.list_budget_additions(period.id).await?)
    }

    pub async fn get_budget_addition(
        &self,
        user_id: Uuid,
        addition_id: Uuid,
    ) -> anyhow::Result<Option<BudgetAddition>> {
        self.ledger.get_budget_addition(user_id, addition_id).await
    }

    /// Record a budget addition in an active period.
    ///
    /// The addition is stamped with the budget balance before and after it,
    /// computed from the period's records at the moment of insertion. The
    /// stamped values are immutable from then on.
    pub async fn create_budget_addition(
        &self,
        user_id: Uuid,
        data: NewBudgetAdditionData,
    ) -> Result<BudgetAddition, CreateAdditionError> {
        let addition = match NewBudgetAddition::validated_from(data) {
            Ok(addition) => addition,
            Err((_, context)) => return Err(CreateAdditionError::InvalidAddition(context)),
        };

        let period = self
            .ledger
            .get_period(user_id, addition.period_id())
            .await?
            .ok_or(CreateAdditionError::PeriodNotFound)?;

        if !period.is_active() {
            return Err(CreateAdditionError::PeriodClosed);
        }

        Ok(self.ledger.create_budget_addition(&addition).await?)
    }

    /// Delete a budget addition from an active period.
    ///
    /// Sibling records keep the snapshots they were stamped with; they are
    /// historical values, not live balances.
    pub async fn delete_budget_addition(
        &self,
        user_id: Uuid,
        addition_id: Uuid,
    ) -> Result<(), DeleteAdditionError> {
        let addition = self
            .ledger
            .get_budget_addition(user_id, addition_id)
            .await?
            .ok_or(DeleteAdditionError::NotFound)?;

        let period = self
            .ledger
            .get_period(user_id, addition.period_id)
            .await?
            .ok_or(DeleteAdditionError::NotFound)?;

        if !period.is_active() {
            return Err(DeleteAdditionError::PeriodClosed);
        }

        self.ledger.delete_budget_addition(addition.id).await?;

        Ok(())
    }

    pub async fn list_expenses(
        &self,
        user_id: Uuid,
        period_id: Option<Uuid>,
    ) -> Result<Vec<Expense>, RecordsQueryError> {
        let period = self.resolve_period(user_id, period_id).await?;

        Ok(self.ledger.list_expenses(period.id).await?)
    }

    pub async fn get_expense(
        &self,
        user_id: Uuid,
        expense_id: Uuid,
    ) -> anyhow::Result<Option<Expense>> {
        self.ledger.get_expense(user_id, expense_id).await
    }

    /// Record an expense.
    ///
    /// The owning period must be active, with one exception: a closed period
    /// accepts expenses whose date falls within its window, so late-arriving
    /// receipts can be backfilled. The frozen closing summary is not updated
    /// by a backfilled expense.
    ///
    /// Returns the created expense plus a feedback block describing the
    /// period's budget position including the new expense.
    pub async fn create_expense(
        &self,
        user_id: Uuid,
        data: NewExpenseData,
    ) -> Result<(Expense, SpendingSnapshot), CreateExpenseError> {
        let expense = match NewExpense::validated_from(data) {
            Ok(expense) => expense,
            Err((_, context)) => return Err(CreateExpenseError::InvalidExpense(context)),
        };

        self.ledger
            .get_category(user_id, expense.category_id())
            .await?
            .ok_or(CreateExpenseError::CategoryNotFound)?;

        let period = self
            .ledger
            .get_period(user_id, expense.period_id())
            .await?
            .ok_or(CreateExpenseError::PeriodNotFound)?;

        if !period.accepts_expense_dated(expense.date()) {
            return Err(CreateExpenseError::PeriodClosed);
        }

        let (created, totals) = self.ledger.create_expense(&expense).await?;

        let total_spent = totals.total_spent + created.amount;
        let feedback = SpendingSnapshot {
            total_budget: totals.total_budget,
            total_spent,
            budget_before: created.budget_before,
            budget_after: created.budget_after,
            percentage_used: percentage_used(total_spent, totals.total_budget),
        };

        Ok((created, feedback))
    }

    /// Apply changes to an expense in an active period.
    ///
    /// The first time the amount is changed, the pre-change value is stored
    /// in `original_amount`; later edits leave it alone. The stored budget
    /// snapshot is never touched.
    pub async fn update_expense(
        &self,
        user_id: Uuid,
        expense_id: Uuid,
        data: ExpenseChangesData,
    ) -> Result<Expense, UpdateExpenseError> {
        let changes = match ExpenseChanges::validated_from(data) {
            Ok(changes) => changes,
            Err((_, context)) => return Err(UpdateExpenseError::InvalidChanges(context)),
        };

        let expense = self
            .ledger
            .get_expense(user_id, expense_id)
            .await?
            .ok_or(UpdateExpenseError::NotFound)?;

        let period = self
            .ledger
            .get_period(user_id, expense.period_id)
            .await?
            .ok_or(UpdateExpenseError::NotFound)?;

        if !period.is_active() {
            return Err(UpdateExpenseError::PeriodClosed);
        }

        if let Some(category_id) = changes.category_id() {
            self.ledger
                .get_category(user_id, category_id)
                .await?
                .ok_or(UpdateExpenseError::UnknownCategory)?;
        }

        let mut update = ExpenseUpdate {
            expense_name: changes.expense_name().map(str::to_owned),
            category_id: changes.category_id(),
            date: changes.date(),
            comments: changes
                .comments()
                .map(|comments| comments.map(str::to_owned)),
            ..Default::default()
        };

        if let Some(amount) = changes.amount() {
            if amount != expense.amount {
                update.amount = Some(amount);
                if expense.original_amount.is_none() {
                    update.original_amount = Some(expense.amount);
                }
            }
        }

        self.ledger
            .update_expense(expense.id, &update)
            .await?
            .ok_or(UpdateExpenseError::NotFound)
    }

    pub async fn delete_expense(
        &self,
        user_id: Uuid,
        expense_id: Uuid,
    ) -> Result<(), DeleteExpenseError> {
        let expense = self
            .ledger
            .get_expense(user_id, expense_id)
            .await?
            .ok_or(DeleteExpenseError::NotFound)?;

        let period = self
            .ledger
            .get_period(user_id, expense.period_id)
            .await?
            .ok_or(DeleteExpenseError::NotFound)?;

        if !period.is_active() {
            return Err(DeleteExpenseError::PeriodClosed);
        }

        self.ledger.delete_expense(expense.id).await?;

        Ok(())
    }

    /// The user's categories with their expense counts.
    pub async fn list_categories(&self, user_id: Uuid) -> anyhow::Result<Vec<(Category, i64)>> {
        self.ledger.list_categories(user_id).await
    }

    pub async fn get_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
    ) -> anyhow::Result<Option<Category>> {
        self.ledger.get_category(user_id, category_id).await
    }

    pub async fn create_category(
        &self,
        user_id: Uuid,
        data: NewCategoryData,
    ) -> Result<Category, NewCategoryError> {
        let category = match NewCategory::validated_from(data) {
            Ok(category) => category,
            Err((_, context)) => return Err(NewCategoryError::InvalidCategory(context)),
        };

        match self.ledger.create_category(user_id, &category).await {
            Ok(created) => Ok(created),
            Err(CreateCategoryError::DuplicateName(name)) => {
                Err(NewCategoryError::DuplicateName(name))
            }
            Err(CreateCategoryError::Other(error)) => Err(NewCategoryError::Other(error)),
        }
    }

    pub async fn update_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        data: CategoryChangesData,
    ) -> Result<Category, UpdateCategoryError> {
        let changes = match CategoryChanges::validated_from(data) {
            Ok(changes) => changes,
            Err((_, context)) => return Err(UpdateCategoryError::InvalidChanges(context)),
        };

        self.ledger
            .get_category(user_id, category_id)
            .await?
            .ok_or(UpdateCategoryError::NotFound)?;

        match self.ledger.update_category(category_id, &changes).await {
            Ok(Some(updated)) => Ok(updated),
            Ok(None) => Err(UpdateCategoryError::NotFound),
            Err(CreateCategoryError::DuplicateName(name)) => {
                Err(UpdateCategoryError::DuplicateName(name))
            }
            Err(CreateCategoryError::Other(error)) => Err(UpdateCategoryError::Other(error)),
        }
    }

    /// Delete a category.
    ///
    /// A category with expenses cannot simply vanish; the caller must name a
    /// different category of theirs to take over the expenses. Reassignment
    /// and deletion happen in one transaction, so no expense is ever left
    /// pointing at a deleted category.
    pub async fn delete_category(
        &self,
        user_id: Uuid,
        category_id: Uuid,
        reassign_to: Option<Uuid>,
    ) -> Result<DeletedCategory, DeleteCategoryError> {
        let category = self
            .ledger
            .get_category(user_id, category_id)
            .await?
            .ok_or(DeleteCategoryError::NotFound)?;

        let expense_count = self.ledger.count_expenses_for_category(category.id).await?;
        if expense_count == 0 {
            self.ledger.delete_category(category.id).await?;

            return Ok(DeletedCategory::Deleted);
        }

        let reassign_to =
            reassign_to.ok_or(DeleteCategoryError::ReassignmentRequired { expense_count })?;

        if reassign_to == category.id {
            return Err(DeleteCategoryError::ReassignmentTargetSame);
        }

        self.ledger
            .get_category(user_id, reassign_to)
            .await?
            .ok_or(DeleteCategoryError::ReassignmentTargetMissing)?;

        let reassigned = self
            .ledger
            .reassign_and_delete_category(category.id, reassign_to)
            .await?;

        Ok(DeletedCategory::Reassigned(reassigned))
    }

    async fn detail_for(&self, period: Period) -> anyhow::Result<PeriodDetail> {
        let additions = self.ledger.list_budget_additions(period.id).await?;
        let expenses = self.ledger.list_expenses(period.id).await?;
        let overview = PeriodOverview::compute(&period, &additions, &expenses, Utc::now());

        Ok(PeriodDetail {
            period,
            additions,
            expenses,
            overview,
        })
    }

    async fn resolve_period(
        &self,
        user_id: Uuid,
        period_id: Option<Uuid>,
    ) -> Result<Period, RecordsQueryError> {
        let period = match period_id {
            Some(period_id) => self.ledger.get_period(user_id, period_id).await?,
            None => self.ledger.find_active_period(user_id).await?,
        };

        period.ok_or(RecordsQueryError::PeriodNotFound)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::budgeting::domain::additions::AdditionKind;
    use crate::budgeting::domain::expenses::CategoryRef;
    use crate::budgeting::domain::periods::PeriodStatus;
    use crate::budgeting::domain::snapshot::{
        self, AdditionTotals, PendingEntry, PeriodTotals,
    };
    use crate::repos::{LedgerRepo, PeriodClose, PeriodRecordCounts};

    use super::*;

    #[derive(Default)]
    struct LedgerState {
        periods: Vec<Period>,
        additions: Vec<BudgetAddition>,
        expenses: Vec<Expense>,
        categories: Vec<Category>,
    }

    /// An in-memory stand-in for the Postgres repository. Snapshot stamping
    /// follows the same read-compute-insert sequence; the mutex plays the
    /// role of the per-period serialization.
    #[derive(Clone, Default)]
    struct InMemoryLedger {
        state: Arc<Mutex<LedgerState>>,
    }

    impl InMemoryLedger {
        fn totals_for(state: &LedgerState, period_id: Uuid) -> PeriodTotals {
            let additions = AdditionTotals::from_additions(
                state
                    .additions
                    .iter()
                    .filter(|addition| addition.period_id == period_id)
                    .map(|addition| (addition.kind, addition.amount)),
            );
            let spent = state
                .expenses
                .iter()
                .filter(|expense| expense.period_id == period_id)
                .map(|expense| expense.amount)
                .sum();

            PeriodTotals::new(additions, spent)
        }
    }

    #[async_trait]
    impl LedgerRepo for InMemoryLedger {
        async fn find_active_period(&self, user_id: Uuid) -> anyhow::Result<Option<Period>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .periods
                .iter()
                .find(|period| period.user_id == user_id && period.is_active())
                .cloned())
        }

        async fn get_period(
            &self,
            user_id: Uuid,
            period_id: Uuid,
        ) -> anyhow::Result<Option<Period>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .periods
                .iter()
                .find(|period| period.id == period_id && period.user_id == user_id)
                .cloned())
        }

        async fn list_periods(&self, user_id: Uuid) -> anyhow::Result<Vec<Period>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .periods
                .iter()
                .filter(|period| period.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn create_period(
            &self,
            user_id: Uuid,
            start_date: DateTime<Utc>,
        ) -> Result<Period, CreatePeriodError> {
            let mut state = self.state.lock().unwrap();

            if state
                .periods
                .iter()
                .any(|period| period.user_id == user_id && period.is_active())
            {
                return Err(CreatePeriodError::ActivePeriodExists);
            }

            let period = Period {
                id: Uuid::new_v4(),
                user_id,
                start_date,
                end_date: None,
                status: PeriodStatus::Active,
                duration_days: None,
                closed_at: None,
                summary_json: None,
                created_at: start_date,
                updated_at: start_date,
            };
            state.periods.push(period.clone());

            Ok(period)
        }

        async fn delete_period(&self, period_id: Uuid) -> anyhow::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.periods.retain(|period| period.id != period_id);

            Ok(())
        }

        async fn period_record_counts(
            &self,
            period_id: Uuid,
        ) -> anyhow::Result<PeriodRecordCounts> {
            let state = self.state.lock().unwrap();

            Ok(PeriodRecordCounts {
                budget_additions: state
                    .additions
                    .iter()
                    .filter(|addition| addition.period_id == period_id)
                    .count() as i64,
                expenses: state
                    .expenses
                    .iter()
                    .filter(|expense| expense.period_id == period_id)
                    .count() as i64,
            })
        }

        async fn close_period(&self, close: &PeriodClose) -> anyhow::Result<Option<Period>> {
            let mut state = self.state.lock().unwrap();

            let period = state
                .periods
                .iter_mut()
                .find(|period| period.id == close.period_id && period.is_active());

            Ok(period.map(|period| {
                period.status = PeriodStatus::Closed;
                period.end_date = Some(close.closed_at);
                period.closed_at = Some(close.closed_at);
                period.duration_days = Some(close.duration_days);
                period.summary_json = Some(close.summary_json.clone());
                period.updated_at = close.closed_at;

                period.clone()
            }))
        }

        async fn list_budget_additions(
            &self,
            period_id: Uuid,
        ) -> anyhow::Result<Vec<BudgetAddition>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .additions
                .iter()
                .filter(|addition| addition.period_id == period_id)
                .cloned()
                .collect())
        }

        async fn get_budget_addition(
            &self,
            user_id: Uuid,
            addition_id: Uuid,
        ) -> anyhow::Result<Option<BudgetAddition>> {
            let state = self.state.lock().unwrap();

            let owned_periods: Vec<Uuid> = state
                .periods
                .iter()
                .filter(|period| period.user_id == user_id)
                .map(|period| period.id)
                .collect();

            Ok(state
                .additions
                .iter()
                .find(|addition| {
                    addition.id == addition_id && owned_periods.contains(&addition.period_id)
                })
                .cloned())
        }

        async fn create_budget_addition(
            &self,
            addition: &NewBudgetAddition,
        ) -> anyhow::Result<BudgetAddition> {
            let mut state = self.state.lock().unwrap();

            let totals = Self::totals_for(&state, addition.period_id());
            let snap = snapshot::snapshot(
                totals,
                PendingEntry::Addition(addition.kind(), addition.amount()),
            );

            let record = BudgetAddition {
                id: Uuid::new_v4(),
                period_id: addition.period_id(),
                kind: addition.kind(),
                amount: addition.amount(),
                source: addition.source().to_owned(),
                date: addition.date(),
                comments: addition.comments().map(str::to_owned),
                budget_before: snap.budget_before,
                budget_after: snap.budget_after,
                created_at: Utc::now(),
            };
            state.additions.push(record.clone());

            Ok(record)
        }

        async fn delete_budget_addition(&self, addition_id: Uuid) -> anyhow::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.additions.retain(|addition| addition.id != addition_id);

            Ok(())
        }

        async fn list_expenses(&self, period_id: Uuid) -> anyhow::Result<Vec<Expense>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .expenses
                .iter()
                .filter(|expense| expense.period_id == period_id)
                .cloned()
                .collect())
        }

        async fn get_expense(
            &self,
            user_id: Uuid,
            expense_id: Uuid,
        ) -> anyhow::Result<Option<Expense>> {
            let state = self.state.lock().unwrap();

            let owned_periods: Vec<Uuid> = state
                .periods
                .iter()
                .filter(|period| period.user_id == user_id)
                .map(|period| period.id)
                .collect();

            Ok(state
                .expenses
                .iter()
                .find(|expense| {
                    expense.id == expense_id && owned_periods.contains(&expense.period_id)
                })
                .cloned())
        }

        async fn create_expense(
            &self,
            expense: &NewExpense,
        ) -> anyhow::Result<(Expense, PeriodTotals)> {
            let mut state = self.state.lock().unwrap();

            let totals = Self::totals_for(&state, expense.period_id());
            let snap = snapshot::snapshot(totals, PendingEntry::Expense(expense.amount()));

            let category = state
                .categories
                .iter()
                .find(|category| category.id == expense.category_id())
                .expect("test fixture should insert the category first");

            let now = Utc::now();
            let record = Expense {
                id: Uuid::new_v4(),
                period_id: expense.period_id(),
                category: CategoryRef {
                    id: category.id,
                    name: category.name.clone(),
                    icon: category.icon.clone(),
                    color: category.color.clone(),
                },
                expense_name: expense.expense_name().to_owned(),
                amount: expense.amount(),
                date: expense.date(),
                comments: expense.comments().map(str::to_owned),
                budget_before: snap.budget_before,
                budget_after: snap.budget_after,
                snapshot_at: now,
                original_amount: None,
                created_at: now,
                updated_at: now,
            };
            state.expenses.push(record.clone());

            Ok((record, totals))
        }

        async fn update_expense(
            &self,
            expense_id: Uuid,
            update: &ExpenseUpdate,
        ) -> anyhow::Result<Option<Expense>> {
            let mut state = self.state.lock().unwrap();

            let categories: HashMap<Uuid, Category> = state
                .categories
                .iter()
                .map(|category| (category.id, category.clone()))
                .collect();

            let expense = state
                .expenses
                .iter_mut()
                .find(|expense| expense.id == expense_id);

            Ok(expense.map(|expense| {
                if let Some(name) = &update.expense_name {
                    expense.expense_name = name.clone();
                }
                if let Some(category_id) = update.category_id {
                    let category = categories
                        .get(&category_id)
                        .expect("test fixture should insert the category first");
                    expense.category = CategoryRef {
                        id: category.id,
                        name: category.name.clone(),
                        icon: category.icon.clone(),
                        color: category.color.clone(),
                    };
                }
                if let Some(amount) = update.amount {
                    expense.amount = amount;
                }
                if let Some(original_amount) = update.original_amount {
                    expense.original_amount = Some(original_amount);
                }
                if let Some(date) = update.date {
                    expense.date = date;
                }
                if let Some(comments) = &update.comments {
                    expense.comments = comments.clone();
                }
                expense.updated_at = Utc::now();

                expense.clone()
            }))
        }

        async fn delete_expense(&self, expense_id: Uuid) -> anyhow::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.expenses.retain(|expense| expense.id != expense_id);

            Ok(())
        }

        async fn list_categories(
            &self,
            user_id: Uuid,
        ) -> anyhow::Result<Vec<(Category, i64)>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .categories
                .iter()
                .filter(|category| category.user_id == user_id)
                .map(|category| {
                    let count = state
                        .expenses
                        .iter()
                        .filter(|expense| expense.category.id == category.id)
                        .count() as i64;

                    (category.clone(), count)
                })
                .collect())
        }

        async fn get_category(
            &self,
            user_id: Uuid,
            category_id: Uuid,
        ) -> anyhow::Result<Option<Category>> {
            let state = self.state.lock().unwrap();

            Ok(state
                .categories
                .iter()
                .find(|category| category.id == category_id && category.user_id == user_id)
                .cloned())
        }

        async fn create_category(
            &self,
            user_id: Uuid,
            category: &NewCategory,
        ) -> Result<Category, CreateCategoryError> {
            let mut state = self.state.lock().unwrap();

            if state
                .categories
                .iter()
                .any(|existing| existing.user_id == user_id && existing.name == category.name())
            {
                return Err(CreateCategoryError::DuplicateName(category.name().to_owned()));
            }

            let now = Utc::now();
            let record = Category {
                id: Uuid::new_v4(),
                user_id,
                name: category.name().to_owned(),
                icon: category.icon().to_owned(),
                color: category.color().map(str::to_owned),
                is_default: category.is_default(),
                created_at: now,
                updated_at: now,
            };
            state.categories.push(record.clone());

            Ok(record)
        }

        async fn update_category(
            &self,
            category_id: Uuid,
            changes: &CategoryChanges,
        ) -> Result<Option<Category>, CreateCategoryError> {
            let mut state = self.state.lock().unwrap();

            let category = state
                .categories
                .iter_mut()
                .find(|category| category.id == category_id);

            Ok(category.map(|category| {
                if let Some(name) = changes.name() {
                    category.name = name.to_owned();
                }
                if let Some(icon) = changes.icon() {
                    category.icon = icon.to_owned();
                }
                if let Some(color) = changes.color() {
                    category.color = color.map(str::to_owned);
                }
                category.updated_at = Utc::now();

                category.clone()
            }))
        }

        async fn count_expenses_for_category(&self, category_id: Uuid) -> anyhow::Result<i64> {
            let state = self.state.lock().unwrap();

            Ok(state
                .expenses
                .iter()
                .filter(|expense| expense.category.id == category_id)
                .count() as i64)
        }

        async fn delete_category(&self, category_id: Uuid) -> anyhow::Result<()> {
            let mut state = self.state.lock().unwrap();
            state.categories.retain(|category| category.id != category_id);

            Ok(())
        }

        async fn reassign_and_delete_category(
            &self,
            category_id: Uuid,
            reassign_to: Uuid,
        ) -> anyhow::Result<u64> {
            let mut state = self.state.lock().unwrap();

            let target = state
                .categories
                .iter()
                .find(|category| category.id == reassign_to)
                .cloned()
                .expect("test fixture should insert the target category first");

            let mut reassigned = 0;
            for expense in &mut state.expenses {
                if expense.category.id == category_id {
                    expense.category = CategoryRef {
                        id: target.id,
                        name: target.name.clone(),
                        icon: target.icon.clone(),
                        color: target.color.clone(),
                    };
                    reassigned += 1;
                }
            }

            state.categories.retain(|category| category.id != category_id);

            Ok(reassigned)
        }
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().expect("literal should parse")
    }

    fn service() -> BudgetService {
        BudgetService::new(Arc::new(InMemoryLedger::default()))
    }

    async fn seeded_category(service: &BudgetService, user_id: Uuid, name: &str) -> Category {
        service
            .create_category(
                user_id,
                NewCategoryData {
                    name: name.to_owned(),
                    icon: "🧾".to_owned(),
                    color: None,
                    is_default: false,
                },
            )
            .await
            .expect("category should be created")
    }

    fn addition_data(
        period_id: Uuid,
        kind: AdditionKind,
        amount: &str,
        comments: Option<&str>,
    ) -> NewBudgetAdditionData {
        NewBudgetAdditionData {
            period_id,
            kind,
            amount: dec(amount),
            source: "Salary".to_owned(),
            date: None,
            comments: comments.map(str::to_owned),
        }
    }

    fn expense_data(period_id: Uuid, category_id: Uuid, amount: &str) -> NewExpenseData {
        NewExpenseData {
            period_id,
            category_id,
            expense_name: "Groceries".to_owned(),
            amount: dec(amount),
            date: None,
            comments: None,
        }
    }

    #[tokio::test]
    async fn snapshots_chain_through_a_period() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        let income = service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "1000", None),
            )
            .await
            .unwrap();
        assert_eq!(dec("0"), income.budget_before);
        assert_eq!(dec("1000"), income.budget_after);

        let (expense, feedback) = service
            .create_expense(user_id, expense_data(period.id, category.id, "200"))
            .await
            .unwrap();
        assert_eq!(dec("1000"), expense.budget_before);
        assert_eq!(dec("800"), expense.budget_after);
        assert_eq!(dec("1000"), feedback.total_budget);
        assert_eq!(dec("200"), feedback.total_spent);
        assert_eq!(dec("20.00"), feedback.percentage_used);

        let deduction = service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Deduction, "50", Some("fee")),
            )
            .await
            .unwrap();
        assert_eq!(dec("800"), deduction.budget_before);
        assert_eq!(dec("750"), deduction.budget_after);

        let (closed, summary) = service.close_period(user_id, period.id).await.unwrap();
        assert_eq!(PeriodStatus::Closed, closed.status);
        assert_eq!(dec("750"), summary.result.remaining_budget);
        assert_eq!(dec("200"), summary.expenses.total);
        assert_eq!(dec("21.05"), summary.result.percentage_used);

        // The stored summary parses back to the same result.
        let stored: ClosingSummary =
            serde_json::from_str(closed.summary_json.as_deref().unwrap()).unwrap();
        assert_eq!(dec("750"), stored.result.remaining_budget);
    }

    #[tokio::test]
    async fn latest_snapshot_matches_fresh_totals() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "500", None),
            )
            .await
            .unwrap();
        service
            .create_expense(user_id, expense_data(period.id, category.id, "120.50"))
            .await
            .unwrap();
        let (latest, _) = service
            .create_expense(user_id, expense_data(period.id, category.id, "30"))
            .await
            .unwrap();

        let detail = service.get_period(user_id, period.id).await.unwrap().unwrap();
        assert_eq!(
            detail.overview.total_budget - detail.overview.total_expenses,
            latest.budget_after,
        );
    }

    #[tokio::test]
    async fn only_one_active_period_per_user() {
        let service = service();
        let user_id = Uuid::new_v4();
        service.create_period(user_id, None).await.unwrap();

        let error = service
            .create_period(user_id, None)
            .await
            .expect_err("second active period should be rejected");
        assert!(matches!(error, CreatePeriodError::ActivePeriodExists));

        assert_eq!(1, service.list_periods(user_id).await.unwrap().len());

        // Another user is unaffected.
        assert!(service.create_period(Uuid::new_v4(), None).await.is_ok());
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();

        service.close_period(user_id, period.id).await.unwrap();

        let error = service
            .close_period(user_id, period.id)
            .await
            .expect_err("closing twice should fail");
        assert!(matches!(error, ClosePeriodError::NotFound));
    }

    #[tokio::test]
    async fn closing_a_foreign_period_is_not_found() {
        let service = service();
        let owner = Uuid::new_v4();
        let period = service.create_period(owner, None).await.unwrap();

        let error = service
            .close_period(Uuid::new_v4(), period.id)
            .await
            .expect_err("foreign period should look absent");
        assert!(matches!(error, ClosePeriodError::NotFound));
    }

    #[tokio::test]
    async fn closed_periods_accept_backfilled_expenses_within_the_window() {
        let service = service();
        let user_id = Uuid::new_v4();
        let start = Utc.ymd(2026, 5, 1).and_hms(0, 0, 0);
        let period = service.create_period(user_id, Some(start)).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        let (closed, _) = service.close_period(user_id, period.id).await.unwrap();
        let summary_before = closed.summary_json.clone();

        let mut backfill = expense_data(period.id, category.id, "15");
        backfill.date = Some(start + chrono::Duration::hours(4));
        service
            .create_expense(user_id, backfill)
            .await
            .expect("expense within the window should be accepted");

        let mut too_early = expense_data(period.id, category.id, "15");
        too_early.date = Some(start - chrono::Duration::days(1));
        let error = service
            .create_expense(user_id, too_early)
            .await
            .expect_err("expense before the window should be rejected");
        assert!(matches!(error, CreateExpenseError::PeriodClosed));

        let mut too_late = expense_data(period.id, category.id, "15");
        too_late.date = Some(Utc::now() + chrono::Duration::days(2));
        let error = service
            .create_expense(user_id, too_late)
            .await
            .expect_err("expense after the window should be rejected");
        assert!(matches!(error, CreateExpenseError::PeriodClosed));

        // A backfilled expense never disturbs the frozen summary.
        let after = service.get_period(user_id, period.id).await.unwrap().unwrap();
        assert_eq!(summary_before, after.period.summary_json);
    }

    #[tokio::test]
    async fn closed_periods_reject_other_mutations() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        let addition = service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "100", None),
            )
            .await
            .unwrap();
        let (expense, _) = service
            .create_expense(user_id, expense_data(period.id, category.id, "10"))
            .await
            .unwrap();

        service.close_period(user_id, period.id).await.unwrap();

        let error = service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "100", None),
            )
            .await
            .expect_err("additions to closed periods should be rejected");
        assert!(matches!(error, CreateAdditionError::PeriodClosed));

        let error = service
            .delete_budget_addition(user_id, addition.id)
            .await
            .expect_err("deleting from closed periods should be rejected");
        assert!(matches!(error, DeleteAdditionError::PeriodClosed));

        let error = service
            .update_expense(
                user_id,
                expense.id,
                ExpenseChangesData {
                    amount: Some(dec("20")),
                    ..Default::default()
                },
            )
            .await
            .expect_err("editing expenses in closed periods should be rejected");
        assert!(matches!(error, UpdateExpenseError::PeriodClosed));

        let error = service
            .delete_expense(user_id, expense.id)
            .await
            .expect_err("deleting expenses in closed periods should be rejected");
        assert!(matches!(error, DeleteExpenseError::PeriodClosed));
    }

    #[tokio::test]
    async fn amount_edits_never_touch_the_snapshot() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "1000", None),
            )
            .await
            .unwrap();
        let (expense, _) = service
            .create_expense(user_id, expense_data(period.id, category.id, "200"))
            .await
            .unwrap();

        let edited = service
            .update_expense(
                user_id,
                expense.id,
                ExpenseChangesData {
                    amount: Some(dec("250")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(dec("250"), edited.amount);
        assert_eq!(Some(dec("200")), edited.original_amount);
        assert_eq!(expense.budget_before, edited.budget_before);
        assert_eq!(expense.budget_after, edited.budget_after);

        // A second edit keeps the first original amount.
        let edited_again = service
            .update_expense(
                user_id,
                expense.id,
                ExpenseChangesData {
                    amount: Some(dec("300")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(Some(dec("200")), edited_again.original_amount);

        // Re-submitting the current amount is not an edit.
        let unchanged = service
            .update_expense(
                user_id,
                expense.id,
                ExpenseChangesData {
                    expense_name: Some("Weekly groceries".to_owned()),
                    amount: Some(dec("300")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(Some(dec("200")), unchanged.original_amount);
        assert_eq!("Weekly groceries", unchanged.expense_name);
    }

    #[tokio::test]
    async fn adjustments_require_comments() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();

        let error = service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Adjustment, "100", Some("")),
            )
            .await
            .expect_err("adjustment with empty comments should be rejected");

        match error {
            CreateAdditionError::InvalidAddition(context) => {
                assert!(context.into_iter().any(|invalidity| {
                    invalidity == NewBudgetAdditionInvalidity::CommentsRequired
                }));
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn expenses_require_an_owned_category() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();

        let other_user = Uuid::new_v4();
        let foreign_category = seeded_category(&service, other_user, "Food").await;

        let error = service
            .create_expense(
                user_id,
                expense_data(period.id, foreign_category.id, "10"),
            )
            .await
            .expect_err("foreign category should look absent");
        assert!(matches!(error, CreateExpenseError::CategoryNotFound));
    }

    #[tokio::test]
    async fn non_empty_periods_cannot_be_deleted() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        service
            .create_expense(user_id, expense_data(period.id, category.id, "10"))
            .await
            .unwrap();

        let error = service
            .delete_period(user_id, period.id)
            .await
            .expect_err("a period with records should not be deletable");
        assert!(matches!(
            error,
            DeletePeriodError::NotEmpty {
                budget_additions: 0,
                expenses: 1,
            }
        ));
    }

    #[tokio::test]
    async fn empty_periods_can_be_deleted() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();

        service.delete_period(user_id, period.id).await.unwrap();
        assert!(service.get_period(user_id, period.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn category_deletion_reassigns_expenses_atomically() {
        let service = service();
        let user_id = Uuid::new_v4();
        let period = service.create_period(user_id, None).await.unwrap();
        let food = seeded_category(&service, user_id, "Food").await;
        let misc = seeded_category(&service, user_id, "Misc").await;

        for _ in 0..3 {
            service
                .create_expense(user_id, expense_data(period.id, food.id, "10"))
                .await
                .unwrap();
        }

        let error = service
            .delete_category(user_id, food.id, None)
            .await
            .expect_err("deletion without a target should be rejected");
        assert!(matches!(
            error,
            DeleteCategoryError::ReassignmentRequired { expense_count: 3 }
        ));

        let error = service
            .delete_category(user_id, food.id, Some(food.id))
            .await
            .expect_err("self-reassignment should be rejected");
        assert!(matches!(error, DeleteCategoryError::ReassignmentTargetSame));

        let outcome = service
            .delete_category(user_id, food.id, Some(misc.id))
            .await
            .unwrap();
        assert_eq!(DeletedCategory::Reassigned(3), outcome);

        assert!(service.get_category(user_id, food.id).await.unwrap().is_none());
        let expenses = service
            .list_expenses(user_id, Some(period.id))
            .await
            .unwrap();
        assert!(expenses.iter().all(|expense| expense.category.id == misc.id));
    }

    #[tokio::test]
    async fn empty_categories_delete_directly() {
        let service = service();
        let user_id = Uuid::new_v4();
        let category = seeded_category(&service, user_id, "Food").await;

        let outcome = service
            .delete_category(user_id, category.id, None)
            .await
            .unwrap();
        assert_eq!(DeletedCategory::Deleted, outcome);
    }

    #[tokio::test]
    async fn duplicate_category_names_are_rejected() {
        let service = service();
        let user_id = Uuid::new_v4();
        seeded_category(&service, user_id, "Food").await;

        let error = service
            .create_category(
                user_id,
                NewCategoryData {
                    name: "Food".to_owned(),
                    icon: "🍔".to_owned(),
                    color: None,
                    is_default: false,
                },
            )
            .await
            .expect_err("duplicate name should be rejected");
        assert!(matches!(error, NewCategoryError::DuplicateName(name) if name == "Food"));

        // The same name is fine for a different user.
        assert!(service
            .create_category(
                Uuid::new_v4(),
                NewCategoryData {
                    name: "Food".to_owned(),
                    icon: "🍔".to_owned(),
                    color: None,
                    is_default: false,
                },
            )
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn current_period_reports_budget_position() {
        let service = service();
        let user_id = Uuid::new_v4();

        assert!(service.current_period(user_id).await.unwrap().is_none());

        let period = service.create_period(user_id, None).await.unwrap();
        let category = seeded_category(&service, user_id, "Food").await;

        service
            .create_budget_addition(
                user_id,
                addition_data(period.id, AdditionKind::Income, "1000", None),
            )
            .await
            .unwrap();
        service
            .create_expense(user_id, expense_data(period.id, category.id, "200"))
            .await
            .unwrap();

        let detail = service.current_period(user_id).await.unwrap().unwrap();
        assert_eq!(period.id, detail.period.id);
        assert_eq!(dec("1000"), detail.overview.total_budget);
        assert_eq!(dec("800"), detail.overview.remaining_budget);
        assert_eq!(dec("20.00"), detail.overview.percentage_used);
    }
}
