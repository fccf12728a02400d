use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use semval::prelude::*;
use uuid::Uuid;

use super::amounts::{Amount, AmountInvalidity};

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_COMMENTS_LENGTH: usize = 500;

/// A validated expense that has not been persisted yet.
#[derive(Debug)]
pub struct NewExpense {
    period_id: Uuid,
    category_id: Uuid,
    expense_name: String,
    amount: Amount,
    date: DateTime<Utc>,
    comments: Option<String>,
}

impl NewExpense {
    pub fn period_id(&self) -> Uuid {
        self.period_id
    }

    pub fn category_id(&self) -> Uuid {
        self.category_id
    }

    pub fn expense_name(&self) -> &str {
        &self.expense_name
    }

    pub fn amount(&self) -> Decimal {
        self.amount.value()
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NewExpenseInvalidity {
    Amount(AmountInvalidity),
    NameLength(usize),
    CommentsLength(usize),
}

impl Validate for NewExpense {
    type Invalidity = NewExpenseInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        ValidationContext::new()
            .validate_with(&self.amount, NewExpenseInvalidity::Amount)
            .invalidate_if(
                self.expense_name.is_empty() || self.expense_name.len() > MAX_NAME_LENGTH,
                NewExpenseInvalidity::NameLength(MAX_NAME_LENGTH),
            )
            .invalidate_if(
                self.comments
                    .as_deref()
                    .map_or(false, |comments| comments.len() > MAX_COMMENTS_LENGTH),
                NewExpenseInvalidity::CommentsLength(MAX_COMMENTS_LENGTH),
            )
            .into()
    }
}

/// Unvalidated expense data as received from a caller.
#[derive(Clone, Debug)]
pub struct NewExpenseData {
    pub period_id: Uuid,
    pub category_id: Uuid,
    pub expense_name: String,
    pub amount: Decimal,
    pub date: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl ValidatedFrom<NewExpenseData> for NewExpense {
    fn validated_from(from: NewExpenseData) -> ValidatedResult<Self> {
        let into = NewExpense {
            period_id: from.period_id,
            category_id: from.category_id,
            expense_name: from.expense_name,
            amount: Amount::unvalidated(from.amount),
            date: from.date.unwrap_or_else(Utc::now),
            comments: from.comments,
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}

/// A validated set of changes to an existing expense.
///
/// Every field is optional; absent fields are left untouched. Amount changes
/// never touch the stored budget snapshot.
#[derive(Debug, Default)]
pub struct ExpenseChanges {
    expense_name: Option<String>,
    category_id: Option<Uuid>,
    amount: Option<Amount>,
    date: Option<DateTime<Utc>>,
    comments: Option<Option<String>>,
}

impl ExpenseChanges {
    pub fn expense_name(&self) -> Option<&str> {
        self.expense_name.as_deref()
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.amount.map(|amount| amount.value())
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    /// `Some(None)` clears the comments, `None` leaves them untouched.
    pub fn comments(&self) -> Option<Option<&str>> {
        self.comments
            .as_ref()
            .map(|comments| comments.as_deref())
    }
}

impl Validate for ExpenseChanges {
    type Invalidity = NewExpenseInvalidity;

    fn validate(&self) -> ValidationResult<Self::Invalidity> {
        let mut context = ValidationContext::new();

        if let Some(amount) = &self.amount {
            context = context.validate_with(amount, NewExpenseInvalidity::Amount);
        }

        context
            .invalidate_if(
                self.expense_name
                    .as_deref()
                    .map_or(false, |name| name.is_empty() || name.len() > MAX_NAME_LENGTH),
                NewExpenseInvalidity::NameLength(MAX_NAME_LENGTH),
            )
            .invalidate_if(
                self.comments
                    .as_ref()
                    .and_then(|comments| comments.as_deref())
                    .map_or(false, |comments| comments.len() > MAX_COMMENTS_LENGTH),
                NewExpenseInvalidity::CommentsLength(MAX_COMMENTS_LENGTH),
            )
            .into()
    }
}

/// Unvalidated expense changes as received from a caller.
#[derive(Clone, Debug, Default)]
pub struct ExpenseChangesData {
    pub expense_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub date: Option<DateTime<Utc>>,
    pub comments: Option<Option<String>>,
}

impl ValidatedFrom<ExpenseChangesData> for ExpenseChanges {
    fn validated_from(from: ExpenseChangesData) -> ValidatedResult<Self> {
        let into = ExpenseChanges {
            expense_name: from.expense_name,
            category_id: from.category_id,
            amount: from.amount.map(Amount::unvalidated),
            date: from.date,
            comments: from.comments,
        };

        match into.validate() {
            Ok(()) => Ok(into),
            Err(context) => Err((into, context)),
        }
    }
}

/// The category an expense was recorded against, denormalized for display
/// and summary grouping.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CategoryRef {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
}

/// A persisted expense.
///
/// `budget_before`, `budget_after`, and `snapshot_at` were recorded when the
/// expense was created and are never recalculated. Editing the amount stores
/// the pre-edit value in `original_amount` on the first edit only.
#[derive(Clone, Debug)]
pub struct Expense {
    pub id: Uuid,
    pub period_id: Uuid,
    pub category: CategoryRef,
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
}

#[cfg(test)]
mod test {
    use super::*;

    fn data(amount: &str) -> NewExpenseData {
        NewExpenseData {
            period_id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            expense_name: "Groceries".to_owned(),
            amount: amount.parse().expect("literal should parse"),
            date: None,
            comments: None,
        }
    }

    #[test]
    fn valid_expense_passes() {
        let expense =
            NewExpense::validated_from(data("42.50")).expect("expense should be valid");

        assert_eq!("Groceries", expense.expense_name());
        assert_eq!("42.50".parse::<Decimal>().unwrap(), expense.amount());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut invalid = data("10");
        invalid.expense_name = String::new();

        let (_, context) =
            NewExpense::validated_from(invalid).expect_err("empty name should be invalid");

        assert!(context
            .into_iter()
            .any(|invalidity| matches!(invalidity, NewExpenseInvalidity::NameLength(_))));
    }

    #[test]
    fn over_long_comments_are_rejected() {
        let mut invalid = data("10");
        invalid.comments = Some("x".repeat(MAX_COMMENTS_LENGTH + 1));

        let (_, context) =
            NewExpense::validated_from(invalid).expect_err("long comments should be invalid");

        assert!(context
            .into_iter()
            .any(|invalidity| matches!(invalidity, NewExpenseInvalidity::CommentsLength(_))));
    }

    #[test]
    fn changes_with_no_fields_are_valid() {
        let changes = ExpenseChanges::validated_from(ExpenseChangesData::default())
            .expect("empty changes should be valid");

        assert_eq!(None, changes.amount());
        assert_eq!(None, changes.expense_name());
    }

    #[test]
    fn changes_validate_provided_fields_only() {
        let invalid = ExpenseChangesData {
            amount: Some("9.999".parse().unwrap()),
            ..Default::default()
        };

        let (_, context) =
            ExpenseChanges::validated_from(invalid).expect_err("amount should be invalid");

        assert!(context
            .into_iter()
            .any(|invalidity| matches!(invalidity, NewExpenseInvalidity::Amount(_))));
    }
}
