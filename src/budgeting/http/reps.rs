//! Wire representations for the budgeting endpoints.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use semval::context::Context as ValidationContext;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::budgeting::domain::additions::{
    AdditionKind, BudgetAddition, NewBudgetAdditionData, NewBudgetAdditionInvalidity,
};
use crate::budgeting::domain::amounts::AmountInvalidity;
use crate::budgeting::domain::categories::{
    Category, CategoryChangesData, CategoryInvalidity, NewCategoryData,
};
use crate::budgeting::domain::expenses::{
    Expense, ExpenseChangesData, NewExpenseData, NewExpenseInvalidity,
};
use crate::budgeting::domain::periods::{Period, PeriodStatus};
use crate::budgeting::domain::summary::{ClosingSummary, PeriodOverview};
use crate::budgeting::services::{PeriodDetail, SpendingSnapshot};

/// Distinguishes an absent field from an explicit `null` in PATCH-style
/// bodies: absent deserializes to `None`, `null` to `Some(None)`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Serialize)]
pub struct ResourceCollection<T: Serialize> {
    pub items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPeriodRequest {
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodRep {
    pub id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: PeriodStatus,
    pub duration_days: Option<i32>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Period> for PeriodRep {
    fn from(period: &Period) -> Self {
        Self {
            id: period.id,
            start_date: period.start_date,
            end_date: period.end_date,
            status: period.status,
            duration_days: period.duration_days,
            closed_at: period.closed_at,
            created_at: period.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDetailRep {
    #[serde(flatten)]
    pub period: PeriodRep,
    pub overview: PeriodOverview,
    pub budget_additions: Vec<BudgetAdditionRep>,
    pub expenses: Vec<ExpenseRep>,
}

impl From<&PeriodDetail> for PeriodDetailRep {
    fn from(detail: &PeriodDetail) -> Self {
        Self {
            period: (&detail.period).into(),
            overview: detail.overview.clone(),
            budget_additions: detail.additions.iter().map(Into::into).collect(),
            expenses: detail.expenses.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPeriodRep {
    #[serde(flatten)]
    pub period: PeriodRep,
    pub summary: ClosingSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetAdditionRequest {
    pub period_id: Uuid,
    #[serde(rename = "type")]
    pub kind: AdditionKind,
    pub amount: Decimal,
    pub source: String,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl From<NewBudgetAdditionRequest> for NewBudgetAdditionData {
    fn from(rep: NewBudgetAdditionRequest) -> Self {
        Self {
            period_id: rep.period_id,
            kind: rep.kind,
            amount: rep.amount,
            source: rep.source,
            date: rep.date,
            comments: rep.comments,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAdditionRep {
    pub id: Uuid,
    pub period_id: Uuid,
    #[serde(rename = "type")]
    pub kind: AdditionKind,
    pub amount: Decimal,
    pub source: String,
    pub date: DateTime<Utc>,
    pub comments: Option<String>,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<&BudgetAddition> for BudgetAdditionRep {
    fn from(addition: &BudgetAddition) -> Self {
        Self {
            id: addition.id,
            period_id: addition.period_id,
            kind: addition.kind,
            amount: addition.amount,
            source: addition.source.clone(),
            date: addition.date,
            comments: addition.comments.clone(),
            budget_before: addition.budget_before,
            budget_after: addition.budget_after,
            created_at: addition.created_at,
        }
    }
}

#[derive(Default, Serialize)]
pub struct BudgetAdditionValidationError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    amount: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    source: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    comments: Vec<String>,
}

impl From<ValidationContext<NewBudgetAdditionInvalidity>> for BudgetAdditionValidationError {
    fn from(validation: ValidationContext<NewBudgetAdditionInvalidity>) -> Self {
        let mut response = Self::default();

        for invalidity in validation.into_iter() {
            match invalidity {
                NewBudgetAdditionInvalidity::Amount(amount_invalidity) => response
                    .amount
                    .push(amount_message(amount_invalidity)),
                NewBudgetAdditionInvalidity::SourceLength(max) => response.source.push(format!(
                    "Sources must contain between 1 and {} characters.",
                    max
                )),
                NewBudgetAdditionInvalidity::CommentsRequired => response
                    .comments
                    .push("Comments are required for adjustments and deductions.".to_owned()),
                NewBudgetAdditionInvalidity::CommentsLength(max) => response
                    .comments
                    .push(format!("Comments may not exceed {} characters.", max)),
            }
        }

        response
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpenseRequest {
    pub period_id: Uuid,
    pub category_id: Uuid,
    pub expense_name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl From<NewExpenseRequest> for NewExpenseData {
    fn from(rep: NewExpenseRequest) -> Self {
        Self {
            period_id: rep.period_id,
            category_id: rep.category_id,
            expense_name: rep.expense_name,
            amount: rep.amount,
            date: rep.date,
            comments: rep.comments,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseChangesRequest {
    #[serde(default)]
    pub expense_name: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub comments: Option<Option<String>>,
}

impl From<ExpenseChangesRequest> for ExpenseChangesData {
    fn from(rep: ExpenseChangesRequest) -> Self {
        Self {
            expense_name: rep.expense_name,
            category_id: rep.category_id,
            amount: rep.amount,
            date: rep.date,
            comments: rep.comments,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRefRep {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRep {
    pub id: Uuid,
    pub period_id: Uuid,
    pub category: CategoryRefRep,
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

impl From<&Expense> for ExpenseRep {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id,
            period_id: expense.period_id,
            category: CategoryRefRep {
                id: expense.category.id,
                name: expense.category.name.clone(),
                icon: expense.category.icon.clone(),
                color: expense.category.color.clone(),
            },
            expense_name: expense.expense_name.clone(),
            amount: expense.amount,
            date: expense.date,
            comments: expense.comments.clone(),
            budget_before: expense.budget_before,
            budget_after: expense.budget_after,
            snapshot_at: expense.snapshot_at,
            original_amount: expense.original_amount,
            created_at: expense.created_at,
            updated_at: expense.updated_at,
        }
    }
}

/// The feedback block returned alongside a newly created expense.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingSnapshotRep {
    pub total_budget: Decimal,
    pub total_spent: Decimal,
    pub budget_before: Decimal,
    pub budget_after: Decimal,
    pub percentage_used: Decimal,
}

impl From<SpendingSnapshot> for SpendingSnapshotRep {
    fn from(snapshot: SpendingSnapshot) -> Self {
        Self {
            total_budget: snapshot.total_budget,
            total_spent: snapshot.total_spent,
            budget_before: snapshot.budget_before,
            budget_after: snapshot.budget_after,
            percentage_used: snapshot.percentage_used,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedExpenseRep {
    #[serde(flatten)]
    pub expense: ExpenseRep,
    pub spending: SpendingSnapshotRep,
}

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseValidationError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    amount: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    expense_name: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    comments: Vec<String>,
}

impl From<ValidationContext<NewExpenseInvalidity>> for ExpenseValidationError {
    fn from(validation: ValidationContext<NewExpenseInvalidity>) -> Self {
        let mut response = Self::default();

        for invalidity in validation.into_iter() {
            match invalidity {
                NewExpenseInvalidity::Amount(amount_invalidity) => response
                    .amount
                    .push(amount_message(amount_invalidity)),
                NewExpenseInvalidity::NameLength(max) => response.expense_name.push(format!(
                    "Expense names must contain between 1 and {} characters.",
                    max
                )),
                NewExpenseInvalidity::CommentsLength(max) => response
                    .comments
                    .push(format!("Comments may not exceed {} characters.", max)),
            }
        }

        response
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategoryRequest {
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl From<NewCategoryRequest> for NewCategoryData {
    fn from(rep: NewCategoryRequest) -> Self {
        Self {
            name: rep.name,
            icon: rep.icon,
            color: rep.color,
            is_default: rep.is_default,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryChangesRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
}

impl From<CategoryChangesRequest> for CategoryChangesData {
    fn from(rep: CategoryChangesRequest) -> Self {
        Self {
            name: rep.name,
            icon: rep.icon,
            color: rep.color,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRep {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub color: Option<String>,
    pub is_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_count: Option<i64>,
}

impl From<&Category> for CategoryRep {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            icon: category.icon.clone(),
            color: category.color.clone(),
            is_default: category.is_default,
            expense_count: None,
        }
    }
}

impl From<&(Category, i64)> for CategoryRep {
    fn from((category, expense_count): &(Category, i64)) -> Self {
        Self {
            expense_count: Some(*expense_count),
            ..category.into()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCategoryRep {
    pub reassigned_expenses: u64,
}

#[derive(Default, Serialize)]
pub struct CategoryValidationError {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    name: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    icon: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    color: Vec<String>,
}

impl From<ValidationContext<CategoryInvalidity>> for CategoryValidationError {
    fn from(validation: ValidationContext<CategoryInvalidity>) -> Self {
        let mut response = Self::default();

        for invalidity in validation.into_iter() {
            match invalidity {
                CategoryInvalidity::NameLength(max) => response.name.push(format!(
                    "Category names must contain between 1 and {} characters.",
                    max
                )),
                CategoryInvalidity::IconLength(max) => response.icon.push(format!(
                    "Icons must contain between 1 and {} characters.",
                    max
                )),
                CategoryInvalidity::ColorFormat => response
                    .color
                    .push("Colors must be '#RRGGBB' hex strings.".to_owned()),
            }
        }

        response
    }
}

fn amount_message(invalidity: AmountInvalidity) -> String {
    match invalidity {
        AmountInvalidity::NotPositive => "Amounts must be greater than zero.".to_owned(),
        AmountInvalidity::TooManyDecimals(max) => {
            format!("Amounts may not have more than {} decimal places.", max)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn absent_and_null_comments_deserialize_differently() {
        let absent: ExpenseChangesRequest =
            serde_json::from_str(r#"{"amount": "10.00"}"#).expect("body should parse");
        assert_eq!(None, absent.comments);

        let cleared: ExpenseChangesRequest =
            serde_json::from_str(r#"{"comments": null}"#).expect("body should parse");
        assert_eq!(Some(None), cleared.comments);

        let replaced: ExpenseChangesRequest =
            serde_json::from_str(r#"{"comments": "updated"}"#).expect("body should parse");
        assert_eq!(Some(Some("updated".to_owned())), replaced.comments);
    }

    #[test]
    fn addition_requests_use_the_type_field() {
        let request: NewBudgetAdditionRequest = serde_json::from_str(
            r#"{
                "periodId": "0bc18a21-9144-4d1b-9409-0d7e67a98c8a",
                "type": "DEDUCTION",
                "amount": "50.00",
                "source": "Bank fee",
                "comments": "monthly charge"
            }"#,
        )
        .expect("body should parse");

        assert_eq!(AdditionKind::Deduction, request.kind);
        assert_eq!("Bank fee", request.source);
    }

    #[test]
    fn empty_validation_groups_are_omitted() {
        let error = BudgetAdditionValidationError {
            comments: vec!["Comments are required for adjustments and deductions.".to_owned()],
            ..Default::default()
        };

        let json = serde_json::to_value(&error).expect("error should serialize");
        assert!(json.get("amount").is_none());
        assert!(json["comments"].is_array());
    }
}
