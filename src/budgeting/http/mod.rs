use serde::Serialize;

use crate::http_err::{ApiError, ErrorRep};

use super::services::{
    ClosePeriodError, CreateAdditionError, CreateExpenseError, DeleteAdditionError,
    DeleteCategoryError, DeleteExpenseError, DeletePeriodError, NewCategoryError,
    RecordsQueryError, UpdateCategoryError, UpdateExpenseError,
};
use crate::repos::CreatePeriodError;

mod handlers;
pub mod reps;

pub use handlers::routes;

fn bad_request<T: Serialize>(message: &str, details: T) -> ApiError {
    ApiError::BadRequest(ErrorRep {
        error: message.to_owned(),
        details: serde_json::to_value(details).ok(),
    })
}

fn period_closed() -> ApiError {
    ApiError::Conflict(ErrorRep::message("The period is closed."))
}

impl From<CreatePeriodError> for ApiError {
    fn from(error: CreatePeriodError) -> Self {
        match error {
            CreatePeriodError::ActivePeriodExists => {
                Self::Conflict(ErrorRep::message("An active period already exists."))
            }
            CreatePeriodError::Other(error) => error.into(),
        }
    }
}

impl From<ClosePeriodError> for ApiError {
    fn from(error: ClosePeriodError) -> Self {
        match error {
            ClosePeriodError::NotFound => {
                Self::NotFound(ErrorRep::message("Period not found or already closed."))
            }
            ClosePeriodError::Other(error) => error.into(),
        }
    }
}

impl From<DeletePeriodError> for ApiError {
    fn from(error: DeletePeriodError) -> Self {
        match error {
            DeletePeriodError::NotFound => {
                Self::NotFound(ErrorRep::message("Period not found."))
            }
            DeletePeriodError::NotEmpty {
                budget_additions,
                expenses,
            } => Self::Conflict(ErrorRep {
                error: "The period still has records and cannot be deleted.".to_owned(),
                details: Some(serde_json::json!({
                    "budgetAdditions": budget_additions,
                    "expenses": expenses,
                })),
            }),
            DeletePeriodError::Other(error) => error.into(),
        }
    }
}

impl From<RecordsQueryError> for ApiError {
    fn from(error: RecordsQueryError) -> Self {
        match error {
            RecordsQueryError::PeriodNotFound => {
                Self::NotFound(ErrorRep::message("Period not found."))
            }
            RecordsQueryError::Other(error) => error.into(),
        }
    }
}

impl From<CreateAdditionError> for ApiError {
    fn from(error: CreateAdditionError) -> Self {
        match error {
            CreateAdditionError::InvalidAddition(context) => bad_request(
                "Invalid budget addition.",
                reps::BudgetAdditionValidationError::from(context),
            ),
            CreateAdditionError::PeriodNotFound => {
                Self::NotFound(ErrorRep::message("Period not found."))
            }
            CreateAdditionError::PeriodClosed => period_closed(),
            CreateAdditionError::Other(error) => error.into(),
        }
    }
}

impl From<DeleteAdditionError> for ApiError {
    fn from(error: DeleteAdditionError) -> Self {
        match error {
            DeleteAdditionError::NotFound => {
                Self::NotFound(ErrorRep::message("Budget addition not found."))
            }
            DeleteAdditionError::PeriodClosed => period_closed(),
            DeleteAdditionError::Other(error) => error.into(),
        }
    }
}

impl From<CreateExpenseError> for ApiError {
    fn from(error: CreateExpenseError) -> Self {
        match error {
            CreateExpenseError::InvalidExpense(context) => bad_request(
                "Invalid expense.",
                reps::ExpenseValidationError::from(context),
            ),
            CreateExpenseError::CategoryNotFound => {
                Self::NotFound(ErrorRep::message("Category not found."))
            }
            CreateExpenseError::PeriodNotFound => {
                Self::NotFound(ErrorRep::message("Period not found."))
            }
            CreateExpenseError::PeriodClosed => Self::Conflict(ErrorRep::message(
                "The period is closed and the expense date is outside its window.",
            )),
            CreateExpenseError::Other(error) => error.into(),
        }
    }
}

impl From<UpdateExpenseError> for ApiError {
    fn from(error: UpdateExpenseError) -> Self {
        match error {
            UpdateExpenseError::InvalidChanges(context) => bad_request(
                "Invalid expense changes.",
                reps::ExpenseValidationError::from(context),
            ),
            UpdateExpenseError::UnknownCategory => Self::BadRequest(ErrorRep::message(
                "The referenced category does not exist.",
            )),
            UpdateExpenseError::NotFound => {
                Self::NotFound(ErrorRep::message("Expense not found."))
            }
            UpdateExpenseError::PeriodClosed => period_closed(),
            UpdateExpenseError::Other(error) => error.into(),
        }
    }
}

impl From<DeleteExpenseError> for ApiError {
    fn from(error: DeleteExpenseError) -> Self {
        match error {
            DeleteExpenseError::NotFound => {
                Self::NotFound(ErrorRep::message("Expense not found."))
            }
            DeleteExpenseError::PeriodClosed => period_closed(),
            DeleteExpenseError::Other(error) => error.into(),
        }
    }
}

impl From<NewCategoryError> for ApiError {
    fn from(error: NewCategoryError) -> Self {
        match error {
            NewCategoryError::InvalidCategory(context) => bad_request(
                "Invalid category.",
                reps::CategoryValidationError::from(context),
            ),
            NewCategoryError::DuplicateName(name) => Self::Conflict(ErrorRep {
                error: "A category with this name already exists.".to_owned(),
                details: Some(serde_json::json!({ "name": name })),
            }),
            NewCategoryError::Other(error) => error.into(),
        }
    }
}

impl From<UpdateCategoryError> for ApiError {
    fn from(error: UpdateCategoryError) -> Self {
        match error {
            UpdateCategoryError::InvalidChanges(context) => bad_request(
                "Invalid category changes.",
                reps::CategoryValidationError::from(context),
            ),
            UpdateCategoryError::DuplicateName(name) => Self::Conflict(ErrorRep {
                error: "A category with this name already exists.".to_owned(),
                details: Some(serde_json::json!({ "name": name })),
            }),
            UpdateCategoryError::NotFound => {
                Self::NotFound(ErrorRep::message("Category not found."))
            }
            UpdateCategoryError::Other(error) => error.into(),
        }
    }
}

impl From<DeleteCategoryError> for ApiError {
    fn from(error: DeleteCategoryError) -> Self {
        match error {
            DeleteCategoryError::NotFound => {
                Self::NotFound(ErrorRep::message("Category not found."))
            }
            DeleteCategoryError::ReassignmentRequired { expense_count } => {
                Self::BadRequest(ErrorRep {
                    error: "The category has expenses; provide a category to reassign them to."
                        .to_owned(),
                    details: Some(serde_json::json!({ "expenseCount": expense_count })),
                })
            }
            DeleteCategoryError::ReassignmentTargetMissing => Self::BadRequest(
                ErrorRep::message("The reassignment target does not exist."),
            ),
            DeleteCategoryError::ReassignmentTargetSame => Self::BadRequest(ErrorRep::message(
                "Expenses must be reassigned to a different category.",
            )),
            DeleteCategoryError::Other(error) => error.into(),
        }
    }
}
