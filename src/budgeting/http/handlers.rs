use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    authentication::Session,
    budgeting::services::{BudgetService, DeletedCategory},
    http_err::{ApiError, ApiResponse, ErrorRep},
    server::AppState,
};

use super::reps;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/periods", get(list_periods).post(create_period))
        .route("/periods/current", get(get_current_period))
        .route(
            "/periods/:period_id",
            get(get_period).delete(delete_period),
        )
        .route("/periods/:period_id/close", axum::routing::post(close_period))
        .route(
            "/budget-additions",
            get(list_budget_additions).post(create_budget_addition),
        )
        .route(
            "/budget-additions/:addition_id",
            get(get_budget_addition).delete(delete_budget_addition),
        )
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/:expense_id",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:category_id",
            get(get_category).put(update_category).delete(delete_category),
        )
}

async fn create_period(
    session: Session,
    State(budget_service): State<BudgetService>,
    Json(request): Json<reps::NewPeriodRequest>,
) -> ApiResponse<(StatusCode, Json<reps::PeriodRep>)> {
    let period = budget_service
        .create_period(session.user_id(), request.start_date)
        .await?;

    Ok((StatusCode::CREATED, Json((&period).into())))
}

async fn list_periods(
    session: Session,
    State(budget_service): State<BudgetService>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::PeriodDetailRep>>> {
    match budget_service.list_periods(session.user_id()).await {
        Ok(periods) => Ok(Json(reps::ResourceCollection {
            items: periods.iter().map(Into::into).collect(),
        })),
        Err(error) => {
            error!(?error, "Failed to list periods.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn get_current_period(
    session: Session,
    State(budget_service): State<BudgetService>,
) -> ApiResponse<Json<reps::PeriodDetailRep>> {
    match budget_service.current_period(session.user_id()).await {
        Ok(Some(detail)) => Ok(Json((&detail).into())),
        Ok(None) => Err(ApiError::NotFound(ErrorRep::message("No active period."))),
        Err(error) => {
            error!(?error, "Failed to query for the active period.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn get_period(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(period_id): Path<Uuid>,
) -> ApiResponse<Json<reps::PeriodDetailRep>> {
    match budget_service.get_period(session.user_id(), period_id).await {
        Ok(Some(detail)) => Ok(Json((&detail).into())),
        Ok(None) => Err(ApiError::NotFound(ErrorRep::message("Period not found."))),
        Err(error) => {
            error!(?error, %period_id, "Failed to query for period.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn delete_period(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(period_id): Path<Uuid>,
) -> ApiResponse<StatusCode> {
    budget_service
        .delete_period(session.user_id(), period_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn close_period(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(period_id): Path<Uuid>,
) -> ApiResponse<Json<reps::ClosedPeriodRep>> {
    let (period, summary) = budget_service
        .close_period(session.user_id(), period_id)
        .await?;

    Ok(Json(reps::ClosedPeriodRep {
        period: (&period).into(),
        summary,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordsParams {
    period_id: Option<Uuid>,
}

async fn list_budget_additions(
    session: Session,
    State(budget_service): State<BudgetService>,
    Query(params): Query<RecordsParams>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::BudgetAdditionRep>>> {
    let additions = budget_service
        .list_budget_additions(session.user_id(), params.period_id)
        .await?;

    Ok(Json(reps::ResourceCollection {
        items: additions.iter().map(Into::into).collect(),
    }))
}

async fn create_budget_addition(
    session: Session,
    State(budget_service): State<BudgetService>,
    Json(request): Json<reps::NewBudgetAdditionRequest>,
) -> ApiResponse<(StatusCode, Json<reps::BudgetAdditionRep>)> {
    let addition = budget_service
        .create_budget_addition(session.user_id(), request.into())
        .await?;

    Ok((StatusCode::CREATED, Json((&addition).into())))
}

async fn get_budget_addition(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(addition_id): Path<Uuid>,
) -> ApiResponse<Json<reps::BudgetAdditionRep>> {
    match budget_service
        .get_budget_addition(session.user_id(), addition_id)
        .await
    {
        Ok(Some(addition)) => Ok(Json((&addition).into())),
        Ok(None) => Err(ApiError::NotFound(ErrorRep::message(
            "Budget addition not found.",
        ))),
        Err(error) => {
            error!(?error, %addition_id, "Failed to query for budget addition.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn delete_budget_addition(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(addition_id): Path<Uuid>,
) -> ApiResponse<StatusCode> {
    budget_service
        .delete_budget_addition(session.user_id(), addition_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_expenses(
    session: Session,
    State(budget_service): State<BudgetService>,
    Query(params): Query<RecordsParams>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::ExpenseRep>>> {
    let expenses = budget_service
        .list_expenses(session.user_id(), params.period_id)
        .await?;

    Ok(Json(reps::ResourceCollection {
        items: expenses.iter().map(Into::into).collect(),
    }))
}

async fn create_expense(
    session: Session,
    State(budget_service): State<BudgetService>,
    Json(request): Json<reps::NewExpenseRequest>,
) -> ApiResponse<(StatusCode, Json<reps::CreatedExpenseRep>)> {
    let (expense, spending) = budget_service
        .create_expense(session.user_id(), request.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(reps::CreatedExpenseRep {
            expense: (&expense).into(),
            spending: spending.into(),
        }),
    ))
}

async fn get_expense(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(expense_id): Path<Uuid>,
) -> ApiResponse<Json<reps::ExpenseRep>> {
    match budget_service.get_expense(session.user_id(), expense_id).await {
        Ok(Some(expense)) => Ok(Json((&expense).into())),
        Ok(None) => Err(ApiError::NotFound(ErrorRep::message("Expense not found."))),
        Err(error) => {
            error!(?error, %expense_id, "Failed to query for expense.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn update_expense(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(expense_id): Path<Uuid>,
    Json(request): Json<reps::ExpenseChangesRequest>,
) -> ApiResponse<Json<reps::ExpenseRep>> {
    let expense = budget_service
        .update_expense(session.user_id(), expense_id, request.into())
        .await?;

    Ok(Json((&expense).into()))
}

async fn delete_expense(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(expense_id): Path<Uuid>,
) -> ApiResponse<StatusCode> {
    budget_service
        .delete_expense(session.user_id(), expense_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_categories(
    session: Session,
    State(budget_service): State<BudgetService>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::CategoryRep>>> {
    match budget_service.list_categories(session.user_id()).await {
        Ok(categories) => Ok(Json(reps::ResourceCollection {
            items: categories.iter().map(Into::into).collect(),
        })),
        Err(error) => {
            error!(?error, "Failed to list categories.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn create_category(
    session: Session,
    State(budget_service): State<BudgetService>,
    Json(request): Json<reps::NewCategoryRequest>,
) -> ApiResponse<(StatusCode, Json<reps::CategoryRep>)> {
    let category = budget_service
        .create_category(session.user_id(), request.into())
        .await?;

    Ok((StatusCode::CREATED, Json((&category).into())))
}

async fn get_category(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(category_id): Path<Uuid>,
) -> ApiResponse<Json<reps::CategoryRep>> {
    match budget_service.get_category(session.user_id(), category_id).await {
        Ok(Some(category)) => Ok(Json((&category).into())),
        Ok(None) => Err(ApiError::NotFound(ErrorRep::message("Category not found."))),
        Err(error) => {
            error!(?error, %category_id, "Failed to query for category.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn update_category(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(category_id): Path<Uuid>,
    Json(request): Json<reps::CategoryChangesRequest>,
) -> ApiResponse<Json<reps::CategoryRep>> {
    let category = budget_service
        .update_category(session.user_id(), category_id, request.into())
        .await?;

    Ok(Json((&category).into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteCategoryParams {
    reassign_to: Option<Uuid>,
}

pub enum DeleteCategoryResponse {
    Deleted,
    Reassigned(reps::DeletedCategoryRep),
}

impl IntoResponse for DeleteCategoryResponse {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Deleted => StatusCode::NO_CONTENT.into_response(),
            Self::Reassigned(rep) => (StatusCode::OK, Json(rep)).into_response(),
        }
    }
}

async fn delete_category(
    session: Session,
    State(budget_service): State<BudgetService>,
    Path(category_id): Path<Uuid>,
    Query(params): Query<DeleteCategoryParams>,
) -> ApiResponse<DeleteCategoryResponse> {
    let outcome = budget_service
        .delete_category(session.user_id(), category_id, params.reassign_to)
        .await?;

    Ok(match outcome {
        DeletedCategory::Deleted => DeleteCategoryResponse::Deleted,
        DeletedCategory::Reassigned(count) => {
            DeleteCategoryResponse::Reassigned(reps::DeletedCategoryRep {
                reassigned_expenses: count,
            })
        }
    })
}
