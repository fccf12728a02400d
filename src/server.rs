use std::{sync::Arc, time::Duration};

use axum::{extract::FromRef, Router};
use axum_extra::extract::cookie::Key;
use tower_http::cors::CorsLayer;

use crate::{
    budgeting::services::BudgetService, database::PostgresConnection, repos::DynLedgerRepo,
};

pub struct Options {
    pub database_pool_size: u32,
    pub database_timeout_seconds: u8,
    pub database_url: String,

    pub secret_key: String,
}

#[derive(Clone)]
pub struct AppState {
    budget_service: BudgetService,
    cookie_key: Key,
    db: PostgresConnection,
}

pub async fn serve(opts: Options) -> anyhow::Result<()> {
    let db = PostgresConnection::connect(
        &opts.database_url,
        opts.database_pool_size,
        Duration::from_secs(opts.database_timeout_seconds.into()),
    )
    .await?;

    let ledger_repo: DynLedgerRepo = Arc::new(db.clone());
    let budget_service = BudgetService::new(ledger_repo);

    let state = AppState {
        budget_service,
        cookie_key: Key::derive_from(opts.secret_key.as_bytes()),
        db,
    };

    let app = Router::new()
        .merge(crate::budgeting::http::routes())
        .nest("/authentication", crate::authentication::http::routes())
        // Session cookies require credentialed requests, which rule out
        // wildcard CORS values.
        .layer(CorsLayer::very_permissive())
        .with_state(state);

    axum::Server::bind(&"0.0.0.0:8000".parse().unwrap())
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

impl FromRef<AppState> for BudgetService {
    fn from_ref(state: &AppState) -> Self {
        state.budget_service.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

impl FromRef<AppState> for PostgresConnection {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}
