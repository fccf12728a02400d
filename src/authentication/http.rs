use axum::{routing::get, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::server::AppState;

use super::Session;

pub fn routes() -> Router<AppState> {
    Router::new().route("/me", get(get_user_info))
}

#[derive(Serialize)]
pub struct UserInfo {
    pub user_id: Uuid,
}

async fn get_user_info(session: Session) -> Json<UserInfo> {
    Json(UserInfo {
        user_id: session.user_id(),
    })
}
