use axum::{extract::State, routing::get, Json, Router};
use safar_core::user::User;

use crate::error::AppError;
use crate::middleware::Session;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/me", get(me))
}

/// GET /v1/me
async fn me(State(state): State<AppState>, session: Session) -> Result<Json<User>, AppError> {
    let user = state
        .users
        .get_user(session.user_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("No profile for user {}", session.user_id)))?;
    Ok(Json(user))
}
