use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::repo_types::User, error::AuthError, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:user_id", get(get_user))
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<User>>, AuthError> {
    let users = state.users.list(params.limit, params.skip).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AuthError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::UserNotFound)?;
    Ok(Json(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_default_to_first_page() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.skip, 0);
        assert_eq!(params.limit, 100);
    }
}
