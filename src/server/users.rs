use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use super::AppState;
use crate::{GatewayError, LocalUser, NewUser, UserPatch};

fn require_name(name: &str) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::InvalidInput("name must not be empty".to_string()));
    }
    Ok(())
}

pub(super) async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<LocalUser>>, GatewayError> {
    Ok(Json(state.store.list_users().await?))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<LocalUser>), GatewayError> {
    require_name(&user.name)?;
    let user = state.store.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub(super) async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LocalUser>, GatewayError> {
    state
        .store
        .find_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("user {id}")))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<LocalUser>, GatewayError> {
    if let Some(name) = &patch.name {
        require_name(name)?;
    }
    Ok(Json(state.store.update_user(id, patch).await?))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, GatewayError> {
    state.store.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
