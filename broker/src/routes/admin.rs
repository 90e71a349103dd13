use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::error::ApiError;
use serde::Deserialize;

use crate::auth_mw::{Authed, RequireAuth};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    is_admin: bool,
}

#[derive(Deserialize)]
pub struct RemoveUserRequest {
    username: String,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    username: String,
    password: String,
}

fn require_admin(authed: &auth::AuthedUser) -> Result<(), ApiErrorResponse> {
    if authed.is_admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden.into())
    }
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<CreateUserRequest>,
) -> Result<Authed<StatusCode>, ApiErrorResponse> {
    let authed = auth.0;
    require_admin(&authed)?;
    state.auth.create_user(&req.username, &req.password, req.is_admin).await?;
    Ok(Authed::new(&authed, StatusCode::CREATED))
}

pub async fn remove_user(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<RemoveUserRequest>,
) -> Result<Authed<StatusCode>, ApiErrorResponse> {
    let authed = auth.0;
    require_admin(&authed)?;
    state.auth.remove_user(&req.username).await?;
    Ok(Authed::new(&authed, StatusCode::NO_CONTENT))
}

pub async fn set_password(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Authed<StatusCode>, ApiErrorResponse> {
    let authed = auth.0;
    require_admin(&authed)?;
    state.auth.set_password(&req.username, &req.password).await?;
    Ok(Authed::new(&authed, StatusCode::NO_CONTENT))
}
