use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::error::ApiError;
use common::model::Experiment;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth_mw::{Authed, RequireAuth};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListExperimentsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    skip: i64,
    #[serde(default)]
    username: Option<String>,
}

fn default_limit() -> i64 {
    100
}

pub async fn list_experiments(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Query(q): Query<ListExperimentsQuery>,
) -> Result<Authed<Json<Vec<Experiment>>>, ApiErrorResponse> {
    let authed = auth.0;
    let username = if authed.is_admin { q.username.as_deref() } else { Some(authed.username.as_str()) };
    let experiments = state.store.list_experiments(username, q.limit, q.skip).await?;
    Ok(Authed::new(&authed, Json(experiments)))
}

pub async fn get_experiment(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Authed<Json<Experiment>>, ApiErrorResponse> {
    let authed = auth.0;
    let experiment = state.store.get_experiment(id).await?.ok_or(ApiError::NotFound)?;
    if !authed.is_admin && experiment.username != authed.username {
        return Err(ApiError::Forbidden.into());
    }
    Ok(Authed::new(&authed, Json(experiment)))
}
