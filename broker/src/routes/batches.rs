use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::Utc;
use common::error::ApiError;
use common::model::{Batch, BatchState};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth_mw::{Authed, RequireAuth};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListBatchesQuery {
    state: Option<String>,
    experiment_id: Option<Uuid>,
    #[serde(default)]
    username: Option<String>,
}

pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Query(q): Query<ListBatchesQuery>,
) -> Result<Authed<Json<Vec<Batch>>>, ApiErrorResponse> {
    let authed = auth.0;
    let parsed_state = match q.state.as_deref() {
        Some(s) => Some(BatchState::parse(s).ok_or_else(|| ApiError::Validation(format!("unknown state '{s}'")))?),
        None => None,
    };
    let username = if authed.is_admin { q.username.as_deref() } else { Some(authed.username.as_str()) };
    let batches = state.store.list_batches(parsed_state, q.experiment_id, username).await?;
    Ok(Authed::new(&authed, Json(batches)))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Authed<Json<Batch>>, ApiErrorResponse> {
    let authed = auth.0;
    let batch = state.store.get_batch(id).await?.ok_or(ApiError::NotFound)?;
    if !authed.is_admin && batch.username != authed.username {
        return Err(ApiError::Forbidden.into());
    }
    Ok(Authed::new(&authed, Json(batch)))
}

/// Owner-or-admin cancel (spec §4.2): flips any non-terminal batch to
/// `cancelled` and wakes the Controller so Phase C picks up the release.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    Path(id): Path<Uuid>,
) -> Result<Authed<StatusCode>, ApiErrorResponse> {
    let authed = auth.0;
    let batch = state.store.get_batch(id).await?.ok_or(ApiError::NotFound)?;
    if !authed.is_admin && batch.username != authed.username {
        return Err(ApiError::Forbidden.into());
    }

    let cancelled = state.store.cas_cancel(id, Utc::now()).await?;
    if !cancelled {
        return Err(ApiError::Conflict("batch is already in a terminal state".to_string()).into());
    }
    state.trigger.trigger_scheduler().await;
    Ok(Authed::new(&authed, StatusCode::NO_CONTENT))
}
