//! `POST /callback/{batchId}/{phase}` (spec §4.2, §4.7): token-gated, not
//! cookie/basic-auth gated — the node agent, not a human, is the caller.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use common::error::{ApiError, FailureReason};
use common::model::{BatchState, CallbackPayload, CallbackPhase, CallbackResultState};
use store::TokenConsumeResult;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiErrorResponse;
use crate::state::AppState;

pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path((batch_id, phase)): Path<(Uuid, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiErrorResponse> {
    let phase = CallbackPhase::parse(&phase).ok_or_else(|| ApiError::Validation(format!("unknown phase '{phase}'")))?;
    let token = headers
        .get("X-Callback-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    match state.store.consume_callback_token(batch_id, phase, token).await? {
        TokenConsumeResult::Invalid => return Err(ApiError::Unauthorized.into()),
        // Idempotent re-delivery of the same phase is a no-op 200, not a 409 (spec §4.2).
        TokenConsumeResult::AlreadyUsed => return Ok(StatusCode::OK),
        TokenConsumeResult::Accepted => {}
    }

    let payload: CallbackPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("malformed callback body: {e}")))?;
    payload.validate_for_phase(phase).map_err(ApiError::Validation)?;

    let batch = state.store.get_batch(batch_id).await?.ok_or(ApiError::NotFound)?;
    let now = Utc::now();

    state
        .store
        .record_callback_fields(
            batch_id,
            payload.inputs.clone().map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null)),
            payload.outputs.clone().map(|m| serde_json::to_value(m).unwrap_or(serde_json::Value::Null)),
        )
        .await?;

    // The first callback of any phase signals the run has actually started.
    if batch.state == BatchState::Scheduled {
        state.store.cas_start_processing(batch_id, now).await?;
    }

    let is_failure = payload.state == CallbackResultState::Failed;
    if is_failure || phase == CallbackPhase::Output {
        let new_state = if is_failure { BatchState::Failed } else { BatchState::Succeeded };
        let reason = is_failure.then(|| FailureReason::Agent {
            message: payload.debug_info.join("; "),
            disable_retry: payload.disable_retry.unwrap_or(false),
        });

        state
            .store
            .cas_terminal(batch_id, &[BatchState::Scheduled, BatchState::Processing], new_state, reason.as_ref(), now)
            .await?;

        // Release the RAM reservation eagerly so a long gap before the next
        // schedule pass doesn't starve other batches; idempotent with Phase
        // C's own release, which clamps at zero (see `commit_node_reservation`).
        if let Some(node_name) = &batch.node {
            if let Some(experiment) = state.store.get_experiment(batch.experiment_id).await? {
                let ram_delta = -(experiment.container.ram_mb as i64);
                if let Err(e) = state.store.commit_node_reservation(node_name, ram_delta, &[], &[]).await {
                    warn!(batch_id = %batch_id, error = %e, "failed to eagerly release ram reservation, Controller will reconcile");
                }
            }
        }
    }

    state.trigger.trigger_scheduler().await;
    Ok(StatusCode::OK)
}
