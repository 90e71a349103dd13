//! `POST /red` intake (spec §4.2): validate, expand into one experiment and
//! N batches, hoist protected values per batch into the trustee, persist,
//! and wake the Controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use chrono::Utc;
use common::error::ApiError;
use common::model::{Batch, BatchState, Experiment, HistoryEntry, RedDocument};
use common::secrets::{HoistResult, hoist_protected_values};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::auth_mw::{Authed, RequireAuth};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

#[derive(Serialize)]
pub struct RedResponse {
    experiment_id: Uuid,
    batch_ids: Vec<Uuid>,
}

pub async fn submit_red(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
    body: Bytes,
) -> Result<Authed<Json<RedResponse>>, ApiErrorResponse> {
    let authed = auth.0;
    let doc: RedDocument = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("malformed RED document: {e}")))?;

    if doc.execution.engine != RedDocument::SUPPORTED_ENGINE {
        return Err(ApiError::Validation(format!("unsupported engine '{}'", doc.execution.engine)).into());
    }
    if doc.container.engine != common::model::ContainerSettings::SUPPORTED_ENGINE {
        return Err(ApiError::Validation(format!("unsupported container engine '{}'", doc.container.engine)).into());
    }

    let now = Utc::now();
    let experiment_id = Uuid::new_v4();
    let experiment = Experiment {
        id: experiment_id,
        username: authed.username.clone(),
        container: doc.container.clone(),
        execution: doc.execution.clone(),
        notifications: doc.notifications.iter().map(|n| n.url.clone()).collect(),
        registration_time: now,
    };

    let mut batches = Vec::with_capacity(doc.batch_count());
    for index in 0..doc.batch_count() {
        let overrides = doc.batches.get(index).cloned().unwrap_or_default();
        let mut inputs = doc.inputs.clone();
        inputs.extend(overrides.inputs);
        let mut outputs = doc.outputs.clone();
        outputs.extend(overrides.outputs);

        let batch_id = Uuid::new_v4();
        let (hoisted_inputs, hoisted_outputs, bundle) = hoist_batch(&batch_id.to_string(), inputs, outputs);

        let secret_bundle_id = if bundle.is_empty() {
            None
        } else {
            state
                .secrets
                .put(bundle)
                .await
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Some(batch_id.to_string())
        };

        batches.push(Batch {
            id: batch_id,
            experiment_id,
            username: authed.username.clone(),
            batch_index: index as u32,
            state: BatchState::Registered,
            node: None,
            history: vec![HistoryEntry {
                state: BatchState::Registered,
                time: now,
                debug_info: vec![],
                node: None,
            }],
            protected_keys_voided: false,
            notifications_sent: false,
            attempts: 0,
            registration_time: now,
            inputs: hoisted_inputs,
            outputs: hoisted_outputs,
            secret_bundle_id,
            gpu_ids: vec![],
        });
    }

    state.store.insert_experiment(&experiment).await?;
    state.store.insert_batches(&batches).await?;
    state.trigger.trigger_scheduler().await;

    let response = RedResponse {
        experiment_id,
        batch_ids: batches.iter().map(|b| b.id).collect(),
    };
    Ok(Authed::new(&authed, Json(response)))
}

/// Walks `inputs`/`outputs` together under one bundle so protected-value
/// references stay unique across both namespaces, then splits the result
/// back apart.
fn hoist_batch(
    bundle_id: &str,
    inputs: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
) -> (BTreeMap<String, Value>, BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut combined = BTreeMap::new();
    combined.insert("inputs".to_string(), Value::Object(inputs.into_iter().collect()));
    combined.insert("outputs".to_string(), Value::Object(outputs.into_iter().collect()));

    let HoistResult { mut document, bundle } = hoist_protected_values(bundle_id, &combined);

    let hoisted_inputs = as_map(document.remove("inputs"));
    let hoisted_outputs = as_map(document.remove("outputs"));
    (hoisted_inputs, hoisted_outputs, bundle)
}

fn as_map(value: Option<Value>) -> BTreeMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}
