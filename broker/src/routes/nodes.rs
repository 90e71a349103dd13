use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::model::Node;
use serde::Serialize;
use uuid::Uuid;

use crate::auth_mw::{Authed, RequireAuth};
use crate::error::ApiErrorResponse;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CurrentBatch {
    batch_id: Uuid,
    ram: u64,
}

#[derive(Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    node: Node,
    current_batches: Vec<CurrentBatch>,
}

/// `GET /nodes` (spec §6): every declared node augmented with the batches
/// currently occupying it, for operator visibility into live commitment.
pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    auth: RequireAuth,
) -> Result<Authed<Json<Vec<NodeView>>>, ApiErrorResponse> {
    let authed = auth.0;
    let nodes = state.store.list_nodes().await?;
    let active = state.store.list_active_batches().await?;

    let mut by_node: HashMap<String, Vec<CurrentBatch>> = HashMap::new();
    for batch in active {
        let Some(node_name) = batch.node.clone() else { continue };
        let Some(experiment) = state.store.get_experiment(batch.experiment_id).await? else { continue };
        by_node
            .entry(node_name)
            .or_default()
            .push(CurrentBatch { batch_id: batch.id, ram: experiment.container.ram_mb });
    }

    let views = nodes
        .into_iter()
        .map(|node| {
            let current_batches = by_node.remove(&node.node_name).unwrap_or_default();
            NodeView { node, current_batches }
        })
        .collect();

    Ok(Authed::new(&authed, Json(views)))
}
