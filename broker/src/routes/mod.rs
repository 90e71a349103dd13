pub mod admin;
pub mod batches;
pub mod callback;
pub mod experiments;
pub mod nodes;
pub mod red;
pub mod root;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root::hello))
        .route("/red", post(red::submit_red))
        .route("/experiments", get(experiments::list_experiments))
        .route("/experiments/:id", get(experiments::get_experiment))
        .route("/batches", get(batches::list_batches))
        .route("/batches/:id", get(batches::get_batch).delete(batches::cancel_batch))
        .route("/nodes", get(nodes::list_nodes))
        .route("/callback/:batch_id/:phase", post(callback::callback))
        .route("/admin/create_user", post(admin::create_user))
        .route("/admin/remove_user", post(admin::remove_user))
        .route("/admin/set_password", post(admin::set_password))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
