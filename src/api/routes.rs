use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use crate::api::handlers::{self, SharedState};
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<SharedState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Project management
        .route("/projects", get(handlers::list_projects::<S>))
        .route("/projects", post(handlers::create_project::<S>))
        .route("/projects/:project_id", get(handlers::get_project::<S>))
        // Object CRUD
        .route(
            "/projects/:project_id/objects",
            post(handlers::create_object::<S>),
        )
        .route("/objects/:id", get(handlers::get_object::<S>))
        .route("/objects/:id", patch(handlers::update_object::<S>))
        .route("/objects/:id", delete(handlers::delete_object::<S>))
        .route("/objects/:id/children", get(handlers::list_children::<S>))
        // Replication
        .route(
            "/projects/:project_id/export",
            post(handlers::export_project::<S>),
        )
        .route("/import", post(handlers::import_tree::<S>))
        .route("/objects/copy-move", post(handlers::copy_or_move::<S>))
}
