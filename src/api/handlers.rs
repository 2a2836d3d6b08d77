use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::logic::{CopyMoveOrchestrator, ExportEncoder, ImportDecoder, ReplicationError};
use crate::model::{
    generate_id, ConfigObject, CopyMode, CopySession, ExportReport, ExportScope, Id,
    ImportOptions, ImportOutcome, NewObject, NewProject, ObjectUpdate, Project,
};
use crate::store::traits::{ReconciliationSender, Store};

/// Attribution recorded on objects created through the API when no caller
/// identity is supplied.
const API_USER: &str = "api";

pub struct AppState<S> {
    pub store: Arc<S>,
    pub reconciler: Arc<dyn ReconciliationSender>,
    pub config: AppConfig,
}

pub type SharedState<S> = Arc<AppState<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(err: anyhow::Error) -> ApiError {
    match err.downcast_ref::<ReplicationError>() {
        Some(ReplicationError::ProjectNotReady { .. }) => {
            error(StatusCode::GATEWAY_TIMEOUT, format!("{err:#}"))
        }
        Some(ReplicationError::DanglingReference { .. }) => {
            error(StatusCode::CONFLICT, format!("{err:#}"))
        }
        Some(ReplicationError::DestinationNotFound(_)) => {
            error(StatusCode::NOT_FOUND, format!("{err:#}"))
        }
        _ => error(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn create_project<S: Store>(
    State(state): State<SharedState<S>>,
    Json(new): Json<NewProject>,
) -> ApiResult<Project> {
    state
        .store
        .create_project(new)
        .await
        .map(Json)
        .map_err(internal)
}

pub async fn list_projects<S: Store>(
    State(state): State<SharedState<S>>,
) -> ApiResult<ListResponse<Project>> {
    let items = state.store.list_projects().await.map_err(internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_project<S: Store>(
    State(state): State<SharedState<S>>,
    Path(project_id): Path<Id>,
) -> ApiResult<Project> {
    match state.store.get_project(&project_id).await.map_err(internal)? {
        Some(project) => Ok(Json(project)),
        None => Err(error(
            StatusCode::NOT_FOUND,
            format!("project {} not found", project_id),
        )),
    }
}

pub async fn create_object<S: Store>(
    State(state): State<SharedState<S>>,
    Path(project_id): Path<Id>,
    Json(new): Json<NewObject>,
) -> ApiResult<ConfigObject> {
    if state
        .store
        .get_project(&project_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(error(
            StatusCode::NOT_FOUND,
            format!("project {} not found", project_id),
        ));
    }
    let object = new.into_object(project_id, API_USER.to_string());
    state
        .store
        .insert(object.clone())
        .await
        .map_err(internal)?;
    Ok(Json(object))
}

pub async fn get_object<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<ConfigObject> {
    match state.store.get(&id).await.map_err(internal)? {
        Some(object) => Ok(Json(object)),
        None => Err(error(
            StatusCode::NOT_FOUND,
            format!("object {} not found", id),
        )),
    }
}

pub async fn update_object<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<Id>,
    Json(update): Json<ObjectUpdate>,
) -> ApiResult<ConfigObject> {
    let Some(mut object) = state.store.get(&id).await.map_err(internal)? else {
        return Err(error(
            StatusCode::NOT_FOUND,
            format!("object {} not found", id),
        ));
    };
    object.apply_update(update, API_USER.to_string());
    state
        .store
        .update(object.clone())
        .await
        .map_err(internal)?;
    Ok(Json(object))
}

pub async fn delete_object<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<Id>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(
            StatusCode::NOT_FOUND,
            format!("object {} not found", id),
        ))
    }
}

pub async fn list_children<S: Store>(
    State(state): State<SharedState<S>>,
    Path(id): Path<Id>,
) -> ApiResult<ListResponse<ConfigObject>> {
    let items = state.store.children_of(&id).await.map_err(internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub scope: ExportScope,
    /// Subdirectory under the configured export root; generated if absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Export directory names are caller-supplied; anything that could climb
/// out of the configured export root is rejected.
fn valid_export_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && !name.contains("..")
}

pub async fn export_project<S: Store>(
    State(state): State<SharedState<S>>,
    Path(project_id): Path<Id>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<ExportReport> {
    if request.scope.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "export scope is empty"));
    }
    let dir = match request.name {
        Some(name) if !valid_export_name(&name) => {
            return Err(error(
                StatusCode::BAD_REQUEST,
                "export name must be a plain directory name",
            ));
        }
        Some(name) => name,
        None => generate_id(),
    };
    let dest = PathBuf::from(&state.config.export.root_dir).join(dir);
    ExportEncoder::encode(state.store.as_ref(), &project_id, &request.scope, &dest)
        .await
        .map(Json)
        .map_err(internal)
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Path of a previously written export tree.
    pub path: String,
    pub destination_project: String,
    #[serde(default)]
    pub regenerate_ids: bool,
}

pub async fn import_tree<S: Store + 'static>(
    State(state): State<SharedState<S>>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<ImportOutcome> {
    let tree = PathBuf::from(&request.path);
    let options = ImportOptions {
        destination_project: request.destination_project,
        regenerate_ids: request.regenerate_ids,
    };
    ImportDecoder::import(
        state.store.clone(),
        state.reconciler.clone(),
        &tree,
        &options,
        &state.config.import,
    )
    .await
    .map(Json)
    .map_err(internal)
}

#[derive(Debug, Deserialize)]
pub struct CopyMoveRequest {
    pub sources: Vec<Id>,
    pub destination: Id,
    pub mode: CopyMode,
}

pub async fn copy_or_move<S: Store>(
    State(state): State<SharedState<S>>,
    Json(request): Json<CopyMoveRequest>,
) -> ApiResult<ListResponse<ConfigObject>> {
    let mut session = CopySession::new(generate_id());
    let items = CopyMoveOrchestrator::copy_or_move(
        state.store.as_ref(),
        &request.sources,
        &request.destination,
        request.mode,
        &mut session,
    )
    .await
    .map_err(internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_names_cannot_escape_the_export_root() {
        assert!(valid_export_name("nightly-replica"));
        assert!(valid_export_name("release-2026-08"));
        assert!(!valid_export_name("../../etc"));
        assert!(!valid_export_name("a/b"));
        assert!(!valid_export_name("a\\b"));
        assert!(!valid_export_name(".."));
        assert!(!valid_export_name(""));
    }
}
