use crate::model::{ConfigObject, Id, NewProject, ObjectType, Project};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Store role during bulk load. `Replica` suppresses automatic propagation
/// side-effects (audit-field refresh, cascading notifications) so imported
/// objects land exactly as serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationRole {
    Primary,
    Replica,
}

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, new: NewProject) -> Result<Project>;
    async fn get_project(&self, id: &Id) -> Result<Option<Project>>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    /// Map an external project uuid to the store-internal id. Returns `None`
    /// while the project is still being provisioned; callers retry with a
    /// bounded backoff.
    async fn resolve_project_uuid(&self, uuid: &str) -> Result<Option<Id>>;
    /// Per-kind root folder of a project.
    async fn root_folder(&self, project_id: &Id, kind: ObjectType) -> Result<Option<Id>>;
}

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, id: &Id) -> Result<Option<ConfigObject>>;
    async fn find_by_name(
        &self,
        project_id: &Id,
        object_type: ObjectType,
        name: &str,
    ) -> Result<Option<ConfigObject>>;
    /// Direct children (owned sub-objects or folder members), name-ordered.
    async fn children_of(&self, id: &Id) -> Result<Vec<ConfigObject>>;
    async fn insert(&self, object: ConfigObject) -> Result<()>;
    async fn update(&self, object: ConfigObject) -> Result<()>;
    /// Delete an object and its owned sub-tree.
    async fn delete(&self, id: &Id) -> Result<bool>;
    async fn list_by_type(
        &self,
        project_id: &Id,
        object_type: ObjectType,
    ) -> Result<Vec<ConfigObject>>;
}

/// Outcome of the store-level tree copy primitive.
#[derive(Debug, Clone)]
pub struct CopyOutcome {
    pub root: ConfigObject,
    /// Original id → copy id for every object in the copied sub-tree.
    pub id_map: HashMap<Id, Id>,
}

#[async_trait::async_trait]
pub trait CopyStore: Send + Sync {
    /// Duplicate `source` and its owned sub-tree under `destination`,
    /// assigning fresh ids. References still point at the originals; the
    /// orchestrator's fix-up pass rewires them.
    async fn copy_tree(&self, destination: &Id, source: &Id) -> Result<CopyOutcome>;
    /// Reparent `source` (with its sub-tree) under `destination` in place.
    async fn move_tree(&self, destination: &Id, source: &Id) -> Result<ConfigObject>;
}

#[async_trait::async_trait]
pub trait ReplicationControl: Send + Sync {
    async fn set_replication_role(&self, role: ReplicationRole) -> Result<()>;
    async fn replication_role(&self) -> Result<ReplicationRole>;
}

/// Controlling-transaction surface for stores without native transactions:
/// the import takes a snapshot up front and restores it on any failure, so
/// a partial bucket never becomes visible.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    type Snapshot: Send;
    async fn snapshot(&self) -> Result<Self::Snapshot>;
    async fn restore(&self, snapshot: Self::Snapshot) -> Result<()>;
}

pub trait Store:
    ProjectStore + ObjectStore + CopyStore + ReplicationControl + SnapshotStore + Send + Sync
{
}

/// Fire-and-forget notification channel for post-import reconciliation
/// (trigger re-sync and similar eventually-consistent follow-ups). Delivery
/// is at-least-once; failures must never roll back the import.
#[async_trait::async_trait]
pub trait ReconciliationSender: Send + Sync {
    async fn notify_imported(&self, project_id: &Id, imported_roots: &[Id]) -> Result<()>;
}
