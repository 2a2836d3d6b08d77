use crate::model::{
    generate_id, ConfigObject, Id, NewProject, ObjectType, Project,
};
use crate::store::traits::{
    CopyOutcome, CopyStore, ObjectStore, ProjectStore, ReconciliationSender, ReplicationControl,
    ReplicationRole, SnapshotStore, Store,
};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use uuid::Uuid;

/// Root folder names created at project provisioning, one per kind that
/// lives in a folder tree.
const ROOT_FOLDERS: [(ObjectType, &str); 4] = [
    (ObjectType::System, "Systems"),
    (ObjectType::Server, "Servers"),
    (ObjectType::CallChain, "Call Chains"),
    (ObjectType::Environment, "Environments"),
];

#[derive(Debug, Clone)]
struct StoreState {
    projects: HashMap<Id, Project>,
    objects: HashMap<Id, ConfigObject>,
    role: ReplicationRole,
}

impl StoreState {
    fn children_of(&self, id: &Id) -> Vec<ConfigObject> {
        let mut children: Vec<ConfigObject> = self
            .objects
            .values()
            .filter(|o| o.parent.as_deref() == Some(id.as_str()))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        children
    }

    /// Ids of `root` and its whole sub-tree, owner first.
    fn subtree_ids(&self, root: &Id) -> Vec<Id> {
        let mut out = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(id) = pending.pop() {
            for child in self.children_of(&id) {
                pending.push(child.id);
            }
            out.push(id);
        }
        out
    }
}

/// Embedded store used by the test-automation platform when no external
/// persistence backend is configured. Single `RwLock` over the whole state
/// keeps tree operations (copy, move, snapshot) atomic without internal
/// ordering concerns.
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                projects: HashMap::new(),
                objects: HashMap::new(),
                role: ReplicationRole::Primary,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProjectStore for MemoryStore {
    async fn create_project(&self, new: NewProject) -> Result<Project> {
        let mut state = self.state.write();
        let id = generate_id();
        let uuid = new.uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
        if state.projects.values().any(|p| p.uuid == uuid) {
            bail!("project with uuid {} already exists", uuid);
        }

        let mut root_folders = HashMap::new();
        for (kind, name) in ROOT_FOLDERS {
            let folder = ConfigObject::new(ObjectType::Folder, id.clone(), name);
            root_folders.insert(kind, folder.id.clone());
            state.objects.insert(folder.id.clone(), folder);
        }

        let project = Project {
            id: id.clone(),
            uuid,
            name: new.name,
            root_folders,
            created_at: Utc::now(),
        };
        state.projects.insert(id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: &Id) -> Result<Option<Project>> {
        Ok(self.state.read().projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects: Vec<Project> = self.state.read().projects.values().cloned().collect();
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    async fn resolve_project_uuid(&self, uuid: &str) -> Result<Option<Id>> {
        Ok(self
            .state
            .read()
            .projects
            .values()
            .find(|p| p.uuid == uuid)
            .map(|p| p.id.clone()))
    }

    async fn root_folder(&self, project_id: &Id, kind: ObjectType) -> Result<Option<Id>> {
        Ok(self
            .state
            .read()
            .projects
            .get(project_id)
            .and_then(|p| p.root_folders.get(&kind).cloned()))
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, id: &Id) -> Result<Option<ConfigObject>> {
        Ok(self.state.read().objects.get(id).cloned())
    }

    async fn find_by_name(
        &self,
        project_id: &Id,
        object_type: ObjectType,
        name: &str,
    ) -> Result<Option<ConfigObject>> {
        let state = self.state.read();
        let mut matches: Vec<&ConfigObject> = state
            .objects
            .values()
            .filter(|o| {
                &o.project_id == project_id && o.object_type == object_type && o.name == name
            })
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches.first().map(|o| (*o).clone()))
    }

    async fn children_of(&self, id: &Id) -> Result<Vec<ConfigObject>> {
        Ok(self.state.read().children_of(id))
    }

    async fn insert(&self, mut object: ConfigObject) -> Result<()> {
        let mut state = self.state.write();
        if state.objects.contains_key(&object.id) {
            bail!("object {} already exists", object.id);
        }
        if state.role == ReplicationRole::Primary {
            object.updated_at = Utc::now();
        }
        state.objects.insert(object.id.clone(), object);
        Ok(())
    }

    async fn update(&self, mut object: ConfigObject) -> Result<()> {
        let mut state = self.state.write();
        if !state.objects.contains_key(&object.id) {
            bail!("object {} not found", object.id);
        }
        if state.role == ReplicationRole::Primary {
            object.updated_at = Utc::now();
        }
        state.objects.insert(object.id.clone(), object);
        Ok(())
    }

    async fn delete(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.write();
        if !state.objects.contains_key(id) {
            return Ok(false);
        }
        for victim in state.subtree_ids(id) {
            state.objects.remove(&victim);
        }
        Ok(true)
    }

    async fn list_by_type(
        &self,
        project_id: &Id,
        object_type: ObjectType,
    ) -> Result<Vec<ConfigObject>> {
        let state = self.state.read();
        let mut out: Vec<ConfigObject> = state
            .objects
            .values()
            .filter(|o| &o.project_id == project_id && o.object_type == object_type)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }
}

#[async_trait::async_trait]
impl CopyStore for MemoryStore {
    async fn copy_tree(&self, destination: &Id, source: &Id) -> Result<CopyOutcome> {
        let mut state = self.state.write();
        let destination_obj = state
            .objects
            .get(destination)
            .cloned()
            .ok_or_else(|| anyhow!("copy destination {} not found", destination))?;
        if !state.objects.contains_key(source) {
            bail!("copy source {} not found", source);
        }

        let subtree = state.subtree_ids(source);
        let id_map: HashMap<Id, Id> = subtree
            .iter()
            .map(|id| (id.clone(), generate_id()))
            .collect();

        let now = Utc::now();
        let mut root_copy = None;
        for original_id in &subtree {
            let Some(original) = state.objects.get(original_id).cloned() else {
                continue;
            };
            let mut copy = original.clone();
            copy.id = id_map[original_id].clone();
            copy.project_id = destination_obj.project_id.clone();
            copy.created_at = now;
            copy.updated_at = now;
            copy.parent = if original_id == source {
                Some(destination.clone())
            } else {
                original
                    .parent
                    .as_ref()
                    .map(|p| id_map.get(p).cloned().unwrap_or_else(|| p.clone()))
            };
            if original_id == source {
                root_copy = Some(copy.clone());
            }
            state.objects.insert(copy.id.clone(), copy);
        }

        // Only the map entries are handed back; references inside the
        // copies still point at originals until the orchestrator's fix-up.
        let root = root_copy.ok_or_else(|| anyhow!("copy source {} vanished mid-copy", source))?;
        Ok(CopyOutcome { root, id_map })
    }

    async fn move_tree(&self, destination: &Id, source: &Id) -> Result<ConfigObject> {
        let mut state = self.state.write();
        let destination_obj = state
            .objects
            .get(destination)
            .cloned()
            .ok_or_else(|| anyhow!("move destination {} not found", destination))?;
        let mut moved = state
            .objects
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("move source {} not found", source))?;
        if moved.project_id != destination_obj.project_id {
            bail!("move across projects is not supported; use export/import");
        }
        if state.subtree_ids(source).contains(destination) {
            bail!("cannot move {} under its own subtree", source);
        }
        moved.parent = Some(destination.clone());
        if state.role == ReplicationRole::Primary {
            moved.updated_at = Utc::now();
        }
        state.objects.insert(moved.id.clone(), moved.clone());
        Ok(moved)
    }
}

#[async_trait::async_trait]
impl ReplicationControl for MemoryStore {
    async fn set_replication_role(&self, role: ReplicationRole) -> Result<()> {
        self.state.write().role = role;
        Ok(())
    }

    async fn replication_role(&self) -> Result<ReplicationRole> {
        Ok(self.state.read().role)
    }
}

pub struct MemorySnapshot(StoreState);

#[async_trait::async_trait]
impl SnapshotStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn snapshot(&self) -> Result<MemorySnapshot> {
        Ok(MemorySnapshot(self.state.read().clone()))
    }

    async fn restore(&self, snapshot: MemorySnapshot) -> Result<()> {
        *self.state.write() = snapshot.0;
        Ok(())
    }
}

impl Store for MemoryStore {}

/// Default reconciliation channel: records and logs the notice. Real
/// deployments swap in a message-bus sender; the import only needs the
/// "send" capability.
#[derive(Default)]
pub struct LoggingReconciler {
    notices: Mutex<Vec<(Id, Vec<Id>)>>,
}

impl LoggingReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(Id, Vec<Id>)> {
        self.notices.lock().clone()
    }
}

#[async_trait::async_trait]
impl ReconciliationSender for LoggingReconciler {
    async fn notify_imported(&self, project_id: &Id, imported_roots: &[Id]) -> Result<()> {
        log::info!(
            "reconciliation notice: project {} received {} top-level entities",
            project_id,
            imported_roots.len()
        );
        self.notices
            .lock()
            .push((project_id.clone(), imported_roots.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RefValue;

    #[tokio::test]
    async fn copy_tree_duplicates_the_whole_subtree() {
        let store = MemoryStore::new();
        let project = store
            .create_project(NewProject {
                name: "p".into(),
                uuid: None,
            })
            .await
            .unwrap();
        let root = store
            .root_folder(&project.id, ObjectType::System)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root, project.root_folders[&ObjectType::System]);

        let system = ConfigObject::new(ObjectType::System, project.id.clone(), "sys")
            .with_parent(root.clone());
        let operation = ConfigObject::new(ObjectType::Operation, project.id.clone(), "op")
            .with_parent(system.id.clone());
        store.insert(system.clone()).await.unwrap();
        store.insert(operation.clone()).await.unwrap();

        let outcome = store.copy_tree(&root, &system.id).await.unwrap();
        assert_eq!(outcome.id_map.len(), 2);
        assert_ne!(outcome.root.id, system.id);

        let copied_op_id = outcome.id_map[&operation.id].clone();
        let copied_op = store.get(&copied_op_id).await.unwrap().unwrap();
        assert_eq!(copied_op.parent, Some(outcome.root.id.clone()));
    }

    #[tokio::test]
    async fn snapshot_restore_undoes_mutations() {
        let store = MemoryStore::new();
        let project = store
            .create_project(NewProject {
                name: "p".into(),
                uuid: None,
            })
            .await
            .unwrap();
        let snapshot = store.snapshot().await.unwrap();

        let stray = ConfigObject::new(ObjectType::System, project.id.clone(), "stray")
            .with_reference("templates", RefValue::Many(vec![]));
        let stray_id = stray.id.clone();
        store.insert(stray).await.unwrap();
        assert!(store.get(&stray_id).await.unwrap().is_some());

        store.restore(snapshot).await.unwrap();
        assert!(store.get(&stray_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replica_role_preserves_serialized_audit_fields() {
        let store = MemoryStore::new();
        let project = store
            .create_project(NewProject {
                name: "p".into(),
                uuid: None,
            })
            .await
            .unwrap();

        let mut object = ConfigObject::new(ObjectType::System, project.id.clone(), "sys");
        let frozen = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        object.updated_at = frozen;

        store
            .set_replication_role(ReplicationRole::Replica)
            .await
            .unwrap();
        assert_eq!(
            store.replication_role().await.unwrap(),
            ReplicationRole::Replica
        );
        store.insert(object.clone()).await.unwrap();
        let stored = store.get(&object.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at, frozen);
    }
}
