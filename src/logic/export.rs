use crate::logic::closure::ClosureCollector;
use crate::logic::folder_chain::FolderChainCollector;
use crate::model::{
    ClosureSet, ConfigObject, ExportReport, ExportScope, FolderStub, Id, ObjectType, SeedRef,
    SerializedObject,
};
use crate::store::traits::Store;
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Root-level descriptor of an export tree; the import side reads it to
/// decide whether ids must be regenerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    pub source_project_id: Id,
    pub source_project_uuid: String,
    pub exported_at: chrono::DateTime<Utc>,
}

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FOLDERS_DIR: &str = "folders";
pub const OBJECTS_DIR: &str = "objects";

/// Content-stable file name: repeated exports of the same object land on
/// the same path, making export idempotent at the filesystem level.
pub fn file_name_for(id: &Id) -> String {
    let digest = Sha256::digest(id.as_bytes());
    format!("{}.json", hex::encode(digest))
}

pub fn bucket_dir_name(object_type: ObjectType) -> String {
    // Ordinal prefix keeps lexical directory order equal to replay order.
    // Only bucketed types are ever written; 99 keeps the name total.
    format!(
        "{:02}_{}",
        object_type.bucket().unwrap_or(99),
        object_type.label()
    )
}

/// Serializes a closure to the on-disk bucket tree.
pub struct ExportEncoder;

impl ExportEncoder {
    /// Resolve the scope's seeds, collect one shared closure over all of
    /// them, and write the bucket tree under `dest`. Unresolvable seeds are
    /// logged, reported and excluded; the export completes for the rest.
    pub async fn encode<S: Store>(
        store: &S,
        project_id: &Id,
        scope: &ExportScope,
        dest: &Path,
    ) -> Result<ExportReport> {
        let project = store
            .get_project(project_id)
            .await?
            .ok_or_else(|| anyhow!("project {} not found", project_id))?;

        let mut closure = ClosureSet::new();
        let mut skipped: Vec<SeedRef> = Vec::new();

        for seed in scope.seeds() {
            match store.get(&seed.id).await? {
                Some(object) if object.object_type == seed.object_type => {
                    ClosureCollector::collect(store, &object, &mut closure).await?;
                }
                Some(object) => {
                    log::warn!(
                        "export: seed {} is a {}, not a {}; excluded",
                        seed.id,
                        object.object_type,
                        seed.object_type
                    );
                    skipped.push(seed);
                }
                None => {
                    log::warn!("export: seed {} {} not found; excluded", seed.object_type, seed.id);
                    skipped.push(seed);
                }
            }
        }

        log::debug!(
            "export: closure over {} seed(s) collected {} object(s)",
            scope.seeds().len(),
            closure.len()
        );

        let folder_stubs = FolderChainCollector::collect_parent_map(store, &project, &closure).await?;
        let trees = Self::bucketed_trees(store, &closure).await?;

        tokio::fs::create_dir_all(dest).await?;
        let manifest = ExportManifest {
            source_project_id: project.id.clone(),
            source_project_uuid: project.uuid.clone(),
            exported_at: Utc::now(),
        };
        tokio::fs::write(
            dest.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )
        .await?;

        let folders_written = Self::write_folders(dest, &folder_stubs).await?;
        let objects_written = Self::write_objects(dest, &trees).await?;

        log::info!(
            "export: {} objects, {} folders written to {} ({} seeds skipped)",
            objects_written,
            folders_written,
            dest.display(),
            skipped.len()
        );

        Ok(ExportReport {
            objects_written,
            folders_written,
            skipped_seeds: skipped,
            path: dest.display().to_string(),
        })
    }

    /// Assemble one serialized tree per bucketed closure object, with
    /// server bindings pruned to the closure and owned sub-trees attached.
    async fn bucketed_trees<S: Store>(
        store: &S,
        closure: &ClosureSet,
    ) -> Result<Vec<SerializedObject>> {
        let systems_in_scope = closure.ids_of_type(ObjectType::System);

        // Ownership index over the closure itself: every owned child was
        // collected along with its owner, so no store round-trips here.
        let mut children_of: HashMap<Id, Vec<&ConfigObject>> = HashMap::new();
        for object in closure.objects() {
            if object.object_type.is_owned() {
                if let Some(parent) = &object.parent {
                    children_of.entry(parent.clone()).or_default().push(object);
                }
            }
        }
        for members in children_of.values_mut() {
            members.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        }

        let mut trees = Vec::new();
        for object in closure
            .objects()
            .filter(|o| o.object_type.is_bucketed())
            .sorted_by_key(|o| (o.object_type.bucket(), o.id.clone()))
        {
            let mut root = object.clone();
            if root.object_type == ObjectType::Server {
                Self::prune_bindings(store, &mut root, &systems_in_scope).await?;
            }
            trees.push(Self::build_tree(root, &children_of));
        }
        Ok(trees)
    }

    fn build_tree(object: ConfigObject, children_of: &HashMap<Id, Vec<&ConfigObject>>) -> SerializedObject {
        let children = children_of
            .get(&object.id)
            .map(|members| {
                members
                    .iter()
                    .map(|child| Self::build_tree((*child).clone(), children_of))
                    .collect()
            })
            .unwrap_or_default();
        SerializedObject { object, children }
    }

    /// A server's bindings are cross-cutting, not part of the closure
    /// proper: an outbound binding survives only if its target system is in
    /// scope, an inbound binding only if the owning system of its transport
    /// is. Stale bindings must never re-pull systems into the export.
    async fn prune_bindings<S: Store>(
        store: &S,
        server: &mut ConfigObject,
        systems_in_scope: &HashSet<Id>,
    ) -> Result<()> {
        if let Some(outbound) = server.references.get("outbound") {
            let kept = outbound.retain(|system_id| systems_in_scope.contains(system_id));
            if kept.len() < outbound.len() {
                log::debug!(
                    "export: server '{}' dropped {} out-of-scope outbound binding(s)",
                    server.name,
                    outbound.len() - kept.len()
                );
            }
            server.references.insert("outbound".to_string(), kept);
        }

        if let Some(inbound) = server.references.get("inbound").cloned() {
            let mut kept = Vec::new();
            for transport_id in inbound.ids() {
                if Self::transport_owner_in_scope(store, transport_id, systems_in_scope).await? {
                    kept.push(transport_id.clone());
                }
            }
            if kept.len() < inbound.len() {
                log::debug!(
                    "export: server '{}' dropped {} out-of-scope inbound binding(s)",
                    server.name,
                    inbound.len() - kept.len()
                );
            }
            server
                .references
                .insert("inbound".to_string(), crate::model::RefValue::Many(kept));
        }

        Ok(())
    }

    async fn transport_owner_in_scope<S: Store>(
        store: &S,
        transport_id: &Id,
        systems_in_scope: &HashSet<Id>,
    ) -> Result<bool> {
        let Some(transport) = store.get(transport_id).await? else {
            return Ok(false);
        };
        Ok(transport
            .parent
            .as_ref()
            .is_some_and(|owner| systems_in_scope.contains(owner)))
    }

    async fn write_folders(dest: &Path, stubs: &[FolderStub]) -> Result<usize> {
        let mut written = 0;
        for stub in stubs {
            let dir: PathBuf = dest.join(FOLDERS_DIR).join(stub.depth.to_string());
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(file_name_for(&stub.id));
            tokio::fs::write(&path, serde_json::to_vec_pretty(stub)?)
                .await
                .with_context(|| format!("writing folder {}", path.display()))?;
            written += 1;
        }
        Ok(written)
    }

    async fn write_objects(dest: &Path, trees: &[SerializedObject]) -> Result<usize> {
        let mut written = 0;
        for tree in trees {
            let dir = dest
                .join(OBJECTS_DIR)
                .join(bucket_dir_name(tree.object.object_type));
            tokio::fs::create_dir_all(&dir).await?;
            let path = dir.join(file_name_for(&tree.object.id));
            tokio::fs::write(&path, serde_json::to_vec_pretty(tree)?)
                .await
                .with_context(|| format!("writing object {}", path.display()))?;
            written += 1;
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_stable_per_id() {
        let a = file_name_for(&"object-1".to_string());
        let b = file_name_for(&"object-1".to_string());
        let c = file_name_for(&"object-2".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".json"));
    }

    #[test]
    fn bucket_dirs_sort_in_replay_order() {
        let mut dirs: Vec<String> = crate::model::BUCKET_ORDER
            .iter()
            .map(|t| bucket_dir_name(*t))
            .collect();
        let sorted = {
            let mut s = dirs.clone();
            s.sort();
            s
        };
        assert_eq!(dirs, sorted);
        assert_eq!(dirs.remove(0), "00_project_settings");
    }
}
