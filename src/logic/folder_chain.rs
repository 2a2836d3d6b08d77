use crate::model::{ClosureSet, ConfigObject, FolderStub, Id, ObjectType, Project};
use crate::store::traits::Store;
use anyhow::{anyhow, Result};
use std::collections::HashMap;

/// Ancestor-folder collection for everything in a closure.
///
/// Chains are walked upward and cut at the project's per-kind root folders,
/// which always pre-exist in any destination; the stubs carry a depth tag
/// (root child = 0) that later becomes the export parent-bucket ordinal, so
/// ancestors are always written and replayed before descendants.
pub struct FolderChainCollector;

impl FolderChainCollector {
    /// Folder ancestors of one object, nearest first, excluding the
    /// per-kind project root.
    pub async fn ancestor_chain<S: Store>(
        store: &S,
        project: &Project,
        object: &ConfigObject,
    ) -> Result<Vec<FolderStub>> {
        let root_ids: HashMap<&Id, ObjectType> = project
            .root_folders
            .iter()
            .map(|(kind, id)| (id, *kind))
            .collect();

        // Nearest-first folders, without depths; depth is only known once
        // the walk reaches the root.
        let mut folders: Vec<ConfigObject> = Vec::new();
        let mut current = object.parent.clone();
        let mut root_kind = None;

        while let Some(parent_id) = current {
            if let Some(kind) = root_ids.get(&parent_id) {
                root_kind = Some(*kind);
                break;
            }
            let parent = store
                .get(&parent_id)
                .await?
                .ok_or_else(|| anyhow!("broken ancestry: parent {} not found", parent_id))?;
            if parent.object_type == ObjectType::Folder {
                current = parent.parent.clone();
                folders.push(parent);
            } else {
                // Owned sub-object: keep walking through the owner.
                current = parent.parent.clone();
            }
        }

        let root_kind = match root_kind {
            Some(kind) => kind,
            // Folder-less types (project settings, integration configs)
            // attach directly to the project.
            None => return Ok(Vec::new()),
        };

        let chain_len = folders.len();
        Ok(folders
            .into_iter()
            .enumerate()
            .map(|(i, folder)| FolderStub::from_folder(&folder, chain_len - 1 - i, root_kind))
            .collect())
    }

    /// Depth-tagged stub for a folder that is itself part of the closure
    /// (folder-scoped export seeds); its depth is the length of its own
    /// ancestor chain.
    pub async fn stub_for_folder<S: Store>(
        store: &S,
        project: &Project,
        folder: &ConfigObject,
    ) -> Result<Option<FolderStub>> {
        let chain = Self::ancestor_chain(store, project, folder).await?;
        let root_kind = match chain.first() {
            Some(nearest) => nearest.root_kind,
            None => {
                // Direct child of a per-kind root folder.
                match project
                    .root_folders
                    .iter()
                    .find(|(_, id)| folder.parent.as_deref() == Some(id.as_str()))
                {
                    Some((kind, _)) => *kind,
                    None => return Ok(None),
                }
            }
        };
        Ok(Some(FolderStub::from_folder(folder, chain.len(), root_kind)))
    }

    /// Merge the ancestor chains of every object in a closure into one
    /// depth-ordered parent map, deduplicated by folder id.
    pub async fn collect_parent_map<S: Store>(
        store: &S,
        project: &Project,
        closure: &ClosureSet,
    ) -> Result<Vec<FolderStub>> {
        let mut by_id: HashMap<Id, FolderStub> = HashMap::new();
        for object in closure.objects() {
            if object.object_type == ObjectType::Folder {
                if let Some(stub) = Self::stub_for_folder(store, project, object).await? {
                    by_id.entry(stub.id.clone()).or_insert(stub);
                }
            }
            for stub in Self::ancestor_chain(store, project, object).await? {
                by_id.entry(stub.id.clone()).or_insert(stub);
            }
        }
        let mut stubs: Vec<FolderStub> = by_id.into_values().collect();
        stubs.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.id.cmp(&b.id)));
        Ok(stubs)
    }
}
