use crate::config::ImportConfig;
use crate::logic::errors::ReplicationError;
use crate::logic::export::{
    bucket_dir_name, ExportManifest, FOLDERS_DIR, MANIFEST_FILE, OBJECTS_DIR,
};
use crate::logic::reference_model::reference_fields;
use crate::model::{
    generate_id, ConfigObject, FolderStub, Id, ImportOptions, ImportOutcome, ObjectType, Project,
    RefValue, ReplacementMap, SerializedObject, BUCKET_ORDER,
};
use crate::store::traits::{ReconciliationSender, ReplicationRole, Store};
use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Replays an export tree into a destination project.
///
/// The whole replay runs under one controlling snapshot transaction: any
/// persistence or resolution failure restores the pre-import state, so a
/// partially imported graph is never visible. Bucket order is load-bearing
/// and strictly sequential.
pub struct ImportDecoder;

impl ImportDecoder {
    pub async fn import<S>(
        store: Arc<S>,
        reconciler: Arc<dyn ReconciliationSender>,
        tree: &Path,
        options: &ImportOptions,
        config: &ImportConfig,
    ) -> Result<ImportOutcome>
    where
        S: Store + 'static,
    {
        let manifest = Self::read_manifest(tree).await?;
        let project_id =
            Self::resolve_destination(store.as_ref(), &options.destination_project, config).await?;
        let project = store
            .get_project(&project_id)
            .await?
            .ok_or_else(|| anyhow!("resolved project {} has no record", project_id))?;

        let cross_project =
            manifest.source_project_id != project.id || options.regenerate_ids;

        let snapshot = store.snapshot().await?;
        store.set_replication_role(ReplicationRole::Replica).await?;

        let result = Self::replay(store.as_ref(), &project, tree, cross_project).await;

        match result {
            Ok(outcome) => {
                store.set_replication_role(ReplicationRole::Primary).await?;
                // Reconciliation of derived, eventually-consistent state
                // (trigger activation and the like) runs after the commit,
                // detached, so a slow consumer cannot hold the import open
                // and its failure cannot roll the import back.
                let roots = outcome.imported_roots.clone();
                let dest = outcome.project_id.clone();
                tokio::spawn(async move {
                    if let Err(err) = reconciler.notify_imported(&dest, &roots).await {
                        log::warn!("post-import reconciliation notice failed: {err:#}");
                    }
                });
                Ok(outcome)
            }
            Err(err) => {
                store
                    .restore(snapshot)
                    .await
                    .context("restoring store after failed import")?;
                store.set_replication_role(ReplicationRole::Primary).await?;
                log::error!("import into {} aborted: {err:#}", project.name);
                Err(err)
            }
        }
    }

    async fn read_manifest(tree: &Path) -> Result<ExportManifest> {
        let raw = tokio::fs::read(tree.join(MANIFEST_FILE))
            .await
            .with_context(|| format!("reading {} in {}", MANIFEST_FILE, tree.display()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Bounded retry over project-uuid resolution. The destination project
    /// may still be provisioning when the import starts; exhausting the
    /// bound is a reported failure, never a hang.
    async fn resolve_destination<S: Store>(
        store: &S,
        uuid: &str,
        config: &ImportConfig,
    ) -> Result<Id> {
        let attempts = config.project_retry_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(id) = store.resolve_project_uuid(uuid).await? {
                return Ok(id);
            }
            if attempt < attempts {
                log::info!(
                    "destination project {} not visible yet (attempt {}/{})",
                    uuid,
                    attempt,
                    attempts
                );
                tokio::time::sleep(std::time::Duration::from_millis(
                    config.project_retry_delay_ms,
                ))
                .await;
            }
        }
        Err(ReplicationError::ProjectNotReady {
            uuid: uuid.to_string(),
            attempts,
        }
        .into())
    }

    async fn replay<S: Store>(
        store: &S,
        project: &Project,
        tree: &Path,
        cross_project: bool,
    ) -> Result<ImportOutcome> {
        let mut replacement = ReplacementMap::new();
        // Original ids seen in already-replayed (or currently replaying)
        // buckets; the original-id fallback may legitimately point at one
        // of these before it is queryable in the store.
        let mut seen_originals: HashSet<Id> = HashSet::new();

        let folders_imported =
            Self::materialize_folders(store, project, tree, cross_project, &mut replacement)
                .await?;

        let mut objects_imported = 0usize;
        let mut imported_roots = Vec::new();

        for object_type in BUCKET_ORDER {
            let dir = tree.join(OBJECTS_DIR).join(bucket_dir_name(object_type));
            let mut trees = Self::read_bucket(&dir).await?;
            if trees.is_empty() {
                continue;
            }
            let started = Instant::now();

            for serialized in &trees {
                for object in serialized.flatten() {
                    seen_originals.insert(object.id.clone());
                }
            }

            if cross_project {
                Self::regenerate_ids(&mut trees, &mut replacement);
            }

            // Invalidate-before-attach: every cross-reference is rewritten
            // before anything from this bucket is persisted. Within one
            // bucket objects may reference each other, which is why the
            // whole working set is loaded first.
            for serialized in &mut trees {
                for object in serialized.flatten_mut() {
                    Self::rewrite_references(store, project, object, &replacement, &seen_originals)
                        .await?;
                }
            }

            for serialized in &mut trees {
                Self::attach_root(store, project, &mut serialized.object, &replacement).await?;
                for object in serialized.flatten_mut() {
                    object.project_id = project.id.clone();
                }
            }

            for serialized in &trees {
                for object in serialized.flatten() {
                    Self::persist(store, object).await?;
                    objects_imported += 1;
                }
                imported_roots.push(serialized.object.id.clone());
            }

            log::info!(
                "import: bucket {} replayed {} file(s) in {:?} ({} ids mapped so far)",
                bucket_dir_name(object_type),
                trees.len(),
                started.elapsed(),
                replacement.len()
            );
        }

        Ok(ImportOutcome {
            project_id: project.id.clone(),
            objects_imported,
            folders_imported,
            imported_roots,
        })
    }

    /// Re-create the folder hierarchy in depth order, ancestors first, and
    /// seed the replacement map with folder identities. Must run before
    /// bucket replay so object parent attachment can resolve folders.
    async fn materialize_folders<S: Store>(
        store: &S,
        project: &Project,
        tree: &Path,
        cross_project: bool,
        replacement: &mut ReplacementMap,
    ) -> Result<usize> {
        let mut imported = 0usize;
        for stub in Self::read_folder_stubs(tree).await? {
            let parent = Self::resolve_folder_parent(project, &stub, replacement)?;

            // Reuse before create: a same-project import finds the folder
            // by id, a repeated cross-project import finds it by name.
            if let Some(existing) = store.get(&stub.id).await? {
                if existing.project_id == project.id
                    && existing.object_type == ObjectType::Folder
                {
                    replacement.insert(stub.id.clone(), existing.id);
                    continue;
                }
            }
            if let Some(existing) = Self::child_folder_named(store, &parent, &stub.name).await? {
                replacement.insert(stub.id.clone(), existing);
                continue;
            }

            let mut folder =
                ConfigObject::new(ObjectType::Folder, project.id.clone(), stub.name.clone());
            if !cross_project {
                folder.id = stub.id.clone();
            }
            folder.parent = Some(parent);
            replacement.insert(stub.id.clone(), folder.id.clone());
            store.insert(folder).await?;
            imported += 1;
        }
        Ok(imported)
    }

    fn resolve_folder_parent(
        project: &Project,
        stub: &FolderStub,
        replacement: &ReplacementMap,
    ) -> Result<Id> {
        if let Some(parent) = &stub.parent {
            if let Some(mapped) = replacement.get(parent) {
                return Ok(mapped.clone());
            }
        }
        project
            .root_folders
            .get(&stub.root_kind)
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "project {} has no {} root folder",
                    project.name,
                    stub.root_kind
                )
            })
    }

    async fn child_folder_named<S: Store>(
        store: &S,
        parent: &Id,
        name: &str,
    ) -> Result<Option<Id>> {
        Ok(store
            .children_of(parent)
            .await?
            .into_iter()
            .find(|c| c.object_type == ObjectType::Folder && c.name == name)
            .map(|c| c.id))
    }

    /// Fresh destination identity for every object of a bucket, owned
    /// sub-objects included, keeping each file's own sub-graph consistent.
    fn regenerate_ids(trees: &mut [SerializedObject], replacement: &mut ReplacementMap) {
        for serialized in trees.iter_mut() {
            for object in serialized.flatten_mut() {
                let fresh = generate_id();
                replacement.insert(object.id.clone(), fresh.clone());
                object.id = fresh;
            }
        }
        // Owned children point at their owner's original id; remap now that
        // the whole sub-tree is renumbered.
        for serialized in trees.iter_mut() {
            for object in serialized.flatten_mut() {
                if let Some(parent) = &object.parent {
                    if let Some(mapped) = replacement.get(parent) {
                        object.parent = Some(mapped.clone());
                    }
                }
            }
        }
    }

    /// Rewrite every declared reference field: the replacement map wins,
    /// and an unmapped original id stands only when it is resolvable in
    /// the destination. Anything else is fatal, since a dangling reference
    /// in the store would break the configuration-object invariant.
    async fn rewrite_references<S: Store>(
        store: &S,
        project: &Project,
        object: &mut ConfigObject,
        replacement: &ReplacementMap,
        seen_originals: &HashSet<Id>,
    ) -> Result<()> {
        for field in reference_fields(object.object_type) {
            let Some(value) = object.references.get(field) else {
                continue;
            };
            let was_single = matches!(value, RefValue::One(_));
            let mut resolved = Vec::with_capacity(value.len());
            for id in value.ids() {
                if let Some(mapped) = replacement.get(id) {
                    resolved.push(mapped.clone());
                } else if seen_originals.contains(id) {
                    resolved.push(id.clone());
                } else if store
                    .get(id)
                    .await?
                    .is_some_and(|target| target.project_id == project.id)
                {
                    resolved.push(id.clone());
                } else {
                    return Err(ReplicationError::DanglingReference {
                        object_type: object.object_type,
                        object_name: object.name.clone(),
                        field: field.to_string(),
                        target_id: id.clone(),
                    }
                    .into());
                }
            }
            let rewritten = if was_single && resolved.len() == 1 {
                RefValue::One(resolved.remove(0))
            } else {
                RefValue::Many(resolved)
            };
            object.references.insert(field.to_string(), rewritten);
        }
        Ok(())
    }

    /// Attach a bucket root to its destination parent: replacement map
    /// first, plain lookup second, the per-type root folder as the final
    /// fallback. Folder-less types attach directly to the project.
    async fn attach_root<S: Store>(
        store: &S,
        project: &Project,
        object: &mut ConfigObject,
        replacement: &ReplacementMap,
    ) -> Result<()> {
        if let Some(parent) = object.parent.clone() {
            if let Some(mapped) = replacement.get(&parent) {
                object.parent = Some(mapped.clone());
                return Ok(());
            }
            if let Some(existing) = store.get(&parent).await? {
                if existing.project_id == project.id {
                    return Ok(());
                }
            }
        }
        object.parent = project.root_folders.get(&object.object_type).cloned();
        Ok(())
    }

    async fn persist<S: Store>(store: &S, object: &ConfigObject) -> Result<()> {
        if store.get(&object.id).await?.is_some() {
            store.update(object.clone()).await
        } else {
            store.insert(object.clone()).await
        }
    }

    async fn read_folder_stubs(tree: &Path) -> Result<Vec<FolderStub>> {
        let folders_root = tree.join(FOLDERS_DIR);
        if !folders_root.exists() {
            return Ok(Vec::new());
        }
        let mut depths: Vec<(usize, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&folders_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(depth) = name.parse::<usize>() {
                depths.push((depth, entry.path()));
            }
        }
        depths.sort_by_key(|(depth, _)| *depth);

        let mut stubs = Vec::new();
        for (_, dir) in depths {
            for path in Self::json_files(&dir).await? {
                let raw = tokio::fs::read(&path).await?;
                let stub: FolderStub = serde_json::from_slice(&raw)
                    .with_context(|| format!("decoding folder stub {}", path.display()))?;
                stubs.push(stub);
            }
        }
        Ok(stubs)
    }

    async fn read_bucket(dir: &Path) -> Result<Vec<SerializedObject>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut trees = Vec::new();
        for path in Self::json_files(dir).await? {
            let raw = tokio::fs::read(&path).await?;
            let tree: SerializedObject = serde_json::from_slice(&raw)
                .with_context(|| format!("decoding object file {}", path.display()))?;
            trees.push(tree);
        }
        Ok(trees)
    }

    async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
