use crate::logic::errors::ReplicationError;
use crate::logic::reference_model::reference_fields;
use crate::model::{ConfigObject, CopyMode, CopySession, Id, ObjectType, RefValue};
use crate::store::traits::Store;
use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Synchronous, single-request counterpart of export/import: duplicates or
/// reparents objects in place, rewiring references through a session-scoped
/// original→copy map instead of an on-disk tree.
pub struct CopyMoveOrchestrator;

impl CopyMoveOrchestrator {
    /// Copy or move `sources` under `destination`. The session map is
    /// purged on every exit path; callers can inspect it only through the
    /// returned roots.
    pub async fn copy_or_move<S: Store>(
        store: &S,
        sources: &[Id],
        destination: &Id,
        mode: CopyMode,
        session: &mut CopySession,
    ) -> Result<Vec<ConfigObject>> {
        let result = Self::run(store, sources, destination, mode, session).await;
        session.clear();
        result
    }

    async fn run<S: Store>(
        store: &S,
        sources: &[Id],
        destination: &Id,
        mode: CopyMode,
        session: &mut CopySession,
    ) -> Result<Vec<ConfigObject>> {
        if store.get(destination).await?.is_none() {
            return Err(ReplicationError::DestinationNotFound(destination.clone()).into());
        }
        match mode {
            CopyMode::Copy => Self::copy_all(store, sources, destination, session).await,
            CopyMode::Move => Self::move_all(store, sources, destination).await,
        }
    }

    async fn copy_all<S: Store>(
        store: &S,
        sources: &[Id],
        destination: &Id,
        session: &mut CopySession,
    ) -> Result<Vec<ConfigObject>> {
        let mut root_ids = Vec::new();

        for source_id in sources {
            let source = store.get(source_id).await?.ok_or_else(|| {
                anyhow!("copy source {} not found", source_id)
            })?;

            let outcome = store.copy_tree(destination, source_id).await?;
            log::debug!(
                "copy session {}: duplicated {} object(s) from {}",
                session.session_id,
                outcome.id_map.len(),
                source_id
            );
            session.record_all(outcome.id_map);

            let mut root = outcome.root;
            let siblings = Self::sibling_names(store, destination, &root.id).await?;
            root.name = copy_name(&source.name, &siblings, &root.id);
            store.update(root.clone()).await?;
            root_ids.push(root.id);
        }

        // Second pass: references that only make sense within the copied
        // set are re-linked to their copies. A situation's parse rules are
        // repointed exactly when the rule itself was copied in this
        // session, i.e. its owner changed as part of the copy.
        for copy_id in session.copied_ids().cloned().collect::<Vec<_>>() {
            let Some(mut object) = store.get(&copy_id).await? else {
                continue;
            };
            if Self::relink_into_session(&mut object, session) {
                store.update(object).await?;
            }
        }

        let mut roots = Vec::with_capacity(root_ids.len());
        for id in root_ids {
            roots.push(
                store
                    .get(&id)
                    .await?
                    .ok_or_else(|| anyhow!("copied root {} vanished", id))?,
            );
        }
        Ok(roots)
    }

    fn relink_into_session(object: &mut ConfigObject, session: &CopySession) -> bool {
        let mut changed = false;
        for field in reference_fields(object.object_type) {
            let Some(value) = object.references.get(field) else {
                continue;
            };
            let remap = |id: &Id| session.copy_of(id).cloned().unwrap_or_else(|| id.clone());
            let rewritten = match value {
                RefValue::One(id) => RefValue::One(remap(id)),
                RefValue::Many(ids) => RefValue::Many(ids.iter().map(remap).collect()),
            };
            if &rewritten != value {
                object.references.insert(field.to_string(), rewritten);
                changed = true;
            }
        }
        changed
    }

    async fn move_all<S: Store>(
        store: &S,
        sources: &[Id],
        destination: &Id,
    ) -> Result<Vec<ConfigObject>> {
        let mut roots = Vec::new();
        for source_id in sources {
            let moved = store.move_tree(destination, source_id).await?;
            Self::fix_moved_situations(store, &moved.id).await?;
            roots.push(
                store
                    .get(&moved.id)
                    .await?
                    .ok_or_else(|| anyhow!("moved object {} vanished", moved.id))?,
            );
        }
        Ok(roots)
    }

    /// After a move, a situation's parse-rule links are kept only when the
    /// rule's owning system is still the situation's own owning system;
    /// links whose rule did not move along are dropped.
    async fn fix_moved_situations<S: Store>(store: &S, moved_root: &Id) -> Result<()> {
        for object in Self::subtree(store, moved_root).await? {
            if object.object_type != ObjectType::Situation {
                continue;
            }
            let Some(rules) = object.references.get("parse_rules").cloned() else {
                continue;
            };
            let situation_owner = Self::owning_system(store, &object).await?;

            let mut kept = Vec::new();
            for rule_id in rules.ids() {
                let rule_owner = match store.get(rule_id).await? {
                    Some(rule) => rule.parent.clone(),
                    None => None,
                };
                match (&rule_owner, &situation_owner) {
                    (Some(owner), Some(current)) if owner == current => {
                        kept.push(rule_id.clone())
                    }
                    _ => log::debug!(
                        "move: situation '{}' dropped parse rule {} owned elsewhere",
                        object.name,
                        rule_id
                    ),
                }
            }

            if kept.len() != rules.len() {
                let mut updated = object.clone();
                updated
                    .references
                    .insert("parse_rules".to_string(), RefValue::Many(kept));
                store.update(updated).await?;
            }
        }
        Ok(())
    }

    /// Nearest System ancestor, walking through owned sub-objects and
    /// folders alike.
    async fn owning_system<S: Store>(store: &S, object: &ConfigObject) -> Result<Option<Id>> {
        let mut current = object.parent.clone();
        while let Some(parent_id) = current {
            match store.get(&parent_id).await? {
                Some(parent) if parent.object_type == ObjectType::System => {
                    return Ok(Some(parent.id))
                }
                Some(parent) => current = parent.parent.clone(),
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    async fn subtree<S: Store>(store: &S, root: &Id) -> Result<Vec<ConfigObject>> {
        let mut out = Vec::new();
        let mut pending = vec![root.clone()];
        while let Some(id) = pending.pop() {
            if let Some(object) = store.get(&id).await? {
                for child in store.children_of(&object.id).await? {
                    pending.push(child.id);
                }
                out.push(object);
            }
        }
        Ok(out)
    }

    async fn sibling_names<S: Store>(
        store: &S,
        destination: &Id,
        exclude: &Id,
    ) -> Result<HashSet<String>> {
        Ok(store
            .children_of(destination)
            .await?
            .into_iter()
            .filter(|c| &c.id != exclude)
            .map(|c| c.name)
            .collect())
    }
}

/// Collision-free display name for a copy.
///
/// Names carry a bracketed numeric suffix that increments per copy; a
/// suffix that is not a representable integer (some callers use arbitrary
/// ids as names) is replaced with the copy's own id instead of failing.
pub fn copy_name(source: &str, existing: &HashSet<String>, copy_id: &Id) -> String {
    match split_bracket_suffix(source) {
        Some((prefix, inner)) => {
            if inner.parse::<i32>().is_ok() {
                next_indexed(prefix.trim_end(), existing)
            } else {
                format!("{}[{}]", prefix, copy_id)
            }
        }
        None => next_indexed(source, existing),
    }
}

fn next_indexed(base: &str, existing: &HashSet<String>) -> String {
    let mut index = 2;
    loop {
        let candidate = format!("{} [{}]", base, index);
        if !existing.contains(&candidate) {
            return candidate;
        }
        index += 1;
    }
}

fn split_bracket_suffix(name: &str) -> Option<(&str, &str)> {
    let stripped = name.strip_suffix(']')?;
    let open = stripped.rfind('[')?;
    Some((&name[..open], &stripped[open + 1..]))
}
