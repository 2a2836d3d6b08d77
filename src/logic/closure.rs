use crate::logic::reference_model::{
    self, strong_reference_ids, textual_references, BODY_ATTRIBUTE,
};
use crate::model::{ClosureSet, ConfigObject, ObjectType};
use crate::store::traits::Store;
use anyhow::Result;

/// Transitive closure collection over the typed reference graph.
///
/// The traversal is a worklist loop guarded by the closure's per-type
/// visited sets: an object is marked before its references are walked, so
/// mutually embedding call chains or situations triggering each other
/// terminate with each object collected exactly once. The resulting *set*
/// is independent of traversal order.
pub struct ClosureCollector;

impl ClosureCollector {
    /// Collect `seed` and everything that must travel with it into
    /// `closure`. The same closure can be reused across seeds so shared
    /// objects are collected once.
    pub async fn collect<S: Store>(
        store: &S,
        seed: &ConfigObject,
        closure: &mut ClosureSet,
    ) -> Result<()> {
        let mut pending = vec![seed.clone()];

        while let Some(object) = pending.pop() {
            if !closure.mark_visited(object.object_type, &object.id) {
                continue;
            }

            // Strong reference fields pull their targets in.
            for target_id in strong_reference_ids(&object) {
                if closure.contains(&target_id) {
                    continue;
                }
                match store.get(&target_id).await? {
                    Some(target) => pending.push(target),
                    None => log::warn!(
                        "closure: {} '{}' references missing object {}, skipping",
                        object.object_type,
                        object.name,
                        target_id
                    ),
                }
            }

            // Containment: a system's operations, a chain's steps, a
            // folder's members and sub-folders.
            for child in store.children_of(&object.id).await? {
                pending.push(child);
            }

            // An owned sub-object can enter the closure on its own (a
            // situation reached through an event trigger); its owning
            // top-level entity must travel too, or nothing would carry it
            // through export.
            if object.object_type.is_owned() {
                if let Some(owner) = Self::owning_entity(store, &object).await? {
                    pending.push(owner);
                }
            }

            // Textual load directives in template bodies.
            if object.object_type == ObjectType::Template {
                if let Some(body) = object.text_attribute(BODY_ATTRIBUTE) {
                    for textual in textual_references(body) {
                        match reference_model::resolve_textual(store, &object.project_id, &textual)
                            .await?
                        {
                            Some(target) => pending.push(target),
                            None => log::warn!(
                                "closure: template '{}' loads unresolvable {} '{}', skipping",
                                object.name,
                                textual.target,
                                textual.identifier
                            ),
                        }
                    }
                }
            }

            closure.insert(object);
        }

        Ok(())
    }

    /// Nearest bucketed ancestor of an owned sub-object, skipping other
    /// owned objects on the way up. Stops at folders: an owned object never
    /// sits directly in a folder.
    async fn owning_entity<S: Store>(
        store: &S,
        object: &ConfigObject,
    ) -> Result<Option<ConfigObject>> {
        let mut current = object.parent.clone();
        while let Some(parent_id) = current {
            match store.get(&parent_id).await? {
                Some(parent) if parent.object_type.is_bucketed() => return Ok(Some(parent)),
                Some(parent) if parent.object_type.is_owned() => {
                    current = parent.parent.clone();
                }
                _ => return Ok(None),
            }
        }
        Ok(None)
    }
}
