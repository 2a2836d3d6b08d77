use crate::model::{ConfigObject, Id, ObjectType};
use std::collections::{HashMap, HashSet};

/// Ephemeral working set of one collect/export operation.
///
/// `visited` is keyed per type and an id is marked *before* its references
/// are walked, which is what guarantees termination on cyclic graphs
/// (mutually embedding call chains, situations triggering each other).
#[derive(Debug, Default)]
pub struct ClosureSet {
    visited: HashMap<ObjectType, HashSet<Id>>,
    objects: HashMap<Id, ConfigObject>,
}

impl ClosureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an id as visited; returns `false` if it was already seen, which
    /// is the caller's cue to stop recursing.
    pub fn mark_visited(&mut self, object_type: ObjectType, id: &Id) -> bool {
        self.visited
            .entry(object_type)
            .or_default()
            .insert(id.clone())
    }

    pub fn insert(&mut self, object: ConfigObject) {
        self.objects.insert(object.id.clone(), object);
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ConfigObject> {
        self.objects.values()
    }

    pub fn objects_of_type(
        &self,
        object_type: ObjectType,
    ) -> impl Iterator<Item = &ConfigObject> {
        self.objects
            .values()
            .filter(move |o| o.object_type == object_type)
    }

    /// Ids of all collected objects of one type, for membership checks
    /// during export pruning.
    pub fn ids_of_type(&self, object_type: ObjectType) -> HashSet<Id> {
        self.objects_of_type(object_type)
            .map(|o| o.id.clone())
            .collect()
    }
}
