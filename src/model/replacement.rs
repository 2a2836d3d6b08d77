use crate::model::Id;
use std::collections::HashMap;

/// Source identity → destination identity table, populated incrementally as
/// objects are materialized in the destination and consulted on every
/// reference rewrite.
#[derive(Debug, Default, Clone)]
pub struct ReplacementMap {
    entries: HashMap<Id, Id>,
}

impl ReplacementMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Id, destination: Id) {
        self.entries.insert(source, destination);
    }

    pub fn get(&self, source: &Id) -> Option<&Id> {
        self.entries.get(source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Original → copy tracking for one copy/move request.
///
/// Lifecycle is explicit: created when the request starts, cleared when it
/// ends, success or failure. Concurrent requests each hold their own
/// session, so no cross-request locking is needed.
#[derive(Debug)]
pub struct CopySession {
    pub session_id: Id,
    copies: HashMap<Id, Id>,
}

impl CopySession {
    pub fn new(session_id: impl Into<Id>) -> Self {
        Self {
            session_id: session_id.into(),
            copies: HashMap::new(),
        }
    }

    pub fn record_all(&mut self, pairs: impl IntoIterator<Item = (Id, Id)>) {
        self.copies.extend(pairs);
    }

    pub fn copy_of(&self, original: &Id) -> Option<&Id> {
        self.copies.get(original)
    }

    pub fn copied_ids(&self) -> impl Iterator<Item = &Id> {
        self.copies.values()
    }

    pub fn is_empty(&self) -> bool {
        self.copies.is_empty()
    }

    /// Purge all entries. Called on every exit path of the orchestrator so a
    /// long-lived session registry can never grow without bound.
    pub fn clear(&mut self) {
        self.copies.clear();
    }
}
