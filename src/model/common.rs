use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Closed set of storable entity kinds.
///
/// The first six variants are *bucketed*: they are written to their own
/// ordinal-prefixed directory during export and replayed in ordinal order
/// during import. The remaining kinds are either owned sub-objects
/// (serialized inside their owner's file) or folders, which get their own
/// depth-keyed bucket family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    ProjectSettings,
    IntegrationConfig,
    System,
    Server,
    CallChain,
    Environment,
    Operation,
    Situation,
    Step,
    Template,
    Transport,
    ParsingRule,
    Folder,
}

/// Bucketed types in replay order: every reference target of a later bucket
/// lives in an earlier bucket or in the same one.
pub const BUCKET_ORDER: [ObjectType; 6] = [
    ObjectType::ProjectSettings,
    ObjectType::IntegrationConfig,
    ObjectType::System,
    ObjectType::Server,
    ObjectType::CallChain,
    ObjectType::Environment,
];

impl ObjectType {
    /// Export bucket ordinal, `None` for owned sub-objects and folders.
    pub fn bucket(&self) -> Option<usize> {
        BUCKET_ORDER.iter().position(|t| t == self)
    }

    pub fn from_bucket(ordinal: usize) -> Option<ObjectType> {
        BUCKET_ORDER.get(ordinal).copied()
    }

    pub fn is_bucketed(&self) -> bool {
        self.bucket().is_some()
    }

    /// Owned sub-objects travel inside their owner's export file and are
    /// reparented through the owner, never through a folder.
    pub fn is_owned(&self) -> bool {
        matches!(
            self,
            ObjectType::Operation
                | ObjectType::Situation
                | ObjectType::Step
                | ObjectType::Template
                | ObjectType::Transport
                | ObjectType::ParsingRule
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ObjectType::ProjectSettings => "project_settings",
            ObjectType::IntegrationConfig => "integration_config",
            ObjectType::System => "system",
            ObjectType::Server => "server",
            ObjectType::CallChain => "call_chain",
            ObjectType::Environment => "environment",
            ObjectType::Operation => "operation",
            ObjectType::Situation => "situation",
            ObjectType::Step => "step",
            ObjectType::Template => "template",
            ObjectType::Transport => "transport",
            ObjectType::ParsingRule => "parsing_rule",
            ObjectType::Folder => "folder",
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Value of a reference field: a single target id or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    One(Id),
    Many(Vec<Id>),
}

impl RefValue {
    pub fn ids(&self) -> Vec<&Id> {
        match self {
            RefValue::One(id) => vec![id],
            RefValue::Many(ids) => ids.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RefValue::One(_) => 1,
            RefValue::Many(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RefValue::Many(ids) if ids.is_empty())
    }

    /// Keep only ids satisfying the predicate; single-valued references
    /// collapse to an empty list when dropped.
    pub fn retain(&self, mut keep: impl FnMut(&Id) -> bool) -> RefValue {
        match self {
            RefValue::One(id) if keep(id) => RefValue::One(id.clone()),
            RefValue::One(_) => RefValue::Many(Vec::new()),
            RefValue::Many(ids) => {
                RefValue::Many(ids.iter().filter(|id| keep(id)).cloned().collect())
            }
        }
    }
}
