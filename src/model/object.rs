use crate::model::{Id, ObjectType, RefValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Default user for records that predate audit tracking
fn default_user() -> String {
    "system".to_string()
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap_or_else(Utc::now)
}

/// Any storable configuration entity.
///
/// Reference fields live in `references`, keyed by the field names the
/// reference model declares for the object's type; everything else the
/// entity carries (template bodies, transport settings, display options)
/// is opaque scalar payload in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigObject {
    pub id: Id,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub project_id: Id,
    /// Folder or owning entity; `None` for objects attached directly to the
    /// project (project settings, integration configs, root folders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub references: BTreeMap<String, RefValue>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,

    #[serde(default = "default_user")]
    pub created_by: String,
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_user")]
    pub updated_by: String,
    #[serde(default = "default_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ConfigObject {
    pub fn new(object_type: ObjectType, project_id: Id, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: crate::model::generate_id(),
            object_type,
            project_id,
            parent: None,
            name: name.into(),
            references: BTreeMap::new(),
            attributes: HashMap::new(),
            created_by: default_user(),
            created_at: now,
            updated_by: default_user(),
            updated_at: now,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<Id>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_reference(mut self, field: impl Into<String>, value: RefValue) -> Self {
        self.references.insert(field.into(), value);
        self
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn text_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

/// Input model for object creation; id and audit fields are assigned
/// server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewObject {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    pub name: String,
    #[serde(default)]
    pub references: BTreeMap<String, RefValue>,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl NewObject {
    pub fn into_object(self, project_id: Id, user_id: String) -> ConfigObject {
        let now = Utc::now();
        ConfigObject {
            id: crate::model::generate_id(),
            object_type: self.object_type,
            project_id,
            parent: self.parent,
            name: self.name,
            references: self.references,
            attributes: self.attributes,
            created_by: user_id.clone(),
            created_at: now,
            updated_by: user_id,
            updated_at: now,
        }
    }
}

/// Partial update for PATCH operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<BTreeMap<String, RefValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<HashMap<String, serde_json::Value>>,
}

impl ConfigObject {
    /// Apply a partial update, preserving the creation audit trail.
    pub fn apply_update(&mut self, update: ObjectUpdate, user_id: String) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(references) = update.references {
            self.references = references;
        }
        if let Some(attributes) = update.attributes {
            self.attributes = attributes;
        }
        self.updated_by = user_id;
        self.updated_at = Utc::now();
    }
}

/// One export leaf file: a bucketed object together with its owned
/// sub-tree, so id regeneration can walk the whole ownership graph of a
/// single file without further store lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedObject {
    pub object: ConfigObject,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedObject>,
}

impl SerializedObject {
    pub fn leaf(object: ConfigObject) -> Self {
        Self {
            object,
            children: Vec::new(),
        }
    }

    /// All objects in the sub-tree, owner first.
    pub fn flatten(&self) -> Vec<&ConfigObject> {
        let mut out = vec![&self.object];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }

    pub fn flatten_mut(&mut self) -> Vec<&mut ConfigObject> {
        let mut out = vec![&mut self.object];
        for child in &mut self.children {
            out.extend(child.flatten_mut());
        }
        out
    }
}
