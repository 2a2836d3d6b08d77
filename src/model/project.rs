use crate::model::{Id, ObjectType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Multi-tenant container for configuration objects. The external `uuid` is
/// the identity the platform hands out; `id` is the store-internal key every
/// object's `project_id` points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Id,
    pub uuid: String,
    pub name: String,
    /// Per-kind root folders, created at provisioning time. Every non-root
    /// entity's folder ancestry terminates in one of these.
    pub root_folders: HashMap<ObjectType, Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    /// Platform-assigned external identity; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}
