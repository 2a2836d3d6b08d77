use crate::model::{Id, ObjectType};
use serde::{Deserialize, Serialize};

/// Named sets of seed ids grouped by entity kind, plus a separate folder
/// scope that seeds closure collection from folder containers directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportScope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub systems: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_chains: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integration_configs: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_settings: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub folders: Vec<Id>,
}

impl ExportScope {
    /// Flatten into (declared type, id) seed descriptors.
    pub fn seeds(&self) -> Vec<SeedRef> {
        let mut out = Vec::new();
        let groups: [(ObjectType, &Vec<Id>); 7] = [
            (ObjectType::ProjectSettings, &self.project_settings),
            (ObjectType::IntegrationConfig, &self.integration_configs),
            (ObjectType::System, &self.systems),
            (ObjectType::Server, &self.servers),
            (ObjectType::CallChain, &self.call_chains),
            (ObjectType::Environment, &self.environments),
            (ObjectType::Folder, &self.folders),
        ];
        for (object_type, ids) in groups {
            for id in ids {
                out.push(SeedRef {
                    object_type,
                    id: id.clone(),
                });
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.seeds().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedRef {
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    pub id: Id,
}

/// Export is re-runnable and advisory, so it reports partial success
/// instead of failing on unresolvable seeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub objects_written: usize,
    pub folders_written: usize,
    /// Seeds that could not be resolved and were excluded.
    pub skipped_seeds: Vec<SeedRef>,
    pub path: String,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.skipped_seeds.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOptions {
    /// External uuid of the destination project.
    pub destination_project: String,
    /// Force id regeneration even when the source project matches, e.g.
    /// when re-importing into a project that already holds a previous copy.
    #[serde(default)]
    pub regenerate_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub project_id: Id,
    pub objects_imported: usize,
    pub folders_imported: usize,
    /// Top-level (bucketed) entity ids as materialized in the destination,
    /// in replay order; also the payload of the reconciliation notice.
    pub imported_roots: Vec<Id>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    Copy,
    Move,
}
