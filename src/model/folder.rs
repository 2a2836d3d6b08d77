use crate::model::{ConfigObject, Id, ObjectType};
use serde::{Deserialize, Serialize};

/// Depth-tagged simplified copy of a folder ancestor.
///
/// Carries identity, naming and structural attributes only, never the
/// folder's child set, so re-materializing a chain cannot re-trigger closure
/// collection through a folder edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderStub {
    pub id: Id,
    pub name: String,
    pub project_id: Id,
    /// Original parent folder id; points at the source project's root folder
    /// for depth-zero stubs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,
    /// Number of folder ancestors between this folder and the project root;
    /// doubles as the export parent-bucket ordinal.
    pub depth: usize,
    /// Which per-project root-folder family this folder belongs to.
    pub root_kind: ObjectType,
}

impl FolderStub {
    pub fn from_folder(folder: &ConfigObject, depth: usize, root_kind: ObjectType) -> Self {
        Self {
            id: folder.id.clone(),
            name: folder.name.clone(),
            project_id: folder.project_id.clone(),
            parent: folder.parent.clone(),
            depth,
            root_kind,
        }
    }
}
