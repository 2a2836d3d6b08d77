use crate::model::{Id, ObjectType};
use thiserror::Error;

/// Failure taxonomy of the replication engine.
///
/// Export favors graceful degradation (unresolvable seeds are skipped and
/// reported), so only the import/copy paths raise these as hard errors: a
/// half-imported graph would leave dangling references in the store.
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("reference `{field}` on {object_type} '{object_name}' points at {target_id}, which is not present in the destination")]
    DanglingReference {
        object_type: ObjectType,
        object_name: String,
        field: String,
        target_id: Id,
    },

    #[error("destination project {uuid} did not become visible after {attempts} attempts")]
    ProjectNotReady { uuid: String, attempts: u32 },

    #[error("destination {0} not found")]
    DestinationNotFound(Id),
}
