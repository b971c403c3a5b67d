use thiserror::Error;

use rbac_core::ServiceError;
use rbac_sql::SQLError;

/// RBAC module error type.
#[derive(Debug, Error)]
pub enum RbacError {
    /// A lookup found no matching record.
    #[error("not found: {0}")]
    NotFound(String),

    /// A role name is already claimed by a different identity.
    #[error("name taken: {0}")]
    NameTaken(String),

    /// A permission alias is already claimed by a different identity.
    #[error("alias taken: {0}")]
    AliasTaken(String),

    /// An entity is missing a field its identity is derived from.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("validation: {0}")]
    Validation(String),

    /// The role graph loops back on itself.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// Tree resolution went deeper than the configured bound.
    #[error("tree too deep: exceeded max depth {0}")]
    TreeTooDeep(usize),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<SQLError> for RbacError {
    fn from(e: SQLError) -> Self {
        match e {
            SQLError::Constraint(m) => RbacError::Conflict(m),
            other => RbacError::Storage(other.to_string()),
        }
    }
}

impl From<RbacError> for ServiceError {
    fn from(e: RbacError) -> Self {
        let msg = e.to_string();
        match e {
            RbacError::NotFound(_) => ServiceError::NotFound(msg),
            RbacError::NameTaken(_) | RbacError::AliasTaken(_) | RbacError::Conflict(_) => {
                ServiceError::Conflict(msg)
            }
            RbacError::InvalidIdentity(_)
            | RbacError::Validation(_)
            | RbacError::CycleDetected(_)
            | RbacError::TreeTooDeep(_) => ServiceError::Validation(msg),
            RbacError::Storage(_) => ServiceError::Storage(msg),
            RbacError::Internal(_) => ServiceError::Internal(msg),
        }
    }
}
