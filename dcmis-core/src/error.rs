//! Error taxonomy for repository operations
//!
//! Every operation validates before it mutates, so an error always means
//! nothing was applied (delete-tree reports its partial failures through
//! its return value instead).

use crate::object::{ChangeToken, ObjectId};

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, CmisError>;

/// Errors surfaced by the repository engine
#[derive(Debug, thiserror::Error)]
pub enum CmisError {
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Name constraint violation: {0}")]
    NameConstraintViolation(String),

    #[error("Update conflict on {object_id}: {reason}")]
    UpdateConflict { object_id: ObjectId, reason: String },

    #[error("Versioning error: {0}")]
    Versioning(String),

    #[error("Content stream not supported: {0}")]
    StreamNotSupported(String),

    #[error("Content already exists on {0}")]
    ContentAlreadyExists(ObjectId),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Filter not valid: {0}")]
    FilterNotValid(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Type hierarchy contains a cycle involving: {type_id}")]
    TypeHierarchyCycle { type_id: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fieldless discriminant of [`CmisError`], for bindings that map errors
/// onto protocol status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConstraintViolation,
    NameConstraintViolation,
    UpdateConflict,
    Versioning,
    StreamNotSupported,
    ContentAlreadyExists,
    ObjectNotFound,
    FilterNotValid,
    InvalidArgument,
    NotSupported,
    TypeHierarchyCycle,
    Config,
}

impl CmisError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            CmisError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            CmisError::NameConstraintViolation(_) => ErrorKind::NameConstraintViolation,
            CmisError::UpdateConflict { .. } => ErrorKind::UpdateConflict,
            CmisError::Versioning(_) => ErrorKind::Versioning,
            CmisError::StreamNotSupported(_) => ErrorKind::StreamNotSupported,
            CmisError::ContentAlreadyExists(_) => ErrorKind::ContentAlreadyExists,
            CmisError::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            CmisError::FilterNotValid(_) => ErrorKind::FilterNotValid,
            CmisError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CmisError::NotSupported(_) => ErrorKind::NotSupported,
            CmisError::TypeHierarchyCycle { .. } => ErrorKind::TypeHierarchyCycle,
            CmisError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn constraint(msg: impl Into<String>) -> Self {
        CmisError::ConstraintViolation(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CmisError::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(id: impl std::fmt::Display) -> Self {
        CmisError::ObjectNotFound(id.to_string())
    }

    pub(crate) fn conflict(object_id: &ObjectId, reason: impl Into<String>) -> Self {
        CmisError::UpdateConflict {
            object_id: object_id.clone(),
            reason: reason.into(),
        }
    }

    /// Optimistic concurrency failure
    pub(crate) fn stale_token(
        object_id: &ObjectId,
        expected: ChangeToken,
        actual: ChangeToken,
    ) -> Self {
        Self::conflict(
            object_id,
            format!("expected change token {}, current is {}", expected, actual),
        )
    }
}

impl From<serde_json::Error> for CmisError {
    fn from(e: serde_json::Error) -> Self {
        CmisError::Config(e.to_string())
    }
}

impl From<std::io::Error> for CmisError {
    fn from(e: std::io::Error) -> Self {
        CmisError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_conflict_display_names_tokens() {
        let err = CmisError::stale_token(
            &ObjectId::from("doc-1"),
            ChangeToken::new(7),
            ChangeToken::new(9),
        );
        let msg = err.to_string();
        assert!(msg.contains("doc-1"));
        assert!(msg.contains('7'));
        assert!(msg.contains('9'));
        assert_eq!(err.kind(), ErrorKind::UpdateConflict);
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(CmisError::constraint("x").kind(), ErrorKind::ConstraintViolation);
        assert_eq!(CmisError::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(CmisError::not_found("x").kind(), ErrorKind::ObjectNotFound);
        assert_eq!(
            CmisError::TypeHierarchyCycle { type_id: "t".into() }.kind(),
            ErrorKind::TypeHierarchyCycle
        );
    }
}
