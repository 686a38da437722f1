//! Scene graph errors.

use crate::element::ElementId;
use crate::matrix::MatrixError;
use thiserror::Error;

/// Errors returned by structural store mutations.
///
/// A failed mutation leaves the tree exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("Element not found: {0}")]
    UnknownElement(ElementId),
    #[error("Parent not found: {0}")]
    DanglingReference(ElementId),
    #[error("Cannot move {id} into its own subtree ({parent})")]
    CyclicReparent { id: ElementId, parent: ElementId },
    #[error("The root element cannot be moved or removed")]
    RootImmovable,
    #[error("Duplicate element id: {0}")]
    DuplicateId(ElementId),
    #[error("Parent transform of {0} is not invertible")]
    NotInvertible(ElementId),
}

impl SceneError {
    pub(crate) fn from_matrix(err: MatrixError, parent: &str) -> Self {
        match err {
            MatrixError::NotInvertible | MatrixError::NotRigid => {
                SceneError::NotInvertible(parent.to_string())
            }
        }
    }
}
