use thiserror::Error;

use crate::model::CarnivalId;

/// Infrastructure failure from a [`crate::store::CarnivalStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("carnival {0} disappeared during the transaction")]
    Vanished(CarnivalId),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

#[derive(Debug, Error)]
pub enum CarnivalError {
    #[error("Missing required carnival field(s): {}.", .missing.join(", "))]
    MissingIdentityFields { missing: Vec<&'static str> },
    #[error("A similar manually created carnival already exists for this date.")]
    DuplicateConflict { existing_id: CarnivalId },
    #[error("You must be associated with a club to add a carnival.")]
    NoClub,
    #[error("Carnival {0} not found.")]
    NotFound(CarnivalId),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidMerge(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CarnivalError {
    /// Validation-class errors carry a message meant for the end user.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, CarnivalError::Store(_))
    }
}
