//! Context pipeline error types.
//!
//! Only structural problems are errors. Integrity issues found while
//! validating fragments are reported as [`crate::chunker::ValidationIssue`]s,
//! and an unsatisfiable token budget is a flag on the fragment or context.

use specweave_tokens::TokenError;
use thiserror::Error;

/// Errors returned by the chunker, optimizer and context manager.
#[derive(Debug, Error)]
pub enum ContextError {
    /// Workflow steps depend on each other in a cycle.
    #[error("cyclic workflow dependency between steps: {}", step_ids.join(", "))]
    CyclicWorkflow {
        /// Sorted ids of the steps on the cycle.
        step_ids: Vec<String>,
    },
    /// A strategy name that no chunking strategy answers to.
    #[error("unknown chunking strategy: {0}")]
    UnknownStrategy(String),
    /// A strategy whose parameters cannot produce fragments.
    #[error("invalid chunking strategy: {0}")]
    InvalidStrategy(String),
    /// Caller input that the operation cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Token estimation failed.
    #[error(transparent)]
    Tokens(#[from] TokenError),
    /// Content could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ContextError {
    /// Whether the error comes from the shape of the document or request
    /// rather than from a failing collaborator.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::CyclicWorkflow { .. } | Self::UnknownStrategy(_))
    }

    /// Element ids involved in the error, if any.
    pub fn element_ids(&self) -> &[String] {
        match self {
            Self::CyclicWorkflow { step_ids } => step_ids,
            _ => &[],
        }
    }
}

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
