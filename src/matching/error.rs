//! Error types for the matching engine

use thiserror::Error;

use crate::template::{RuleError, TemplatePath};

/// Errors that can occur during a match run
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    /// Structurally invalid template
    #[error("invalid template {path}: {reason}")]
    TemplateValidation { path: TemplatePath, reason: String },

    /// A required start cell resolved outside the grid
    #[error("start cell of template {path} is outside the grid at ({x}, {y})")]
    OutOfBounds { path: TemplatePath, x: i64, y: i64 },

    /// Tiling produced more tiles than allowed
    #[error("traversal of template {path} exceeded {limit} tiles")]
    TraversalOverflow { path: TemplatePath, limit: usize },

    /// Template tree nests deeper than allowed
    #[error("template {path} exceeds the maximum depth of {limit}")]
    DepthExceeded { path: TemplatePath, limit: usize },

    /// The resolved tree grew beyond the configured number of areas
    #[error("match run exceeded {limit} areas")]
    AreaLimitExceeded { limit: usize },

    /// A computed rule failed
    #[error("rule error in template {path}: {message}")]
    Rule { path: TemplatePath, message: String },

    /// A required template matched nothing
    #[error("required template {path} did not match")]
    Unmatched { path: TemplatePath },
}

impl MatchError {
    /// Create a template validation error
    pub fn validation(path: &TemplatePath, reason: impl Into<String>) -> Self {
        Self::TemplateValidation {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    /// Wrap a rule failure with the template it came from
    pub fn rule(path: &TemplatePath, err: RuleError) -> Self {
        Self::Rule {
            path: path.clone(),
            message: err.message,
        }
    }

    /// Template the error refers to, if any
    pub fn path(&self) -> Option<&TemplatePath> {
        match self {
            Self::TemplateValidation { path, .. }
            | Self::OutOfBounds { path, .. }
            | Self::TraversalOverflow { path, .. }
            | Self::DepthExceeded { path, .. }
            | Self::Rule { path, .. }
            | Self::Unmatched { path } => Some(path),
            Self::AreaLimitExceeded { .. } => None,
        }
    }

    /// Whether the error only invalidates the branch it occurred in
    ///
    /// Validation and resource-ceiling errors always end the run.
    pub fn is_branch_local(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::TraversalOverflow { .. }
                | Self::Rule { .. }
                | Self::Unmatched { .. }
        )
    }
}
