//! Workflow error types

use std::io;

use sheetlabel_mip::MipError;
use sheetlabel_table::TableError;
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for workflow operations
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

/// Errors from a workflow run. Collaborator errors pass through as-is.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Classification(#[from] MipError),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
