//! Error types for the classification client

use std::path::PathBuf;

use thiserror::Error;

use crate::context::ComponentScope;
use crate::handler::FileState;

/// Result type alias using [`MipError`]
pub type MipResult<T> = std::result::Result<T, MipError>;

/// Errors surfaced by a [`ClassificationClient`](crate::ClassificationClient).
///
/// Each step of the labeling sequence fails with its own kind so callers can
/// tell which collaborator rejected the run.
#[derive(Debug, Error)]
pub enum MipError {
    /// An operation was called before `initialize` or after `shutdown`
    #[error("Classification client is not initialized")]
    NotInitialized,

    /// `initialize` was called while a context is still live
    #[error("Classification client is already initialized")]
    AlreadyInitialized,

    /// Bad client credentials or tenant mismatch
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Profile cache storage is unavailable or locked
    #[error("Failed to load profile: {0}")]
    ProfileLoad(String),

    /// Session rejected: auth refused, no licensing, expired token, consent denied
    #[error("Failed to add engine: {0}")]
    Engine(String),

    /// Input file missing, locked, or not an OOXML package
    #[error("Cannot access '{}': {reason}", path.display())]
    FileAccess { path: PathBuf, reason: String },

    /// Label id is not in the engine's catalog
    #[error("Label not found: {0}")]
    LabelNotFound(String),

    /// Writing label metadata failed or was rejected by policy
    #[error("Commit failed: {0}")]
    Commit(String),

    /// The live context was initialized for a different scope
    #[error("Operation requires a {required}-scoped context, this one is {found}-scoped")]
    WrongScope {
        required: ComponentScope,
        found: ComponentScope,
    },

    /// A file handler operation was called in the wrong state
    #[error("Invalid file handler state: expected {expected}, found {found}")]
    InvalidState {
        expected: FileState,
        found: FileState,
    },
}

impl MipError {
    pub(crate) fn file_access<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> Self {
        MipError::FileAccess {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
