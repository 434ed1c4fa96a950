//! File handlers: pending label state for one file

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Engine, Label};
use crate::error::{MipError, MipResult};
use crate::metadata::LabelMetadata;

/// How a label came to be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Chosen by a user or an application acting for one
    #[default]
    Standard,
    /// Administrative override; skips downgrade justification
    Privileged,
    /// Applied by automatic classification
    Auto,
}

impl AssignmentMethod {
    /// Value recorded in the `Method` label property
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentMethod::Standard => "Standard",
            AssignmentMethod::Privileged => "Privileged",
            AssignmentMethod::Auto => "Auto",
        }
    }
}

impl fmt::Display for AssignmentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options recorded with a label assignment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelingOptions {
    pub assignment_method: AssignmentMethod,
    /// Required when lowering a file's sensitivity with `Standard`
    pub justification_message: Option<String>,
    /// Extra custom properties written alongside the label
    pub extended_properties: Vec<(String, String)>,
}

/// Protection applied with the label. The default applies whatever the
/// label's own policy prescribes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProtectionSettings {
    /// Owner to record when protecting on behalf of another user
    pub delegated_user_email: Option<String>,
}

/// Lifecycle of a file handler.
///
/// `HandlerOpen → LabelPending → Committed`; a file without a handler is
/// unclassified as far as this client is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    HandlerOpen,
    LabelPending,
    Committed,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileState::HandlerOpen => "handler-open",
            FileState::LabelPending => "label-pending",
            FileState::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// Label assignment waiting for `commit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLabel {
    pub label: Label,
    pub options: LabelingOptions,
    pub protection: ProtectionSettings,
}

/// Result of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub output_path: PathBuf,
    pub action_id: Uuid,
    /// False when the file already carried the same label
    pub changed: bool,
}

/// Open handle on one file for one engine
#[derive(Debug)]
pub struct FileHandler {
    id: Uuid,
    engine_id: String,
    input_path: PathBuf,
    editable: bool,
    state: FileState,
    current: Option<LabelMetadata>,
    pending: Option<PendingLabel>,
}

impl FileHandler {
    /// Handler for `input_path`; `current` is the label already on the file
    pub fn open<P: Into<PathBuf>>(
        engine: &Engine,
        input_path: P,
        editable: bool,
        current: Option<LabelMetadata>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine_id: engine.id().to_string(),
            input_path: input_path.into(),
            editable,
            state: FileState::HandlerOpen,
            current,
            pending: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn engine_id(&self) -> &str {
        &self.engine_id
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn is_editable(&self) -> bool {
        self.editable
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    /// Label found on the file when the handler was opened
    pub fn current_label(&self) -> Option<&LabelMetadata> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingLabel> {
        self.pending.as_ref()
    }

    /// Record a label assignment. Allowed until the handler is committed;
    /// a second call replaces the pending label.
    pub fn stage(
        &mut self,
        label: &Label,
        options: &LabelingOptions,
        protection: &ProtectionSettings,
    ) -> MipResult<()> {
        if self.state == FileState::Committed {
            return Err(MipError::InvalidState {
                expected: FileState::HandlerOpen,
                found: self.state,
            });
        }
        if !self.editable {
            return Err(MipError::file_access(
                &self.input_path,
                "handler was opened read-only",
            ));
        }

        self.pending = Some(PendingLabel {
            label: label.clone(),
            options: options.clone(),
            protection: protection.clone(),
        });
        self.state = FileState::LabelPending;
        Ok(())
    }

    /// Pending assignment, checked against the committing engine
    pub fn pending_for_commit(&self, engine: &Engine) -> MipResult<&PendingLabel> {
        if engine.id() != self.engine_id {
            return Err(MipError::Commit(format!(
                "handler belongs to engine '{}', not '{}'",
                self.engine_id,
                engine.id()
            )));
        }
        match (&self.pending, self.state) {
            (Some(pending), FileState::LabelPending) => Ok(pending),
            _ => Err(MipError::InvalidState {
                expected: FileState::LabelPending,
                found: self.state,
            }),
        }
    }

    /// Move to `Committed`. Terminal.
    pub fn mark_committed(&mut self) {
        self.state = FileState::Committed;
    }
}

/// Policy checks shared by adapters before anything is written.
///
/// Rejects labels that cannot be applied, labels carrying a protection
/// template (only metadata is written), and sensitivity downgrades made
/// with `Standard` assignment and no justification.
pub fn check_commit_policy(engine: &Engine, handler: &FileHandler, pending: &PendingLabel) -> MipResult<()> {
    let label = &pending.label;

    if !label.is_appliable {
        return Err(MipError::Commit(format!(
            "label '{}' is a container and cannot be applied",
            label.name
        )));
    }
    if label.has_protection {
        return Err(MipError::Commit(format!(
            "label '{}' requires protection, which this client cannot apply",
            label.name
        )));
    }

    let Some(current) = handler.current_label() else {
        return Ok(());
    };
    if current.label_id.eq_ignore_ascii_case(&label.id) {
        return Ok(());
    }
    let Ok(previous) = engine.label_by_id(&current.label_id) else {
        return Ok(());
    };

    let downgrade = label.sensitivity < previous.sensitivity;
    let justified = pending
        .options
        .justification_message
        .as_deref()
        .is_some_and(|m| !m.trim().is_empty());
    if downgrade && pending.options.assignment_method == AssignmentMethod::Standard && !justified {
        return Err(MipError::Commit(format!(
            "lowering '{}' to '{}' requires a justification message",
            previous.name, label.name
        )));
    }
    Ok(())
}
