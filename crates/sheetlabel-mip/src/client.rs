//! The classification client capability

use std::path::Path;

use crate::context::{ApplicationInfo, ClientSecret, ComponentScope, Credential, MipContext};
use crate::engine::{Engine, EngineSettings, Label};
use crate::error::MipResult;
use crate::handler::{CommitOutcome, FileHandler, LabelingOptions, ProtectionSettings};
use crate::profile::{Profile, ProfileSettings};

/// Everything the labeling workflow needs from an information protection
/// service, in the order it is used.
///
/// `initialize` must come first and `shutdown` last; handles obtained from a
/// context must not be used after that context is shut down.
pub trait ClassificationClient {
    /// One-time setup. Fails with `AlreadyInitialized` while a context is live.
    fn initialize(&mut self, scope: ComponentScope) -> MipResult<MipContext>;

    /// Describe the calling application
    fn application_info(
        &self,
        client_id: &str,
        application_name: &str,
        version: &str,
    ) -> ApplicationInfo {
        ApplicationInfo {
            application_id: client_id.to_string(),
            application_name: application_name.to_string(),
            application_version: version.to_string(),
        }
    }

    /// Obtain an access token for the label service (client credentials)
    fn authenticate(
        &mut self,
        app: &ApplicationInfo,
        tenant_id: &str,
        secret: &ClientSecret,
    ) -> MipResult<Credential>;

    /// Establish the cache context engines are added to
    fn load_profile(&mut self, context: &MipContext, settings: &ProfileSettings)
        -> MipResult<Profile>;

    /// Bind a user session to the profile and load its label catalog
    fn add_engine(
        &mut self,
        profile: &Profile,
        settings: &EngineSettings,
        credential: &Credential,
    ) -> MipResult<Engine>;

    /// Open `path` for labeling
    fn open_file_handler(
        &mut self,
        engine: &Engine,
        path: &Path,
        is_editable: bool,
    ) -> MipResult<FileHandler>;

    /// Resolve a label id against the engine's catalog
    fn resolve_label(&mut self, engine: &Engine, label_id: &str) -> MipResult<Label> {
        engine.label_by_id(label_id).cloned()
    }

    /// Stage a label on the handler. Nothing is written until `commit`.
    fn set_label(
        &mut self,
        handler: &mut FileHandler,
        label: &Label,
        options: &LabelingOptions,
        protection: &ProtectionSettings,
    ) -> MipResult<()> {
        handler.stage(label, options, protection)
    }

    /// Write the pending label into the file at `output_path`
    fn commit(
        &mut self,
        engine: &Engine,
        handler: &mut FileHandler,
        output_path: &Path,
    ) -> MipResult<CommitOutcome>;

    /// Release every resource tied to `context`
    fn shutdown(&mut self, context: MipContext) -> MipResult<()>;
}
