//! In-memory classification client for tests.
//!
//! Records every call, can be told to fail at any step, and never touches
//! the network. Commits are kept in memory; the file on disk is left as is.

use std::path::{Path, PathBuf};

use chrono::Duration;
use uuid::Uuid;

use crate::client::ClassificationClient;
use crate::context::{ApplicationInfo, ClientSecret, ComponentScope, Credential, MipContext};
use crate::engine::{Engine, EngineSettings, Label};
use crate::error::{MipError, MipResult};
use crate::handler::{check_commit_policy, CommitOutcome, FileHandler, LabelingOptions, ProtectionSettings};
use crate::profile::{Profile, ProfileSettings};

/// Client operations recorded by [`FakeClient`]. `application_info` builds
/// a value and is not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    Authenticate,
    LoadProfile,
    AddEngine,
    OpenFileHandler,
    ResolveLabel,
    SetLabel,
    Commit,
    Shutdown,
}

/// A label committed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCommit {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub label: Label,
    pub options: LabelingOptions,
}

/// Scriptable [`ClassificationClient`]
#[derive(Debug, Default)]
pub struct FakeClient {
    labels: Vec<Label>,
    fail_on: Option<Operation>,
    live_context: Option<Uuid>,
    live_scope: Option<ComponentScope>,
    calls: Vec<Operation>,
    opened: Vec<PathBuf>,
    commits: Vec<FakeCommit>,
    shutdowns: usize,
}

impl FakeClient {
    /// Fake whose catalog holds `labels`
    pub fn new(labels: Vec<Label>) -> Self {
        Self {
            labels,
            ..Default::default()
        }
    }

    /// Fail the given operation with its matching error kind
    pub fn failing_on(mut self, operation: Operation) -> Self {
        self.fail_on = Some(operation);
        self
    }

    /// Every call made, in order
    pub fn calls(&self) -> &[Operation] {
        &self.calls
    }

    pub fn was_called(&self, operation: Operation) -> bool {
        self.calls.contains(&operation)
    }

    /// Paths passed to `open_file_handler`
    pub fn opened_paths(&self) -> &[PathBuf] {
        &self.opened
    }

    pub fn commits(&self) -> &[FakeCommit] {
        &self.commits
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns
    }

    fn record(&mut self, operation: Operation) -> MipResult<()> {
        self.calls.push(operation);
        if operation != Operation::Initialize && self.live_context.is_none() {
            return Err(MipError::NotInitialized);
        }
        if self.fail_on != Some(operation) {
            return Ok(());
        }
        Err(match operation {
            Operation::Initialize => MipError::AlreadyInitialized,
            Operation::Authenticate => MipError::Auth("invalid client secret".into()),
            Operation::LoadProfile => MipError::ProfileLoad("cache unavailable".into()),
            Operation::AddEngine => MipError::Engine("no labeling license".into()),
            Operation::OpenFileHandler => MipError::FileAccess {
                path: PathBuf::from("<fake>"),
                reason: "file is locked".into(),
            },
            Operation::ResolveLabel => MipError::LabelNotFound("<fake>".into()),
            Operation::SetLabel => MipError::Commit("label rejected".into()),
            Operation::Commit => MipError::Commit("policy rejected the label".into()),
            Operation::Shutdown => MipError::ProfileLoad("failed to flush profile cache".into()),
        })
    }

    fn require_file_scope(&self) -> MipResult<()> {
        match self.live_scope {
            Some(ComponentScope::File) | None => Ok(()),
            Some(found) => Err(MipError::WrongScope {
                required: ComponentScope::File,
                found,
            }),
        }
    }
}

impl ClassificationClient for FakeClient {
    fn initialize(&mut self, scope: ComponentScope) -> MipResult<MipContext> {
        self.record(Operation::Initialize)?;
        if self.live_context.is_some() {
            return Err(MipError::AlreadyInitialized);
        }
        let context = MipContext::new(scope);
        self.live_context = Some(context.id());
        self.live_scope = Some(scope);
        Ok(context)
    }

    fn authenticate(
        &mut self,
        _app: &ApplicationInfo,
        tenant_id: &str,
        secret: &ClientSecret,
    ) -> MipResult<Credential> {
        self.record(Operation::Authenticate)?;
        if secret.is_empty() {
            return Err(MipError::Auth("empty client secret".into()));
        }
        Ok(Credential::valid_for("fake-token", tenant_id, Duration::hours(1)))
    }

    fn load_profile(
        &mut self,
        context: &MipContext,
        settings: &ProfileSettings,
    ) -> MipResult<Profile> {
        self.record(Operation::LoadProfile)?;
        if self.live_context != Some(context.id()) {
            return Err(MipError::NotInitialized);
        }
        Ok(Profile::new(context.id(), settings))
    }

    fn add_engine(
        &mut self,
        profile: &Profile,
        settings: &EngineSettings,
        credential: &Credential,
    ) -> MipResult<Engine> {
        self.record(Operation::AddEngine)?;
        Ok(Engine::new(
            profile.id(),
            settings.clone(),
            credential.tenant_id(),
            self.labels.clone(),
        ))
    }

    fn open_file_handler(
        &mut self,
        engine: &Engine,
        path: &Path,
        is_editable: bool,
    ) -> MipResult<FileHandler> {
        self.record(Operation::OpenFileHandler)?;
        self.require_file_scope()?;
        self.opened.push(path.to_path_buf());
        if !path.exists() {
            return Err(MipError::FileAccess {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        Ok(FileHandler::open(engine, path, is_editable, None))
    }

    fn resolve_label(&mut self, engine: &Engine, label_id: &str) -> MipResult<Label> {
        self.record(Operation::ResolveLabel)?;
        engine.label_by_id(label_id).cloned()
    }

    fn set_label(
        &mut self,
        handler: &mut FileHandler,
        label: &Label,
        options: &LabelingOptions,
        protection: &ProtectionSettings,
    ) -> MipResult<()> {
        self.record(Operation::SetLabel)?;
        self.require_file_scope()?;
        handler.stage(label, options, protection)
    }

    fn commit(
        &mut self,
        engine: &Engine,
        handler: &mut FileHandler,
        output_path: &Path,
    ) -> MipResult<CommitOutcome> {
        self.record(Operation::Commit)?;
        self.require_file_scope()?;
        let pending = handler.pending_for_commit(engine)?.clone();
        check_commit_policy(engine, handler, &pending)?;

        self.commits.push(FakeCommit {
            input_path: handler.input_path().to_path_buf(),
            output_path: output_path.to_path_buf(),
            label: pending.label,
            options: pending.options,
        });
        handler.mark_committed();

        Ok(CommitOutcome {
            output_path: output_path.to_path_buf(),
            action_id: Uuid::new_v4(),
            changed: true,
        })
    }

    /// Panics if the context was already shut down: a context is released
    /// exactly once.
    fn shutdown(&mut self, context: MipContext) -> MipResult<()> {
        self.calls.push(Operation::Shutdown);
        assert_eq!(
            self.live_context,
            Some(context.id()),
            "shutdown called for a context that is not live (called twice?)"
        );
        self.shutdowns += 1;
        self.live_context = None;
        self.live_scope = None;

        if self.fail_on == Some(Operation::Shutdown) {
            return Err(MipError::ProfileLoad("failed to flush profile cache".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Identity;

    fn run_until_engine(client: &mut FakeClient) -> MipResult<(MipContext, Engine)> {
        let context = client.initialize(ComponentScope::File)?;
        let app = client.application_info("client", "app", "1.0.0");
        let credential = client.authenticate(&app, "tenant", &ClientSecret::new("s"))?;
        let profile = client.load_profile(&context, &ProfileSettings::new("mip_data", Default::default()))?;
        let engine = client.add_engine(
            &profile,
            &EngineSettings::new(Identity::new("user@contoso.com")),
            &credential,
        )?;
        Ok((context, engine))
    }

    #[test]
    fn test_records_calls_in_order() {
        let mut client = FakeClient::new(vec![Label::new("L1", "Internal")]);
        let (context, engine) = run_until_engine(&mut client).unwrap();
        assert_eq!(client.resolve_label(&engine, "L1").unwrap().name, "Internal");
        client.shutdown(context).unwrap();

        assert_eq!(
            client.calls(),
            &[
                Operation::Initialize,
                Operation::Authenticate,
                Operation::LoadProfile,
                Operation::AddEngine,
                Operation::ResolveLabel,
                Operation::Shutdown,
            ]
        );
        assert_eq!(client.shutdown_count(), 1);
    }

    #[test]
    fn test_injected_failure_kind() {
        let mut client = FakeClient::new(vec![]).failing_on(Operation::AddEngine);
        let err = run_until_engine(&mut client).unwrap_err();
        assert!(matches!(err, MipError::Engine(_)));
    }

    #[test]
    fn test_calls_before_initialize_fail() {
        let mut client = FakeClient::new(vec![]);
        let app = client.application_info("client", "app", "1.0.0");
        let err = client
            .authenticate(&app, "tenant", &ClientSecret::new("s"))
            .unwrap_err();
        assert!(matches!(err, MipError::NotInitialized));
    }

    #[test]
    fn test_policy_scope_cannot_label_files() {
        let mut client = FakeClient::new(vec![Label::new("L1", "Internal")]);
        let context = client.initialize(ComponentScope::Policy).unwrap();
        let engine = Engine::new(
            Uuid::new_v4(),
            EngineSettings::new(Identity::new("user@contoso.com")),
            "tenant",
            vec![Label::new("L1", "Internal")],
        );
        let mut handler = FileHandler::open(&engine, "a.xlsx", true, None);

        let err = client
            .open_file_handler(&engine, Path::new("a.xlsx"), true)
            .unwrap_err();
        assert!(matches!(
            err,
            MipError::WrongScope {
                required: ComponentScope::File,
                found: ComponentScope::Policy
            }
        ));
        let label = Label::new("L1", "Internal");
        assert!(matches!(
            client.set_label(&mut handler, &label, &LabelingOptions::default(), &ProtectionSettings::default()),
            Err(MipError::WrongScope { .. })
        ));
        assert!(matches!(
            client.commit(&engine, &mut handler, Path::new("a.xlsx")),
            Err(MipError::WrongScope { .. })
        ));
        assert!(client.commits().is_empty());
        client.shutdown(context).unwrap();
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_second_shutdown_panics() {
        let mut client = FakeClient::new(vec![]);
        let context = client.initialize(ComponentScope::File).unwrap();
        let stale = MipContext::new(ComponentScope::File);
        client.shutdown(context).unwrap();
        client.shutdown(stale).unwrap();
    }
}
