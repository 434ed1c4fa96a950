//! The write-then-label sequence

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sheetlabel_mip::{
    AcceptAllConsent, ClassificationClient, ComponentScope, ConsentDelegate, EngineSettings,
    Identity, Label, LabelingOptions, ProfileSettings, ProtectionSettings,
};
use sheetlabel_table::{SpreadsheetBuilder, Table};

use crate::config::Config;
use crate::error::WorkflowResult;
use crate::report::{self, RunReport};
use crate::session::Session;

/// Writes a table to disk and labels the result, in one pass.
///
/// The spreadsheet is written before the label service is contacted and is
/// left on disk, unlabeled, if any later step fails.
pub struct Workflow {
    config: Config,
    consent: Arc<dyn ConsentDelegate>,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            consent: Arc::new(AcceptAllConsent),
        }
    }

    /// Use `consent` to approve service endpoints
    pub fn with_consent(mut self, consent: Arc<dyn ConsentDelegate>) -> Self {
        self.consent = consent;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Absolute path the spreadsheet is written to
    pub fn output_path(&self) -> WorkflowResult<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(self.config.output.resolve(&cwd))
    }

    /// Write `table`, then label the file.
    ///
    /// Prints `Spreadsheet written: <path>` once the file is on disk and
    /// `Label '<name>' applied to <path>` after the commit. The client is
    /// shut down exactly once, whether or not the run succeeds.
    pub fn run<B, C, W>(
        &self,
        table: &Table,
        builder: &B,
        client: &mut C,
        out: &mut W,
    ) -> WorkflowResult<RunReport>
    where
        B: SpreadsheetBuilder + ?Sized,
        C: ClassificationClient,
        W: Write + ?Sized,
    {
        self.config.validate()?;
        let path = self.output_path()?;

        let mut session = Session::start(client, ComponentScope::File)?;

        builder.write_table(table, &self.config.output.sheet_name, &path)?;
        tracing::info!(path = %path.display(), rows = table.len(), "spreadsheet written");
        report::spreadsheet_written(out, &path)?;

        let report = self.apply_label(&mut session, &path)?;
        report::label_applied(out, &report)?;

        session.close()?;
        Ok(report)
    }

    /// Authenticate and fetch the label catalog for the configured user
    pub fn catalog<C: ClassificationClient>(&self, client: &mut C) -> WorkflowResult<Vec<Label>> {
        self.config.validate_credentials()?;
        let mut session = Session::start(client, ComponentScope::Policy)?;

        let credential = {
            let app = &self.config.application;
            let client = session.client();
            let info = client.application_info(&app.client_id, &app.name, &app.version);
            client.authenticate(&info, &app.tenant_id, &app.client_secret)?
        };
        let profile = session.load_profile(&self.profile_settings())?;
        let engine = session
            .client()
            .add_engine(&profile, &self.engine_settings(), &credential)?;

        session.close()?;
        Ok(engine.labels().to_vec())
    }

    fn apply_label<C: ClassificationClient>(
        &self,
        session: &mut Session<'_, C>,
        path: &Path,
    ) -> WorkflowResult<RunReport> {
        let app = &self.config.application;
        let credential = {
            let client = session.client();
            let info = client.application_info(&app.client_id, &app.name, &app.version);
            client.authenticate(&info, &app.tenant_id, &app.client_secret)?
        };
        let profile = session.load_profile(&self.profile_settings())?;

        let client = session.client();
        let engine = client.add_engine(&profile, &self.engine_settings(), &credential)?;
        let mut handler = client.open_file_handler(&engine, path, true)?;
        let label = client.resolve_label(&engine, &self.config.label.id)?;
        tracing::debug!(id = %label.id, name = %label.name, "label resolved");

        let options = LabelingOptions {
            assignment_method: self.config.label.method,
            justification_message: self.config.label.justification.clone(),
            ..Default::default()
        };
        client.set_label(&mut handler, &label, &options, &ProtectionSettings::default())?;
        let outcome = client.commit(&engine, &mut handler, path)?;

        Ok(RunReport {
            path: outcome.output_path,
            label_id: label.id,
            label_name: label.name,
            assignment_method: options.assignment_method,
            changed: outcome.changed,
        })
    }

    fn profile_settings(&self) -> ProfileSettings {
        let profile = &self.config.profile;
        ProfileSettings::new(&profile.data_dir, profile.cache_storage)
            .with_consent(Arc::clone(&self.consent))
    }

    fn engine_settings(&self) -> EngineSettings {
        EngineSettings::new(Identity::new(self.config.user.identity.as_str()))
            .with_locale(self.config.user.locale.as_str())
    }
}
