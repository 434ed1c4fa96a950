//! HTTP-backed classification client.
//!
//! Tokens come from the identity platform's client-credentials grant, the
//! label catalog from the label service's per-user sensitivity label
//! listing. Labels are committed as package metadata (see
//! [`metadata`](crate::metadata)).

use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::client::ClassificationClient;
use crate::context::{ApplicationInfo, ClientSecret, ComponentScope, Credential, MipContext};
use crate::engine::{Engine, EngineSettings, Label};
use crate::error::{MipError, MipResult};
use crate::handler::{
    check_commit_policy, CommitOutcome, FileHandler, LabelingOptions, ProtectionSettings,
};
use crate::metadata::{self, CustomProperty, LabelMetadata};
use crate::profile::{CacheLock, CacheStorageType, Consent, Profile, ProfileSettings};

/// Where the client sends its requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoints {
    /// Identity platform authority, e.g. `https://login.microsoftonline.com`
    pub authority: String,
    /// Base URL of the label service
    pub label_service: String,
    /// Scope requested in the token call
    pub resource_scope: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for GraphEndpoints {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            label_service: "https://graph.microsoft.com/beta".to_string(),
            resource_scope: "https://graph.microsoft.com/.default".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Debug, Deserialize)]
struct LabelPage {
    value: Vec<Label>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Error)]
enum CatalogError {
    #[error("label service rejected the credential ({0})")]
    Rejected(StatusCode),

    #[error("label service returned {0}: {1}")]
    Status(StatusCode, String),

    #[error("label service unreachable: {0}")]
    Unreachable(reqwest::Error),

    #[error("invalid label catalog: {0}")]
    Decode(String),
}

/// State that lives between `initialize` and `shutdown`
#[derive(Debug)]
struct LiveContext {
    context_id: Uuid,
    scope: ComponentScope,
    profiles: Vec<Uuid>,
    locks: Vec<CacheLock>,
    engines: usize,
}

/// Real [`ClassificationClient`] over blocking HTTP
#[derive(Debug)]
pub struct GraphClient {
    http: Client,
    endpoints: GraphEndpoints,
    live: Option<LiveContext>,
}

impl GraphClient {
    /// Build the HTTP client. Nothing is sent until `authenticate`.
    pub fn new(endpoints: GraphEndpoints) -> reqwest::Result<Self> {
        let http = Client::builder()
            .timeout(endpoints.timeout)
            .user_agent(concat!("sheetlabel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoints,
            live: None,
        })
    }

    pub fn endpoints(&self) -> &GraphEndpoints {
        &self.endpoints
    }

    fn live(&self) -> MipResult<&LiveContext> {
        self.live.as_ref().ok_or(MipError::NotInitialized)
    }

    fn live_for(&mut self, context_id: Uuid) -> MipResult<&mut LiveContext> {
        match self.live.as_mut() {
            Some(live) if live.context_id == context_id => Ok(live),
            _ => Err(MipError::NotInitialized),
        }
    }

    fn token_url(&self, tenant_id: &str) -> MipResult<Url> {
        let mut url = Url::parse(&self.endpoints.authority)
            .map_err(|e| MipError::Auth(format!("invalid authority URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| MipError::Auth("authority URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([tenant_id, "oauth2", "v2.0", "token"]);
        Ok(url)
    }

    fn labels_url(&self, settings: &EngineSettings) -> MipResult<Url> {
        let mut url = Url::parse(&self.endpoints.label_service)
            .map_err(|e| MipError::Engine(format!("invalid label service URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| MipError::Engine("label service URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([
                "users",
                settings.identity.as_str(),
                "security",
                "informationProtection",
                "sensitivityLabels",
            ]);
        Ok(url)
    }

    fn fetch_labels(
        &self,
        url: Url,
        credential: &Credential,
        locale: &str,
    ) -> Result<Vec<Label>, CatalogError> {
        let mut labels = Vec::new();
        let mut next = Some(url.to_string());

        while let Some(page_url) = next.take() {
            let response = self
                .http
                .get(&page_url)
                .bearer_auth(credential.access_token())
                .header(reqwest::header::ACCEPT_LANGUAGE, locale)
                .send()
                .map_err(CatalogError::Unreachable)?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(CatalogError::Rejected(status));
            }
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(CatalogError::Status(status, body));
            }

            let page: LabelPage = response
                .json()
                .map_err(|e| CatalogError::Decode(e.to_string()))?;
            tracing::debug!(count = page.value.len(), "fetched label page");
            labels.extend(page.value);
            next = page.next_link;
        }

        Ok(labels)
    }

    fn require_file_scope(&self) -> MipResult<()> {
        match self.live()?.scope {
            ComponentScope::File => Ok(()),
            found => Err(MipError::WrongScope {
                required: ComponentScope::File,
                found,
            }),
        }
    }

    /// `<data_dir>/<identity>/labels.json`. The identity must be a plain
    /// directory name.
    fn catalog_cache_path(profile: &Profile, settings: &EngineSettings) -> MipResult<PathBuf> {
        let identity = settings.identity.as_str();
        let mut components = Path::new(identity).components();
        let plain = !identity.contains(['/', '\\'])
            && matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !plain {
            return Err(MipError::Engine(format!(
                "identity '{}' cannot be used as a cache directory name",
                identity
            )));
        }
        Ok(profile.data_dir().join(identity).join("labels.json"))
    }

    fn load_cached_catalog(path: &Path) -> Option<Vec<Label>> {
        let bytes = fs::read(path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn store_catalog(path: &Path, labels: &[Label]) {
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| {
                let json = serde_json::to_vec_pretty(labels)?;
                fs::write(path, json)
            });
        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "failed to cache label catalog");
        }
    }
}

impl ClassificationClient for GraphClient {
    fn initialize(&mut self, scope: ComponentScope) -> MipResult<MipContext> {
        if self.live.is_some() {
            return Err(MipError::AlreadyInitialized);
        }
        let context = MipContext::new(scope);
        self.live = Some(LiveContext {
            context_id: context.id(),
            scope,
            profiles: Vec::new(),
            locks: Vec::new(),
            engines: 0,
        });
        tracing::debug!(context = %context.id(), ?scope, "initialized classification client");
        Ok(context)
    }

    fn authenticate(
        &mut self,
        app: &ApplicationInfo,
        tenant_id: &str,
        secret: &ClientSecret,
    ) -> MipResult<Credential> {
        self.live()?;
        let url = self.token_url(tenant_id)?;
        tracing::info!(tenant = tenant_id, app = %app.application_name, "requesting access token");

        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", app.application_id.as_str()),
                ("client_secret", secret.expose()),
                ("scope", self.endpoints.resource_scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .map_err(|e| MipError::Auth(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<TokenErrorResponse>() {
                Ok(err) if err.error_description.is_empty() => err.error,
                Ok(err) => format!("{}: {}", err.error, err.error_description),
                Err(_) => format!("token endpoint returned {}", status),
            };
            return Err(MipError::Auth(reason));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| MipError::Auth(format!("invalid token response: {}", e)))?;

        Ok(Credential::valid_for(
            token.access_token,
            tenant_id,
            chrono::Duration::seconds(token.expires_in),
        ))
    }

    fn load_profile(
        &mut self,
        context: &MipContext,
        settings: &ProfileSettings,
    ) -> MipResult<Profile> {
        let live = self.live_for(context.id())?;

        if settings.cache_storage == CacheStorageType::OnDisk {
            let lock = CacheLock::acquire(&settings.data_dir)?;
            live.locks.push(lock);
        }

        let profile = Profile::new(context.id(), settings);
        live.profiles.push(profile.id());
        tracing::debug!(
            profile = %profile.id(),
            data_dir = %settings.data_dir.display(),
            storage = ?settings.cache_storage,
            "loaded profile"
        );
        Ok(profile)
    }

    fn add_engine(
        &mut self,
        profile: &Profile,
        settings: &EngineSettings,
        credential: &Credential,
    ) -> MipResult<Engine> {
        let live = self.live()?;
        if live.context_id != profile.context_id() || !live.profiles.contains(&profile.id()) {
            return Err(MipError::Engine(
                "profile does not belong to the live context".into(),
            ));
        }
        if credential.is_expired_at(Utc::now()) {
            return Err(MipError::Engine("access token has expired".into()));
        }

        let url = self.labels_url(settings)?;
        if profile.consent().get_user_consent(url.as_str()) == Consent::Reject {
            return Err(MipError::Engine(format!(
                "consent denied for {}",
                self.endpoints.label_service
            )));
        }

        let on_disk = profile.cache_storage() == CacheStorageType::OnDisk;
        let cache_path = if on_disk {
            Some(Self::catalog_cache_path(profile, settings)?)
        } else {
            None
        };

        let labels = match self.fetch_labels(url, credential, &settings.locale) {
            Ok(labels) => {
                if let Some(cache_path) = &cache_path {
                    Self::store_catalog(cache_path, &labels);
                }
                labels
            }
            Err(CatalogError::Unreachable(e)) if cache_path.is_some() => {
                match cache_path.as_deref().and_then(Self::load_cached_catalog) {
                    Some(labels) => {
                        tracing::warn!(error = %e, "label service unreachable, using cached catalog");
                        labels
                    }
                    None => return Err(MipError::Engine(CatalogError::Unreachable(e).to_string())),
                }
            }
            Err(e) => return Err(MipError::Engine(e.to_string())),
        };

        if let Some(live) = self.live.as_mut() {
            live.engines += 1;
        }

        let engine = Engine::new(
            profile.id(),
            settings.clone(),
            credential.tenant_id(),
            labels,
        );
        tracing::info!(
            engine = engine.id(),
            labels = engine.labels().len(),
            locale = %settings.locale,
            "engine added"
        );
        Ok(engine)
    }

    fn open_file_handler(
        &mut self,
        engine: &Engine,
        path: &Path,
        is_editable: bool,
    ) -> MipResult<FileHandler> {
        self.require_file_scope()?;

        if !path.is_file() {
            return Err(MipError::file_access(path, "file not found"));
        }
        if is_editable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| MipError::file_access(path, e))?;
        }

        let current = metadata::read_label(path).map_err(|e| MipError::file_access(path, e))?;
        if let Some(label) = &current {
            tracing::debug!(label = %label.name, path = %path.display(), "file already labeled");
        }

        Ok(FileHandler::open(engine, path, is_editable, current))
    }

    fn set_label(
        &mut self,
        handler: &mut FileHandler,
        label: &Label,
        options: &LabelingOptions,
        protection: &ProtectionSettings,
    ) -> MipResult<()> {
        self.require_file_scope()?;
        handler.stage(label, options, protection)
    }

    fn commit(
        &mut self,
        engine: &Engine,
        handler: &mut FileHandler,
        output_path: &Path,
    ) -> MipResult<CommitOutcome> {
        self.require_file_scope()?;
        let pending = handler.pending_for_commit(engine)?.clone();
        check_commit_policy(engine, handler, &pending)?;

        if pending.protection.delegated_user_email.is_some() {
            tracing::debug!("delegated owner ignored for a label without protection");
        }

        let action_id = Uuid::new_v4();
        let unchanged = output_path == handler.input_path()
            && handler.current_label().is_some_and(|current| {
                current.enabled && current.label_id.eq_ignore_ascii_case(&pending.label.id)
            });

        if unchanged {
            tracing::info!(label = %pending.label.name, "label already applied");
            handler.mark_committed();
            return Ok(CommitOutcome {
                output_path: output_path.to_path_buf(),
                action_id,
                changed: false,
            });
        }

        let label = LabelMetadata {
            label_id: pending.label.id.clone(),
            name: pending.label.name.clone(),
            enabled: true,
            set_date: Some(Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            method: Some(pending.options.assignment_method.as_str().to_string()),
            site_id: Some(engine.tenant_id().to_string()),
            action_id: Some(action_id.to_string()),
            content_bits: 0,
        };
        let extra: Vec<CustomProperty> = pending
            .options
            .extended_properties
            .iter()
            .map(|(name, value)| CustomProperty::string(name.clone(), value.clone()))
            .collect();

        metadata::stamp_label(handler.input_path(), output_path, &label, &extra)
            .map_err(|e| MipError::Commit(format!("{}: {}", output_path.display(), e)))?;

        handler.mark_committed();
        tracing::info!(
            label = %pending.label.name,
            method = %pending.options.assignment_method,
            path = %output_path.display(),
            "label committed"
        );

        Ok(CommitOutcome {
            output_path: output_path.to_path_buf(),
            action_id,
            changed: true,
        })
    }

    fn shutdown(&mut self, context: MipContext) -> MipResult<()> {
        self.live_for(context.id())?;
        if let Some(live) = self.live.take() {
            tracing::debug!(
                context = %live.context_id,
                scope = ?live.scope,
                profiles = live.profiles.len(),
                engines = live.engines,
                "shutting down classification client"
            );
            // Dropping the locks removes the lock files
            drop(live.locks);
        }
        Ok(())
    }
}
