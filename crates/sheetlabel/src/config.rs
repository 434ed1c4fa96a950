//! Run configuration.
//!
//! Loaded from TOML, then overridden from the environment. Every field has
//! a default except the credentials, the acting user and the label id,
//! which [`Config::validate`] checks before anything touches the network.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetlabel_mip::{AssignmentMethod, CacheStorageType, ClientSecret, GraphEndpoints};
use thiserror::Error;

/// Environment variable overriding `application.client_id`
pub const ENV_CLIENT_ID: &str = "SHEETLABEL_CLIENT_ID";
/// Environment variable overriding `application.client_secret`
pub const ENV_CLIENT_SECRET: &str = "SHEETLABEL_CLIENT_SECRET";
/// Environment variable overriding `application.tenant_id`
pub const ENV_TENANT_ID: &str = "SHEETLABEL_TENANT_ID";
/// Environment variable overriding `user.identity`
pub const ENV_USER: &str = "SHEETLABEL_USER";
/// Environment variable overriding `label.id`
pub const ENV_LABEL_ID: &str = "SHEETLABEL_LABEL_ID";

/// Errors loading or checking a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Full run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub application: ApplicationConfig,
    pub user: UserConfig,
    pub label: LabelConfig,
    pub output: OutputConfig,
    pub profile: ProfileConfig,
    pub endpoints: EndpointsConfig,
}

/// Registered application and its credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub client_id: String,
    pub name: String,
    pub version: String,
    pub tenant_id: String,
    pub client_secret: ClientSecret,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            name: "sheetlabel".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tenant_id: String::new(),
            client_secret: ClientSecret::default(),
        }
    }
}

/// The user the engine acts for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub identity: String,
    /// Locale for label names and tooltips
    pub locale: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            locale: "es-ES".to_string(),
        }
    }
}

/// Label to apply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub id: String,
    pub method: AssignmentMethod,
    /// Needed when the file already carries a more sensitive label
    pub justification: Option<String>,
}

/// Where the spreadsheet goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub file_name: String,
    pub sheet_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_name: "Employees.xlsx".to_string(),
            sheet_name: "Employees".to_string(),
        }
    }
}

impl OutputConfig {
    /// Output path made absolute against `cwd`
    pub fn resolve(&self, cwd: &Path) -> PathBuf {
        let path = self.directory.join(&self.file_name);
        if path.is_absolute() {
            path
        } else {
            let joined = cwd.join(path);
            // Drop `.` components so the printed path stays readable
            joined.components().collect()
        }
    }
}

/// Profile cache and logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub data_dir: PathBuf,
    pub cache_storage: CacheStorageType,
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("mip_data"),
            cache_storage: CacheStorageType::OnDisk,
            log_level: "info".to_string(),
        }
    }
}

/// Service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub authority: String,
    pub label_service: String,
    pub resource_scope: String,
    pub timeout_secs: u64,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        let graph = GraphEndpoints::default();
        Self {
            authority: graph.authority,
            label_service: graph.label_service,
            resource_scope: graph.resource_scope,
            timeout_secs: graph.timeout.as_secs(),
        }
    }
}

impl EndpointsConfig {
    pub fn to_graph_endpoints(&self) -> GraphEndpoints {
        GraphEndpoints {
            authority: self.authority.clone(),
            label_service: self.label_service.clone(),
            resource_scope: self.resource_scope.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl Config {
    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// TOML rendering of this configuration
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply the `SHEETLABEL_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_CLIENT_ID) {
            self.application.client_id = v;
        }
        if let Some(v) = get(ENV_CLIENT_SECRET) {
            self.application.client_secret = ClientSecret::new(v);
        }
        if let Some(v) = get(ENV_TENANT_ID) {
            self.application.tenant_id = v;
        }
        if let Some(v) = get(ENV_USER) {
            self.user.identity = v;
        }
        if let Some(v) = get(ENV_LABEL_ID) {
            self.label.id = v;
        }
    }

    /// Check the settings a run cannot default
    pub fn validate(&self) -> ConfigResult<()> {
        self.validate_credentials()?;
        if self.label.id.trim().is_empty() {
            return Err(ConfigError::Missing("label.id"));
        }
        Ok(())
    }

    /// Check what is needed to reach the label service
    pub fn validate_credentials(&self) -> ConfigResult<()> {
        let required = [
            ("application.client_id", self.application.client_id.as_str()),
            ("application.tenant_id", self.application.tenant_id.as_str()),
            ("application.client_secret", self.application.client_secret.expose()),
            ("user.identity", self.user.identity.as_str()),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(ConfigError::Missing(name)),
            None => Ok(()),
        }
    }
}
