//! Engines (per-user sessions) and the labels they can apply

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::Identity;
use crate::error::{MipError, MipResult};

/// Reference to a parent label in the catalog hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: String,
}

/// A sensitivity label as published in the tenant catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tooltip: Option<String>,
    /// Ordering weight; higher is more sensitive
    #[serde(default)]
    pub sensitivity: i32,
    #[serde(default)]
    pub parent: Option<ParentRef>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_appliable: bool,
    #[serde(default)]
    pub has_protection: bool,
}

fn default_true() -> bool {
    true
}

impl Label {
    /// An active, appliable label without protection
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            tooltip: None,
            sensitivity: 0,
            parent: None,
            is_active: true,
            is_appliable: true,
            has_protection: false,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: i32) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.id.as_str())
    }
}

/// Settings for `add_engine`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub identity: Identity,
    /// Opaque data the application stores with the engine
    pub client_data: String,
    pub locale: String,
}

impl EngineSettings {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            client_data: String::new(),
            locale: "en-US".to_string(),
        }
    }

    pub fn with_locale<S: Into<String>>(mut self, locale: S) -> Self {
        self.locale = locale.into();
        self
    }
}

/// A user session bound to a profile, holding the label catalog
#[derive(Debug, Clone)]
pub struct Engine {
    id: String,
    profile_id: Uuid,
    settings: EngineSettings,
    tenant_id: String,
    labels: Vec<Label>,
}

impl Engine {
    pub fn new(
        profile_id: Uuid,
        settings: EngineSettings,
        tenant_id: impl Into<String>,
        labels: Vec<Label>,
    ) -> Self {
        Self {
            id: format!("{}:{}", settings.identity, Uuid::new_v4()),
            profile_id,
            settings,
            tenant_id: tenant_id.into(),
            labels,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile_id(&self) -> Uuid {
        self.profile_id
    }

    pub fn identity(&self) -> &Identity {
        &self.settings.identity
    }

    pub fn locale(&self) -> &str {
        &self.settings.locale
    }

    pub fn client_data(&self) -> &str {
        &self.settings.client_data
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// All labels in the catalog, including inactive ones
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Look up an active label by id
    pub fn label_by_id(&self, label_id: &str) -> MipResult<&Label> {
        self.labels
            .iter()
            .find(|l| l.id.eq_ignore_ascii_case(label_id) && l.is_active)
            .ok_or_else(|| MipError::LabelNotFound(label_id.to_string()))
    }
}
