//! Process-wide client context and application identity

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which part of the client a context is initialized for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentScope {
    /// File labeling (handlers, commit)
    File,
    /// Policy evaluation only
    Policy,
}

impl fmt::Display for ComponentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentScope::File => f.write_str("file"),
            ComponentScope::Policy => f.write_str("policy"),
        }
    }
}

/// Handle returned by `initialize`, consumed by `shutdown`.
///
/// Deliberately not `Clone`: a context can be shut down once.
#[derive(Debug, PartialEq, Eq)]
pub struct MipContext {
    id: Uuid,
    scope: ComponentScope,
}

impl MipContext {
    /// Create a context with a fresh id
    pub fn new(scope: ComponentScope) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scope(&self) -> ComponentScope {
        self.scope
    }
}

/// Identity of the calling application as registered with the tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub application_id: String,
    pub application_name: String,
    pub application_version: String,
}

/// Application client secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new<S: Into<String>>(secret: S) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for the token request only
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(***)")
    }
}

impl From<&str> for ClientSecret {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Acting user, an email-like identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new<S: Into<String>>(email: S) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bearer token obtained by `authenticate`
#[derive(Clone)]
pub struct Credential {
    access_token: String,
    tenant_id: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new<S: Into<String>, T: Into<String>>(
        access_token: S,
        tenant_id: T,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            tenant_id: tenant_id.into(),
            expires_at,
        }
    }

    /// Token valid for `lifetime` from now
    pub fn valid_for<S: Into<String>, T: Into<String>>(
        access_token: S,
        tenant_id: T,
        lifetime: Duration,
    ) -> Self {
        Self::new(access_token, tenant_id, Utc::now() + lifetime)
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"***")
            .field("tenant_id", &self.tenant_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_redacted() {
        let secret = ClientSecret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "ClientSecret(***)");

        let credential = Credential::valid_for("token-value", "tenant", Duration::minutes(5));
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("token-value"));
        assert!(debug.contains("tenant"));
    }

    #[test]
    fn test_credential_expiry() {
        let now = Utc::now();
        let credential = Credential::new("t", "tenant", now + Duration::seconds(10));
        assert!(!credential.is_expired_at(now));
        assert!(credential.is_expired_at(now + Duration::seconds(10)));
    }

    #[test]
    fn test_contexts_are_distinct() {
        let a = MipContext::new(ComponentScope::File);
        let b = MipContext::new(ComponentScope::File);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.scope(), ComponentScope::File);
    }
}
