//! Profile: the cache context shared by engines, and its consent policy

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MipError, MipResult};

/// Where a profile keeps its cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStorageType {
    /// Nothing touches the disk; the catalog is fetched every run
    InMemory,
    /// Catalog cached under the data directory, guarded by a lock file
    #[default]
    OnDisk,
}

/// Answer to a consent prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Accept,
    Reject,
}

/// Decides whether the client may connect to a service endpoint.
pub trait ConsentDelegate: Send + Sync {
    fn get_user_consent(&self, url: &str) -> Consent;
}

/// Accepts every endpoint, for unattended runs
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllConsent;

impl ConsentDelegate for AcceptAllConsent {
    fn get_user_consent(&self, _url: &str) -> Consent {
        Consent::Accept
    }
}

/// Settings for `load_profile`
#[derive(Clone)]
pub struct ProfileSettings {
    pub data_dir: PathBuf,
    pub cache_storage: CacheStorageType,
    pub consent: Arc<dyn ConsentDelegate>,
}

impl ProfileSettings {
    pub fn new<P: Into<PathBuf>>(data_dir: P, cache_storage: CacheStorageType) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache_storage,
            consent: Arc::new(AcceptAllConsent),
        }
    }

    pub fn with_consent(mut self, consent: Arc<dyn ConsentDelegate>) -> Self {
        self.consent = consent;
        self
    }
}

impl fmt::Debug for ProfileSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileSettings")
            .field("data_dir", &self.data_dir)
            .field("cache_storage", &self.cache_storage)
            .finish_non_exhaustive()
    }
}

/// A loaded profile. Engines are added to it.
#[derive(Clone)]
pub struct Profile {
    id: Uuid,
    context_id: Uuid,
    data_dir: PathBuf,
    cache_storage: CacheStorageType,
    consent: Arc<dyn ConsentDelegate>,
}

impl Profile {
    pub fn new(context_id: Uuid, settings: &ProfileSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            context_id,
            data_dir: settings.data_dir.clone(),
            cache_storage: settings.cache_storage,
            consent: Arc::clone(&settings.consent),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_storage(&self) -> CacheStorageType {
        self.cache_storage
    }

    pub fn consent(&self) -> &dyn ConsentDelegate {
        self.consent.as_ref()
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("data_dir", &self.data_dir)
            .field("cache_storage", &self.cache_storage)
            .finish_non_exhaustive()
    }
}

/// Exclusive lock on an on-disk profile cache. Removed on drop.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl CacheLock {
    pub const FILE_NAME: &'static str = ".sheetlabel.lock";

    /// Create `data_dir` if needed and take its lock file.
    pub fn acquire(data_dir: &Path) -> MipResult<Self> {
        fs::create_dir_all(data_dir).map_err(|e| {
            MipError::ProfileLoad(format!(
                "cannot create cache directory '{}': {}",
                data_dir.display(),
                e
            ))
        })?;

        let path = data_dir.join(Self::FILE_NAME);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => MipError::ProfileLoad(format!(
                    "cache '{}' is already locked (remove '{}' if it is stale)",
                    data_dir.display(),
                    path.display()
                )),
                _ => MipError::ProfileLoad(format!(
                    "cannot lock cache '{}': {}",
                    data_dir.display(),
                    e
                )),
            })?;

        // Best effort; the lock is the file's existence, not its content
        let _ = writeln!(file, "{}", std::process::id());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release cache lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("mip_data");

        let lock = CacheLock::acquire(&data_dir).unwrap();
        assert!(lock.path().exists());

        let err = CacheLock::acquire(&data_dir).unwrap_err();
        assert!(matches!(err, MipError::ProfileLoad(msg) if msg.contains("is already locked")));

        drop(lock);
        assert!(!data_dir.join(CacheLock::FILE_NAME).exists());
        CacheLock::acquire(&data_dir).unwrap();
    }

    #[test]
    fn test_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let err = CacheLock::acquire(&blocker.join("cache")).unwrap_err();
        assert!(matches!(err, MipError::ProfileLoad(_)));
    }
}
