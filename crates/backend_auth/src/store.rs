//! On-disk credential persistence.
//!
//! Writes go through a sibling temp file and an atomic rename so a crash
//! mid-write never leaves a torn credential file behind. On unix the file
//! is owner-read/write only.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

const CREDENTIAL_DIR: &str = ".agent_runtime";
const CREDENTIAL_FILE: &str = "credentials.json";

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Stored token material for one authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at_ms: u64,
    pub account_id: Option<String>,
}

impl Credentials {
    /// True when the access token has expired or will within `skew`.
    #[must_use]
    pub fn is_expiring(&self, skew: Duration) -> bool {
        let horizon = now_ms().saturating_add(skew.as_millis() as u64);
        self.expires_at_ms <= horizon
    }
}

/// File-backed credential store rooted at a single JSON document.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the conventional per-user location.
    pub fn default_location() -> Result<Self, AuthError> {
        let home = dirs::home_dir().ok_or(AuthError::NoHomeDirectory)?;
        Ok(Self::new(home.join(CREDENTIAL_DIR).join(CREDENTIAL_FILE)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as "not logged in", not as an error.
    pub fn load(&self) -> Result<Option<Credentials>, AuthError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::io("reading", &self.path, err)),
        };
        let credentials = serde_json::from_slice(&bytes).map_err(|source| AuthError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(credentials))
    }

    pub fn save(&self, credentials: &Credentials) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| AuthError::io("creating", parent, err))?;
        }

        let json = serde_json::to_vec_pretty(credentials).map_err(AuthError::Serialize)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json).map_err(|err| AuthError::io("writing", &tmp, err))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
                .map_err(|err| AuthError::io("restricting", &tmp, err))?;
        }

        fs::rename(&tmp, &self.path).map_err(|err| AuthError::io("renaming", &tmp, err))?;
        Ok(())
    }

    /// Removing an absent file is a no-op.
    pub fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::io("removing", &self.path, err)),
        }
    }
}
