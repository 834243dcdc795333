//! API key persistence.
//!
//! The key lives in a small JSON key/value file under the user's data
//! directory. `GEMINI_API_KEY` takes precedence when set.

use crate::defaults;
use crate::error::{ParleyError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Storage for the single API key credential.
pub trait CredentialStore: Send {
    /// The stored key, if any. Empty values count as absent.
    fn get(&self) -> Option<String>;

    fn set(&mut self, key: &str) -> Result<()>;

    /// Remove the stored key. Removing an absent key succeeds.
    fn remove(&mut self) -> Result<()>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// JSON map file holding the key under `gemini_api_key`.
///
/// Other entries in the file are preserved on write.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/parley/storage.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(defaults::APP_DIR).join("storage.json"))
            .ok_or_else(|| ParleyError::CredentialStore {
                message: "Could not determine data directory".to_string(),
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|e| ParleyError::CredentialStore {
                    message: format!("{} is not a valid store: {}", self.path.display(), e),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        fs::write(&self.path, contents)?;
        restrict_permissions(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!(path = %path.display(), error = %e, "failed to restrict credential file");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<String> {
        match self.read_map() {
            Ok(mut map) => non_empty(map.remove(defaults::CREDENTIAL_KEY)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read credential store");
                None
            }
        }
    }

    fn set(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ParleyError::CredentialStore {
                message: "API key must not be empty".to_string(),
            });
        }
        let mut map = self.read_map()?;
        map.insert(defaults::CREDENTIAL_KEY.to_string(), key.to_string());
        self.write_map(&map)
    }

    fn remove(&mut self) -> Result<()> {
        let mut map = self.read_map()?;
        if map.remove(defaults::CREDENTIAL_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Wraps a store so a non-empty environment variable wins over it.
pub struct EnvOverride<S> {
    var: String,
    inner: S,
}

impl<S: CredentialStore> EnvOverride<S> {
    /// Override `inner` with `GEMINI_API_KEY`.
    pub fn new(inner: S) -> Self {
        Self::with_var(defaults::CREDENTIAL_ENV, inner)
    }

    pub fn with_var(var: &str, inner: S) -> Self {
        Self {
            var: var.to_string(),
            inner,
        }
    }

    /// Whether the environment currently supplies the key.
    pub fn is_env_supplied(&self) -> bool {
        non_empty(std::env::var(&self.var).ok()).is_some()
    }
}

impl<S: CredentialStore> CredentialStore for EnvOverride<S> {
    fn get(&self) -> Option<String> {
        non_empty(std::env::var(&self.var).ok()).or_else(|| self.inner.get())
    }

    fn set(&mut self, key: &str) -> Result<()> {
        self.inner.set(key)
    }

    fn remove(&mut self) -> Result<()> {
        self.inner.remove()
    }
}

/// In-memory store for tests. Clones share the stored value.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    value: Arc<Mutex<Option<String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(key: &str) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(key.to_string()))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        non_empty(self.value.lock().ok().and_then(|v| v.clone()))
    }

    fn set(&mut self, key: &str) -> Result<()> {
        let mut value = self.value.lock().map_err(|_| ParleyError::CredentialStore {
            message: "memory store poisoned".to_string(),
        })?;
        *value = Some(key.trim().to_string());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        if let Ok(mut value) = self.value.lock() {
            *value = None;
        }
        Ok(())
    }
}

/// Show only the ends of a key, e.g. `AIza…x9Q2`.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
