use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{
    Applier, ChangeOperation, RemoteSnapshot, ResourceDescriptor, ResourceRef, StateReadError,
    StateReader, apply_operation,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// State File
// ============================================================================

/// Observed state of every managed resource, keyed by `type[identity]`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    #[serde(default)]
    pub resources: BTreeMap<String, RemoteSnapshot>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file {} does not exist, using empty state", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    /// Save state to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize state to JSON")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn snapshot(&self, resource: &ResourceRef) -> RemoteSnapshot {
        self.resources
            .get(&resource.to_string())
            .cloned()
            .unwrap_or_default()
    }
}

// ============================================================================
// File-backed backend
// ============================================================================

/// Reads and converges resources recorded in a local state file
///
/// Applied operations update the in-memory state; [`FileBackend::persist`]
/// writes it back.
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<StateFile>,
}

impl FileBackend {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = StateFile::load(&path)?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current state back to disk
    pub fn persist(&self) -> Result<()> {
        let mut state = self.lock();
        state.last_updated = Utc::now();
        state.save(&self.path)
    }

    fn lock(&self) -> MutexGuard<'_, StateFile> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StateReader for FileBackend {
    fn read(&self, type_name: &str, identity: &str) -> Result<RemoteSnapshot, StateReadError> {
        Ok(self.lock().snapshot(&ResourceRef::new(type_name, identity)))
    }
}

impl Applier for FileBackend {
    fn apply(&self, descriptor: &ResourceDescriptor, operation: &ChangeOperation) -> Result<()> {
        let key = descriptor.reference().to_string();
        let mut state = self.lock();
        let snapshot = state.resources.entry(key.clone()).or_default();
        apply_operation(snapshot, descriptor, operation);
        if !snapshot.exists {
            state.resources.remove(&key);
        }
        log::debug!("{key}: {operation}");
        Ok(())
    }
}
